use reqwest::{Client, ClientBuilder};
use std::future::Future;
use std::time::Duration;
use url::Url;

use crate::error::FetchError;

/// Body and content type of a successful GET.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

impl Fetched {
    /// True when the payload should be treated as an HTML page: an HTML
    /// content type, no content type at all, or markup-looking bytes.
    pub fn is_html(&self) -> bool {
        let declared = self
            .content_type
            .as_deref()
            .and_then(|value| value.parse::<mime::Mime>().ok());
        match declared {
            None => true,
            Some(mime) if mime.subtype() == mime::HTML => true,
            Some(mime) if mime.subtype().as_str().contains("xhtml") => true,
            Some(_) => sniff_html(&self.bytes),
        }
    }
}

fn sniff_html(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(256)];
    let head = String::from_utf8_lossy(head).trim_start().to_ascii_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}

/// The transport seam: a redirect-following GET.
pub trait Fetch {
    fn fetch(&self, url: &Url) -> impl Future<Output = Result<Fetched, FetchError>> + Send;
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout: Duration,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "WebsiteCopier/1.0".to_string(),
            timeout: Duration::from_secs(30),
            max_redirects: 10,
        }
    }
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, reqwest::Error> {
        let client = ClientBuilder::new()
            .use_rustls_tls()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self { client })
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &Url) -> impl Future<Output = Result<Fetched, FetchError>> + Send {
        let request = self.client.get(url.as_str());
        let url = url.to_string();

        async move {
            let response = request.send().await.map_err(|source| FetchError::Request {
                url: url.clone(),
                source,
            })?;

            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status {
                    url,
                    status: status.as_u16(),
                });
            }

            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            let bytes = response
                .bytes()
                .await
                .map_err(|source| FetchError::Request { url, source })?;

            Ok(Fetched {
                bytes: bytes.to_vec(),
                content_type,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetched(content_type: Option<&str>, body: &str) -> Fetched {
        Fetched {
            bytes: body.as_bytes().to_vec(),
            content_type: content_type.map(str::to_string),
        }
    }

    #[test]
    fn test_html_detection() {
        assert!(fetched(Some("text/html; charset=utf-8"), "").is_html());
        assert!(fetched(Some("application/xhtml+xml"), "").is_html());
        assert!(fetched(None, "anything").is_html());
        assert!(fetched(Some("text/plain"), "  <!DOCTYPE html><html></html>").is_html());
        assert!(!fetched(Some("application/pdf"), "%PDF-1.4").is_html());
        assert!(!fetched(Some("text/plain"), "hello").is_html());
    }

    #[test]
    fn test_client_builds_from_default_config() {
        assert!(HttpFetcher::new(&FetchConfig::default()).is_ok());
    }
}
