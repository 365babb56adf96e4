//! In-memory transport for unit tests.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use url::Url;

use crate::error::FetchError;
use crate::fetcher::{Fetch, Fetched};

#[derive(Default)]
pub(crate) struct StaticFetcher {
    responses: HashMap<String, Fetched>,
    requests: Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(mut self, url: &str, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        let url = Url::parse(url).unwrap();
        self.responses.insert(
            url.to_string(),
            Fetched {
                bytes: body.into(),
                content_type: Some(content_type.to_string()),
            },
        );
        self
    }

    pub(crate) fn requests_for(&self, url: &str) -> usize {
        let url = Url::parse(url).unwrap().to_string();
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|requested| **requested == url)
            .count()
    }

    pub(crate) fn total_requests(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Fetch for StaticFetcher {
    fn fetch(&self, url: &Url) -> impl Future<Output = Result<Fetched, FetchError>> + Send {
        self.requests.lock().unwrap().push(url.to_string());
        let result = self
            .responses
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            });
        async move { result }
    }
}
