use std::collections::{HashMap, HashSet, VecDeque};
use url::Url;

use crate::path_mapper::page_key;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Queued,
    InFlight,
    Done,
    Failed,
}

#[derive(Debug, Clone)]
pub struct QueuedPage {
    pub url: Url,
    pub depth: usize,
    /// Normalized key, see [`page_key`].
    pub key: String,
}

/// FIFO crawl frontier plus the visited set and per-page state.
///
/// Links are dropped at enqueue time when their key is already known. Since
/// the queue is strictly FIFO the first enqueue of a key is always at its
/// shallowest depth. The visited check in [`Frontier::next`] still guards
/// against fetching a key twice.
#[derive(Debug, Default)]
pub struct Frontier {
    queue: VecDeque<QueuedPage>,
    visited: HashSet<String>,
    states: HashMap<String, PageState>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `url` at `depth`; returns false when its page is already known.
    pub fn push(&mut self, url: Url, depth: usize) -> bool {
        let key = page_key(&url);
        if self.states.contains_key(&key) {
            return false;
        }
        self.states.insert(key.clone(), PageState::Queued);
        self.queue.push_back(QueuedPage { url, depth, key });
        true
    }

    /// Pops the next unvisited page, marking it visited and in flight.
    pub fn next(&mut self) -> Option<QueuedPage> {
        while let Some(page) = self.queue.pop_front() {
            if self.visited.insert(page.key.clone()) {
                self.states.insert(page.key.clone(), PageState::InFlight);
                return Some(page);
            }
        }
        None
    }

    pub fn complete(&mut self, key: &str) {
        self.states.insert(key.to_string(), PageState::Done);
    }

    pub fn fail(&mut self, key: &str) {
        self.states.insert(key.to_string(), PageState::Failed);
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    pub fn queued_count(&self) -> usize {
        self.queue.len()
    }

    pub fn count(&self, state: PageState) -> usize {
        self.states.values().filter(|s| **s == state).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_fifo_order() {
        let mut frontier = Frontier::new();
        frontier.push(url("http://example.com/"), 0);
        frontier.push(url("http://example.com/a"), 1);
        frontier.push(url("http://example.com/b"), 1);

        let order: Vec<String> = std::iter::from_fn(|| frontier.next())
            .map(|page| page.url.path().to_string())
            .collect();
        assert_eq!(order, vec!["/", "/a", "/b"]);
    }

    #[test]
    fn test_duplicates_keep_first_depth() {
        let mut frontier = Frontier::new();
        assert!(frontier.push(url("http://example.com/about"), 1));
        assert!(!frontier.push(url("http://example.com/about/"), 2));
        assert!(!frontier.push(url("http://example.com/about?ref=nav#top"), 3));

        let page = frontier.next().unwrap();
        assert_eq!(page.depth, 1);
        assert!(frontier.next().is_none());
        assert_eq!(frontier.visited_count(), 1);
    }

    #[test]
    fn test_visited_pages_are_not_requeued() {
        let mut frontier = Frontier::new();
        frontier.push(url("http://example.com/"), 0);
        let page = frontier.next().unwrap();
        frontier.complete(&page.key);

        assert!(!frontier.push(url("http://example.com"), 1));
        assert!(frontier.next().is_none());
    }

    #[test]
    fn test_state_transitions() {
        let mut frontier = Frontier::new();
        frontier.push(url("http://example.com/a"), 0);
        frontier.push(url("http://example.com/b"), 0);
        assert_eq!(frontier.count(PageState::Queued), 2);

        let first = frontier.next().unwrap();
        assert_eq!(frontier.count(PageState::InFlight), 1);
        frontier.complete(&first.key);

        let second = frontier.next().unwrap();
        frontier.fail(&second.key);

        assert_eq!(frontier.count(PageState::Queued), 0);
        assert_eq!(frontier.count(PageState::InFlight), 0);
        assert_eq!(frontier.count(PageState::Done), 1);
        assert_eq!(frontier.count(PageState::Failed), 1);
    }

    #[test]
    fn test_urls_sharing_a_file_are_one_page() {
        let mut frontier = Frontier::new();
        assert!(frontier.push(url("http://example.com/docs/"), 0));
        assert!(!frontier.push(url("http://example.com//docs"), 1));
        assert!(!frontier.push(url("http://example.com/docs/index.html"), 1));
        assert!(!frontier.push(url("https://example.com/docs"), 1));
        assert!(frontier.push(url("http://example.com/docs:v2"), 1));
        assert_eq!(frontier.queued_count(), 2);
    }
}
