use std::sync::Arc;

use crate::sources::traits::ContentFetcher;
use crate::sources::Source;

pub struct SourceRegistry {
    fetchers: Vec<(Source, Arc<dyn ContentFetcher>)>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self {
            fetchers: Vec::new(),
        }
    }

    /// Registers `fetcher` for `source`, replacing any previous one.
    pub fn register(&mut self, source: Source, fetcher: Arc<dyn ContentFetcher>) {
        self.fetchers.retain(|(s, _)| *s != source);
        self.fetchers.push((source, fetcher));
    }

    pub fn find(&self, source: Source) -> Option<Arc<dyn ContentFetcher>> {
        self.fetchers
            .iter()
            .find(|(s, _)| *s == source)
            .map(|(_, f)| f.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.fetchers.is_empty()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
