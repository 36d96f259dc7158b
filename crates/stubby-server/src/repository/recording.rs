//! Recorded upstream bodies.

use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Bodies fetched for recording responses, keyed by target URL
#[derive(Debug, Default)]
pub struct RecordingStore {
    bodies: RwLock<HashMap<String, Bytes>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, target_url: &str) -> Option<Bytes> {
        self.bodies.read().get(target_url).cloned()
    }

    pub fn record(&self, target_url: impl Into<String>, body: Bytes) {
        self.bodies.write().insert(target_url.into(), body);
    }

    pub fn clear(&self) {
        self.bodies.write().clear();
    }

    pub fn len(&self) -> usize {
        self.bodies.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_replay() {
        let store = RecordingStore::new();
        assert!(store.get("http://upstream/a").is_none());

        store.record("http://upstream/a", Bytes::from_static(b"body"));
        assert_eq!(store.get("http://upstream/a"), Some(Bytes::from_static(b"body")));
        assert_eq!(store.len(), 1);

        store.clear();
        assert!(store.is_empty());
    }
}
