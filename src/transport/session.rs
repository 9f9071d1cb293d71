//! Per-target session token cache.
//!
//! Nodes hand back an opaque session token on administration replies and
//! expect it echoed on subsequent requests. The cache keeps the most recent
//! token per target node: overwrite on receive, attach on send, no expiry.
//! Tokens live only in memory; after a restart the first successful exchange
//! with a node re-establishes its token transparently.

use std::collections::HashMap;
use std::sync::Mutex;

use log::debug;

use crate::wire::format_node_id;

#[derive(Default)]
pub struct SessionTokenCache {
    tokens: Mutex<HashMap<u32, Vec<u8>>>,
}

impl SessionTokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store (or overwrite) the token for a target. Empty tokens are ignored
    /// so a reply without one cannot clobber a cached value.
    pub fn store(&self, target: u32, token: Vec<u8>) {
        if token.is_empty() {
            return;
        }
        debug!(
            "cached session token for {} ({} bytes)",
            format_node_id(target),
            token.len()
        );
        self.tokens.lock().unwrap().insert(target, token);
    }

    /// Token to attach to an outgoing request, empty if none cached.
    pub fn token_for(&self, target: u32) -> Vec<u8> {
        self.tokens
            .lock()
            .unwrap()
            .get(&target)
            .cloned()
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        self.tokens.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_per_target() {
        let cache = SessionTokenCache::new();
        cache.store(0xAAAA, vec![1, 2, 3]);
        assert_eq!(cache.token_for(0xAAAA), vec![1, 2, 3]);
        assert!(cache.token_for(0xBBBB).is_empty());
    }

    #[test]
    fn latest_token_wins() {
        let cache = SessionTokenCache::new();
        cache.store(1, vec![1]);
        cache.store(1, vec![2, 2]);
        assert_eq!(cache.token_for(1), vec![2, 2]);
    }

    #[test]
    fn empty_token_does_not_clobber() {
        let cache = SessionTokenCache::new();
        cache.store(1, vec![9]);
        cache.store(1, vec![]);
        assert_eq!(cache.token_for(1), vec![9]);
    }
}
