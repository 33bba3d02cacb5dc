//! Relation → URI discovery with a single-flight cache.
//!
//! The participant's account root (`GET {apiRoot}/api/{participantId}?fields=links`)
//! publishes the URIs of its inbox and outbox resources. The map is fetched
//! once and reused until [`LinkResolver::invalidate`] is called.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

use crate::error::{ProtocolError, Result};

/// All received messages.
pub const INBOX: &str = "inbox";
/// Received messages not yet completed or rejected.
pub const INBOX_NEW: &str = "inboxNew";
/// Sent messages, addressed by `ref`.
pub const OUTBOX: &str = "outbox";
/// Sent messages with their current state, for polling.
pub const OUTBOX_STATE: &str = "outboxState";

/// Query string selecting only the link map on the account root.
pub const DISCOVERY_QUERY: &str = "fields=links";

// ---------------------------------------------------------------------------
// LinkMap
// ---------------------------------------------------------------------------

/// Discovered relations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LinkMap {
    links: HashMap<String, String>,
}

impl LinkMap {
    pub fn new(links: HashMap<String, String>) -> Self {
        Self { links }
    }

    /// Parse a discovery response body: `{"links": {"inbox": "/api/..", ...}}`.
    ///
    /// Entries whose value is not a string are ignored.
    pub fn from_discovery(body: &[u8]) -> std::result::Result<Self, ProtocolError> {
        let doc: Value = serde_json::from_slice(body).map_err(|source| ProtocolError::Json {
            what: "link discovery response",
            source,
        })?;
        let links = doc
            .get("links")
            .and_then(Value::as_object)
            .ok_or(ProtocolError::MissingLinks)?
            .iter()
            .filter_map(|(rel, uri)| uri.as_str().map(|u| (rel.clone(), u.to_owned())))
            .collect();
        Ok(Self { links })
    }

    /// URI for `relation`. An unknown relation is a configuration error.
    pub fn get(&self, relation: &str) -> std::result::Result<&str, ProtocolError> {
        self.links
            .get(relation)
            .map(String::as_str)
            .ok_or_else(|| ProtocolError::RelationNotFound(relation.to_owned()))
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn relations(&self) -> impl Iterator<Item = &str> {
        self.links.keys().map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Memoized link lookup.
///
/// Unresolved until the first successful fetch. The lock is held across the
/// fetch so concurrent first callers wait for one discovery request and then
/// share its result. A failed fetch leaves the resolver unresolved.
#[derive(Debug, Default)]
pub struct LinkResolver {
    state: Mutex<Option<Arc<LinkMap>>>,
}

impl LinkResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `relation`, calling `fetch` only when no map is cached.
    pub fn resolve<F>(&self, relation: &str, fetch: F) -> Result<String>
    where
        F: FnOnce() -> Result<LinkMap>,
    {
        let links = self.links(fetch)?;
        Ok(links.get(relation)?.to_owned())
    }

    /// The cached map, fetching it first if needed.
    pub fn links<F>(&self, fetch: F) -> Result<Arc<LinkMap>>
    where
        F: FnOnce() -> Result<LinkMap>,
    {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(links) = state.as_ref() {
            return Ok(Arc::clone(links));
        }

        let links = Arc::new(fetch()?);
        tracing::debug!(relations = links.len(), "link map discovered");
        *state = Some(Arc::clone(&links));
        Ok(links)
    }

    /// Drop the cached map; the next lookup fetches again.
    pub fn invalidate(&self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn is_resolved(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
