//! Pattern registry and lookup.
//!
//! # Responsibilities
//! - Store registered patterns with their handlers
//! - Add, replace and remove registrations at runtime
//! - Look up the single best registration for a request path
//!
//! # Design Decisions
//! - Lookups load an immutable snapshot (`ArcSwap`) and never block writers
//! - Writers copy the map and swap it in (read-copy-update)
//! - Patterns are compiled on registration so invalid entries never reach lookups
//! - Snapshot is a `BTreeMap`, so enumeration (and tie-breaking) is deterministic

use arc_swap::ArcSwap;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::routing::matcher::{most_specific, split_path, Pattern, PatternError};

/// A compiled pattern with its handler.
#[derive(Debug)]
pub struct Registration<H: ?Sized> {
    pub pattern: Pattern,
    pub handler: Arc<H>,
}

impl<H: ?Sized> Clone for Registration<H> {
    fn clone(&self) -> Self {
        Self {
            pattern: self.pattern.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

/// Result of a successful lookup: the winning pattern and its captured handler.
pub struct Matched<H: ?Sized> {
    pub pattern: String,
    pub handler: Arc<H>,
}

/// Concurrent registry mapping path patterns to handlers.
pub struct PatternRegistry<H: ?Sized> {
    entries: ArcSwap<BTreeMap<String, Registration<H>>>,
}

impl<H: ?Sized> PatternRegistry<H> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: ArcSwap::from_pointee(BTreeMap::new()),
        }
    }

    /// Install or replace the handler for a pattern.
    ///
    /// Returns the handler that was replaced, if any.
    pub fn register(&self, pattern: &str, handler: Arc<H>) -> Result<Option<Arc<H>>, PatternError> {
        let compiled = Pattern::parse(pattern)?;
        let registration = Registration {
            pattern: compiled,
            handler,
        };

        let previous = self.entries.rcu(|current| {
            let mut next = BTreeMap::clone(current);
            next.insert(pattern.to_string(), registration.clone());
            next
        });

        tracing::debug!(pattern = %pattern, "Pattern registered");
        Ok(previous.get(pattern).map(|r| Arc::clone(&r.handler)))
    }

    /// Remove the handler for a pattern. Returns it if it was registered.
    pub fn unregister(&self, pattern: &str) -> Option<Arc<H>> {
        let previous = self.entries.rcu(|current| {
            let mut next = BTreeMap::clone(current);
            next.remove(pattern);
            next
        });

        let removed = previous.get(pattern).map(|r| Arc::clone(&r.handler));
        if removed.is_some() {
            tracing::debug!(pattern = %pattern, "Pattern unregistered");
        }
        removed
    }

    /// Find the most specific registration matching `path`.
    ///
    /// Evaluates one consistent snapshot; registrations changed concurrently
    /// may or may not be visible.
    pub fn best_match(&self, path: &str) -> Option<Matched<H>> {
        let snapshot = self.entries.load();
        let segments: Vec<&str> = split_path(path).collect();

        let winner = most_specific(
            snapshot
                .values()
                .map(|r| &r.pattern)
                .filter(|p| p.matches_segments(&segments)),
        )?;

        let registration = snapshot.get(winner.as_str())?;
        Some(Matched {
            pattern: winner.as_str().to_string(),
            handler: Arc::clone(&registration.handler),
        })
    }

    /// Registered pattern strings, in enumeration order.
    pub fn patterns(&self) -> Vec<String> {
        self.entries.load().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.load().is_empty()
    }
}

impl<H: ?Sized> Default for PatternRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}
