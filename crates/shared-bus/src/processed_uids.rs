//! # Processed Uid Cache
//!
//! Remembers the uids of recently processed trade messages.
//!
//! ## Semantics
//!
//! - A uid is admitted once; later arrivals of the same uid are reported as
//!   duplicates together with the outcome recorded for the first one.
//! - Entries expire after the retention window and the cache is bounded, so
//!   memory stays flat for long-running nodes.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use thiserror::Error;

/// How a processed message ended, if it has ended yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessedUid {
    /// Still being handled (or deferred).
    InFlight,
    /// Handled and positively acknowledged.
    Succeeded,
    /// Handled and negatively acknowledged.
    Failed,
}

/// Errors from uid admission.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UidError {
    /// The uid was already admitted.
    #[error("Message {uid} already processed ({outcome:?})")]
    Duplicate { uid: String, outcome: ProcessedUid },
}

/// Bounded, time-limited cache of processed message uids.
pub struct ProcessedUidCache {
    entries: HashMap<String, (Instant, ProcessedUid)>,
    order: VecDeque<String>,
    retention: Duration,
    max_entries: usize,
}

impl ProcessedUidCache {
    /// Default retention: one day.
    pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

    /// Default bound on remembered uids.
    pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

    /// Create a cache with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(Self::DEFAULT_RETENTION, Self::DEFAULT_MAX_ENTRIES)
    }

    /// Create a cache with custom settings.
    #[must_use]
    pub fn with_config(retention: Duration, max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            retention,
            max_entries: max_entries.max(1),
        }
    }

    /// Admit `uid` for processing, or report it as a duplicate.
    pub fn check_and_insert(&mut self, uid: &str) -> Result<(), UidError> {
        let now = Instant::now();
        self.evict_expired(now);

        if let Some((_, outcome)) = self.entries.get(uid) {
            return Err(UidError::Duplicate {
                uid: uid.to_string(),
                outcome: *outcome,
            });
        }

        while self.entries.len() >= self.max_entries {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }

        self.entries
            .insert(uid.to_string(), (now, ProcessedUid::InFlight));
        self.order.push_back(uid.to_string());
        Ok(())
    }

    /// Record how the message with `uid` ended.
    pub fn record_outcome(&mut self, uid: &str, succeeded: bool) {
        if let Some((_, outcome)) = self.entries.get_mut(uid) {
            *outcome = if succeeded {
                ProcessedUid::Succeeded
            } else {
                ProcessedUid::Failed
            };
        }
    }

    /// Forget `uid` so the message can be processed again (used when a
    /// message is dropped for being early and will be redelivered).
    pub fn forget(&mut self, uid: &str) {
        if self.entries.remove(uid).is_some() {
            self.order.retain(|u| u != uid);
        }
    }

    /// Check if a uid is remembered.
    #[must_use]
    pub fn contains(&self, uid: &str) -> bool {
        self.entries.contains_key(uid)
    }

    /// Get the number of remembered uids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_expired(&mut self, now: Instant) {
        while let Some(oldest) = self.order.front() {
            let expired = self
                .entries
                .get(oldest)
                .map_or(true, |(seen, _)| now.duration_since(*seen) > self.retention);
            if !expired {
                break;
            }
            if let Some(uid) = self.order.pop_front() {
                self.entries.remove(&uid);
            }
        }
    }
}

impl Default for ProcessedUidCache {
    fn default() -> Self {
        Self::new()
    }
}
