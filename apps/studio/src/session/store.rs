//! Session State Store: one slot holding the last completed pipeline output.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::caption::{CaptionPair, Fingerprint};

/// Output of one successful pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionRecord {
    pub image_fingerprint: Fingerprint,
    pub captions: CaptionPair,
    pub post: String,
    pub evaluation: String,
    pub generated_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(
        image_fingerprint: Fingerprint,
        captions: CaptionPair,
        post: String,
        evaluation: String,
    ) -> Self {
        Self {
            image_fingerprint,
            captions,
            post,
            evaluation,
            generated_at: Utc::now(),
        }
    }
}

/// Exactly one record, never a history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStore {
    slot: Option<SessionRecord>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites the slot unconditionally. Callers only get a complete
    /// `SessionRecord` from a fully successful run.
    pub fn record(&mut self, record: SessionRecord) {
        self.slot = Some(record);
    }

    /// The stored record, but only when it belongs to `fingerprint`.
    pub fn current_for(&self, fingerprint: &Fingerprint) -> Option<&SessionRecord> {
        self.slot
            .as_ref()
            .filter(|record| &record.image_fingerprint == fingerprint)
    }
}
