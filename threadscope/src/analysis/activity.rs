//! Activity label → bucket mapping.
//!
//! Blocking time is split by what the thread was doing when it went off-CPU,
//! as named by its activity label. Labels are matched by exact string; any
//! label without a dedicated entry falls into [`ActivityBucket::Blocked`].

use std::collections::HashMap;

use serde::Serialize;

use crate::config::ActivityConfig;

/// Destination bucket for blocking off-CPU time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityBucket {
    /// Waiting for the next message in the message pump
    MessagePumpWait,
    /// Blocked while dispatching a message
    ProcessMessage,
    /// Blocked inside idle processing
    Idle,
    /// Blocked anywhere else
    Blocked,
}

/// Exact-match table from activity label to bucket.
#[derive(Debug, Clone, Default)]
pub struct ActivityTable {
    labels: HashMap<String, ActivityBucket>,
}

impl ActivityTable {
    /// Build the table from configured signatures.
    #[must_use]
    pub fn from_config(config: &ActivityConfig) -> Self {
        let mut table = Self::default();
        for label in &config.message_pump_wait {
            table.insert(label, ActivityBucket::MessagePumpWait);
        }
        table.insert(&config.process_message, ActivityBucket::ProcessMessage);
        table.insert(&config.idle, ActivityBucket::Idle);
        table
    }

    /// Map `label` to `bucket`, replacing any earlier mapping.
    pub fn insert(&mut self, label: &str, bucket: ActivityBucket) {
        self.labels.insert(label.to_owned(), bucket);
    }

    /// Bucket for an activity label.
    #[must_use]
    pub fn bucket_for(&self, label: &str) -> ActivityBucket {
        self.labels.get(label).copied().unwrap_or(ActivityBucket::Blocked)
    }
}
