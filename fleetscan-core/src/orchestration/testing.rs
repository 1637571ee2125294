use std::fmt;

use super::event::ReconcileEvent;

/// Minimal event keyed by `key`; `seq` distinguishes re-deliveries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct TestEvent {
    pub key: String,
    pub seq: u32,
}

impl TestEvent {
    pub fn new(key: &str) -> Self {
        Self::with_seq(key, 0)
    }

    pub fn with_seq(key: &str, seq: u32) -> Self {
        Self {
            key: key.to_string(),
            seq,
        }
    }
}

impl fmt::Display for TestEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TestEvent={}#{}", self.key, self.seq)
    }
}

impl ReconcileEvent for TestEvent {
    fn hash_key(&self) -> String {
        self.key.clone()
    }

    fn span(&self) -> tracing::Span {
        tracing::debug_span!("test_event", key = %self.key, seq = self.seq)
    }
}
