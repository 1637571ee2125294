use std::fmt;

/// A unit of reconcile work discovered by a poller.
///
/// `Display` gives the human readable description used in error messages,
/// `span` carries the structured fields every log line for the item is
/// emitted under.
pub trait ReconcileEvent: Clone + fmt::Display + Send + Sync + 'static {
    /// Stable identity used to deduplicate queued and in-flight work.
    fn hash_key(&self) -> String;

    fn span(&self) -> tracing::Span;
}
