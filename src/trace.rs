//! Offline-analysis trace records for view admissions/removals.
//!
//! Not part of the stable interface: format and delivery may change.
//! The sink is a pluggable capability rather than a hard-wired stdout
//! writer, so embedders can redirect it to a file, a ring buffer, or
//! nowhere at all.

use std::time::{SystemTime, UNIX_EPOCH};

/// Appends single-line trace records of view membership changes.
///
/// Implementations must be cheap and non-blocking: this is called while
/// the sampler's state lock is held.
pub trait TraceSink: Send + Sync {
  fn record(&self, line: &str);
}

/// Default sink: emits a `tracing::trace!` event instead of writing
/// anywhere directly, so the embedder's existing `tracing` subscriber
/// decides what happens to these records.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTraceSink;

impl TraceSink for TracingTraceSink {
  fn record(&self, line: &str) {
    tracing::trace!(target: "basalt::trace", "{line}");
  }
}

fn now_seconds_fractional() -> f64 {
  let since_epoch = SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default();
  since_epoch.as_secs_f64()
}

/// Formats and emits an admission record: `"<ts> ~~ A <peer-id>"`.
pub(crate) fn admitted(sink: &dyn TraceSink, peer: impl std::fmt::Display) {
  sink.record(&format!("{:.3} ~~ A {peer}", now_seconds_fractional()));
}

/// Formats and emits a removal record: `"<ts> ~~ R <peer-id>"`.
pub(crate) fn removed(sink: &dyn TraceSink, peer: impl std::fmt::Display) {
  sink.record(&format!("{:.3} ~~ R {peer}", now_seconds_fractional()));
}
