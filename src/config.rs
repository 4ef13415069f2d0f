//! Sampler configuration.
//!
//! This is a plain, `serde`-derivable struct — matching the teacher's
//! `episub::Config` conventions — but this crate performs no file or
//! CLI parsing of it; building and loading a `Config` is the embedder's
//! job (see the scope boundary in the crate docs).

use {crate::{cost::CostFn, peer::PeerId}, std::time::Duration};

/// Configuration parameters for the BASALT sampler.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Config {
  /// Number of slots in the view (`V`).
  pub view_size: usize,

  /// How often the seed-renewal loop ticks.
  #[serde(with = "humantime_serde")]
  pub seed_renew_interval: Duration,

  /// How many seeds are rotated per renewal tick. Typically much
  /// smaller than `view_size` so per-tick churn is bounded; if it is
  /// `>= view_size`, every seed rotates every tick.
  pub seed_renew_count: usize,

  /// Which cost function slots are ranked by.
  pub cost_function: CostFn,

  /// Peers that bypass sampling entirely and are forwarded straight to
  /// the upstream handler.
  pub bootstrap_peers: Vec<PeerId>,

  /// Whether an outgoing peer dropped from the view is closed.
  ///
  /// The reference source contains a dead branch (`&& false`) that
  /// would have closed outgoing peers; this makes the behavior an
  /// explicit choice instead, defaulting to closing them (see
  /// DESIGN.md).
  pub close_outgoing_on_drop: bool,
}

impl Config {
  pub fn gossip_spacing(&self) -> Duration {
    Duration::from_secs(1)
  }

  pub fn gossip_size(&self) -> usize {
    4
  }
}

impl Default for Config {
  fn default() -> Self {
    Self {
      view_size: 20,
      seed_renew_interval: Duration::from_secs(30),
      seed_renew_count: 2,
      cost_function: CostFn::Uniform,
      bootstrap_peers: Vec::new(),
      close_outgoing_on_drop: true,
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn default_config_is_internally_consistent() {
    let cfg = Config::default();
    assert!(cfg.seed_renew_count <= cfg.view_size);
    assert!(cfg.bootstrap_peers.is_empty());
  }

  #[test]
  fn config_round_trips_through_json() {
    let cfg = Config::default();
    let json = serde_json::to_string(&cfg).unwrap();
    let back: Config = serde_json::from_str(&json).unwrap();
    assert_eq!(cfg.view_size, back.view_size);
    assert_eq!(cfg.seed_renew_interval, back.seed_renew_interval);
    assert_eq!(cfg.cost_function, back.cost_function);
  }
}
