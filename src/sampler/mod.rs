//! The `Sampler` capability consumed by the network layer, and its two
//! implementations: [`basalt::BasaltSampler`] (the real anti-eclipse
//! sampler) and [`trivial::TrivialSampler`] (an always-accept
//! passthrough used to opt out of view-maintenance entirely).

pub mod basalt;
pub mod trivial;

pub use {basalt::BasaltSampler, trivial::TrivialSampler};

use {
  crate::peer::{Address, PeerHandle, PeerId},
  std::time::Duration,
};

/// Consumed by the network I/O layer to decide whether to dial an
/// address, and to inform the sampler of connection lifecycle events.
pub trait Sampler: Send + Sync {
  /// Called before dialing. `id` is the peer's claimed identity, if
  /// known ahead of the handshake — implementations that don't need it
  /// (both of the ones in this crate) ignore it.
  fn should_connect(&self, address: &Address, id: Option<PeerId>) -> bool;

  /// Called when a connection was successfully established to `peer`.
  fn connected(&self, peer: PeerHandle);

  /// Called when a connection to `peer` was closed, for any reason.
  fn disconnected(&self, peer: PeerHandle);

  /// Cooperatively stops any background task owned by this sampler.
  /// Idempotent. Does not close any peers.
  fn shutdown(&self);

  /// Time between peer-list gossip rounds.
  fn peer_list_gossip_spacing(&self) -> Duration;

  /// Peers advertised per gossip round.
  fn peer_list_gossip_size(&self) -> usize;
}
