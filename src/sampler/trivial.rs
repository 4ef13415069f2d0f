//! The trivial sampler: accepts every peer unconditionally and performs
//! no view-maintenance at all. A direct counterpart of the reference
//! source's `DefaultPeerSampler`, useful for opting out of BASALT (small
//! trusted networks, tests) while still satisfying the `Sampler`
//! capability.

use {
  super::Sampler,
  crate::{
    handler::Handler,
    peer::{Address, PeerHandle, PeerId},
  },
  std::{sync::Arc, time::Duration},
};

pub struct TrivialSampler {
  handler: Arc<dyn Handler>,
}

impl TrivialSampler {
  pub fn new(handler: Arc<dyn Handler>) -> Self {
    Self { handler }
  }
}

impl Sampler for TrivialSampler {
  fn should_connect(&self, _address: &Address, _id: Option<PeerId>) -> bool {
    true
  }

  fn connected(&self, peer: PeerHandle) {
    self.handler.connected(peer.id());
  }

  fn disconnected(&self, peer: PeerHandle) {
    self.handler.disconnected(peer.id());
  }

  fn shutdown(&self) {
    // no background task to stop.
  }

  fn peer_list_gossip_spacing(&self) -> Duration {
    Duration::from_secs(60)
  }

  fn peer_list_gossip_size(&self) -> usize {
    100
  }
}
