//! BASALT: a Sybil-resistant peer sampling core for an adversarial p2p
//! overlay.
//!
//! A node maintains a bounded-size `view` of neighbors by continuously
//! replacing peers with better-scoring ones under a periodically
//! refreshed per-slot cost function. See `SPEC_FULL.md` for the full
//! design.
//!
//! This crate deliberately does not own transport, dialing, handshakes,
//! gossip-of-peer-lists, or bootstrapping: those are the embedder's
//! responsibility. What it owns is the hard part — the view-maintenance
//! state machine and its cost functions — exposed through the
//! [`sampler::Sampler`] capability.
//!
//! ```no_run
//! use basalt::{
//!   config::Config,
//!   handler::Handler,
//!   peer::PeerId,
//!   sampler::{BasaltSampler, Sampler},
//! };
//! use std::sync::Arc;
//!
//! struct NoopHandler;
//! impl Handler for NoopHandler {
//!   fn connected(&self, _id: PeerId) {}
//!   fn disconnected(&self, _id: PeerId) {}
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let sampler = BasaltSampler::new(Config::default(), Arc::new(NoopHandler));
//! sampler.shutdown();
//! # }
//! ```

pub mod config;
pub mod cost;
pub mod error;
pub mod handler;
pub mod peer;
pub mod sampler;
pub mod trace;

pub use {
  config::Config,
  error::SamplerError,
  handler::Handler,
  peer::{Address, Peer, PeerHandle, PeerId},
  sampler::{BasaltSampler, Sampler, TrivialSampler},
};
