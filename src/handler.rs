//! The upstream notifier: forwards view-membership deltas to the
//! application's validator handler.

use crate::peer::PeerId;

/// Invoked by the sampler whenever a peer's effective view membership
/// changes.
///
/// The sampler calls these methods while holding its internal state
/// lock. Implementations MUST NOT block and MUST NOT call back into the
/// sampler that invoked them on the same thread — doing so is a
/// programming error (see DESIGN.md's `HandlerReentrancy` note) that
/// will deadlock a `std::sync::Mutex`-backed sampler.
pub trait Handler: Send + Sync {
  /// A peer entered the view (or is a bootstrap peer that just
  /// connected).
  fn connected(&self, id: PeerId);

  /// A peer left the view (or is a bootstrap peer that disconnected).
  fn disconnected(&self, id: PeerId);
}
