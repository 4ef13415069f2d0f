//! Pure cost functions mapping `(seed, address) -> u64`. Lower wins.
//!
//! Both variants are stateless; [`CostFn`] is the injected capability the
//! sampling engine is polymorphic over, so a new variant can be added
//! without touching [`crate::sampler::basalt::BasaltSampler`].

use {crate::peer::Address, sha2::{Digest, Sha256}};

/// 20 random bytes keying the cost function for one view slot.
pub type Seed = [u8; 20];

/// A cost function: pure, deterministic, total.
pub trait Cost: Send + Sync {
  fn cost(&self, seed: &Seed, address: &Address) -> u64;
}

/// Selects which built-in cost function a sampler uses.
///
/// Kept as a plain enum (rather than `Box<dyn Cost>`) so `Config` stays
/// `Clone`, `Debug`, and `serde`-friendly; both arms are zero-sized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CostFn {
  /// Uniformly distributed cost per `(seed, address)`.
  Uniform,
  /// Weighted by IP prefix length so peers in under-represented network
  /// regions beat peers clustered in the same subnets.
  Hierarchical,
}

impl Cost for CostFn {
  fn cost(&self, seed: &Seed, address: &Address) -> u64 {
    match self {
      CostFn::Uniform => uniform_cost(seed, address),
      CostFn::Hierarchical => hierarchical_cost(seed, address),
    }
  }
}

fn be_u64(hash: &[u8]) -> u64 {
  u64::from_be_bytes(hash[..8].try_into().unwrap())
}

fn be_u16_as_u64(hash: &[u8]) -> u64 {
  u16::from_be_bytes(hash[..2].try_into().unwrap()) as u64
}

fn sha256_of(seed: &Seed, tail: &[u8]) -> [u8; 32] {
  let mut hasher = Sha256::new();
  hasher.update(seed);
  hasher.update(tail);
  hasher.finalize().into()
}

/// Concatenate the seed with the address's canonical string form,
/// SHA-256 it, and interpret the first 8 bytes as a big-endian u64.
pub fn uniform_cost(seed: &Seed, address: &Address) -> u64 {
  let hash = sha256_of(seed, address.canonical_string().as_bytes());
  be_u64(&hash)
}

/// Weighted by IP prefix lengths: four SHA-256 hashes of the seed
/// concatenated with increasingly long prefixes of the IP, folded into
/// one u64 so that longer-matching prefixes dominate the ordering.
///
/// IPv4 uses prefixes of 1, 2, 3 bytes then the full canonical string.
/// IPv6 uses prefixes of 2, 3, 4 bytes then the full canonical string —
/// unusually short for v6 aggregation boundaries (/32, /48), preserved
/// verbatim from the reference source (see DESIGN.md).
pub fn hierarchical_cost(seed: &Seed, address: &Address) -> u64 {
  hierarchical_cost_from_parts(
    seed,
    &address.ip_bytes(),
    &address.canonical_string(),
    address.is_ipv4(),
  )
}

/// The byte-level core of [`hierarchical_cost`], split out so the
/// short-IP boundary case is testable without needing to construct a
/// malformed [`Address`] (real `std::net` addresses are always 4 or 16
/// bytes).
fn hierarchical_cost_from_parts(
  seed: &Seed,
  ip: &[u8],
  canonical: &str,
  is_ipv4: bool,
) -> u64 {
  // The reference source requires at least 4 IP bytes before branching
  // into the v4/v6 prefix schemes below, regardless of which one
  // applies — this only bites malformed/synthetic addresses, since real
  // IPv4 is 4 bytes and IPv6 is 16.
  if ip.len() < 4 {
    return u64::MAX;
  }

  let prefix_lens: [usize; 3] = if is_ipv4 { [1, 2, 3] } else { [2, 3, 4] };

  let hashes = [
    sha256_of(seed, &ip[..prefix_lens[0].min(ip.len())]),
    sha256_of(seed, &ip[..prefix_lens[1].min(ip.len())]),
    sha256_of(seed, &ip[..prefix_lens[2].min(ip.len())]),
    sha256_of(seed, canonical.as_bytes()),
  ];

  let [p1, p2, p3, p4] = hashes.map(|h| be_u16_as_u64(&h));
  (p1 << 48) | (p2 << 32) | (p3 << 16) | p4
}
