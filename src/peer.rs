//! Peer identity and the external [`Peer`] capability.
//!
//! The sampler never dials or closes sockets itself; it only ever sees
//! opaque handles satisfying [`Peer`], supplied by the transport layer.

use {
  serde::{de, Deserialize, Deserializer, Serialize, Serializer},
  std::{
    fmt::{self, Debug, Display, Formatter},
    hash::{Hash, Hasher},
    net::{IpAddr, SocketAddr},
    str::FromStr,
    sync::Arc,
  },
};

/// Opaque 20-byte peer identifier.
///
/// Comparisons here are by value: two [`PeerId`]s are equal if they carry
/// the same bytes. This is distinct from [`PeerHandle`] equality, which is
/// by reference identity — two simultaneous connections can share a
/// `PeerId` and still be tracked as separate peers.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId([u8; 20]);

impl PeerId {
  pub const fn new(bytes: [u8; 20]) -> Self {
    Self(bytes)
  }

  pub fn as_bytes(&self) -> &[u8; 20] {
    &self.0
  }
}

impl Display for PeerId {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "{}", bs58::encode(self.0).into_string())
  }
}

impl Debug for PeerId {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "PeerId({})", bs58::encode(self.0).into_string())
  }
}

#[derive(Debug, thiserror::Error)]
pub enum PeerIdParseError {
  #[error("malformed base58 peer id: {0:?}")]
  Base58(bs58::decode::Error),

  #[error("peer id must decode to exactly 20 bytes, got {0}")]
  WrongLength(usize),
}

impl FromStr for PeerId {
  type Err = PeerIdParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let decoded = bs58::decode(s)
      .into_vec()
      .map_err(PeerIdParseError::Base58)?;
    let bytes: [u8; 20] = decoded
      .try_into()
      .map_err(|v: Vec<u8>| PeerIdParseError::WrongLength(v.len()))?;
    Ok(Self(bytes))
  }
}

impl Serialize for PeerId {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: Serializer,
  {
    serializer.serialize_str(&self.to_string())
  }
}

impl<'de> Deserialize<'de> for PeerId {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: Deserializer<'de>,
  {
    let s = String::deserialize(deserializer)?;
    PeerId::from_str(&s).map_err(|e| de::Error::custom(format!("{e}")))
  }
}

/// A network address: an IP (v4 or v6) plus a port.
///
/// Exposes a canonical string form (used as cost-function input) and the
/// raw IP bytes (used by the hierarchical cost function's prefix
/// weighting).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(SocketAddr);

impl Address {
  pub fn new(addr: SocketAddr) -> Self {
    Self(addr)
  }

  /// Canonical string form, e.g. `"203.0.113.7:26656"` or
  /// `"[2001:db8::1]:26656"`. Used verbatim as cost-function input.
  pub fn canonical_string(&self) -> String {
    self.0.to_string()
  }

  /// Raw IP bytes: 4 for IPv4, 16 for IPv6.
  pub fn ip_bytes(&self) -> Vec<u8> {
    match self.0.ip() {
      IpAddr::V4(v4) => v4.octets().to_vec(),
      IpAddr::V6(v6) => v6.octets().to_vec(),
    }
  }

  pub fn is_ipv4(&self) -> bool {
    self.0.is_ipv4()
  }
}

impl Display for Address {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.canonical_string())
  }
}

impl From<SocketAddr> for Address {
  fn from(addr: SocketAddr) -> Self {
    Self(addr)
  }
}

/// External capability provided to the sampler by the transport layer.
///
/// Identity comparisons of peers (see [`PeerHandle`]) use reference
/// identity, not [`PeerId`] equality: this method set is deliberately
/// thin, the transport owns everything else about the connection.
pub trait Peer: Send + Sync {
  fn id(&self) -> PeerId;
  fn address(&self) -> Address;
  fn is_incoming(&self) -> bool;
  fn close(&self);
}

impl Debug for dyn Peer {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    f.debug_struct("Peer")
      .field("id", &self.id())
      .field("address", &self.address())
      .field("is_incoming", &self.is_incoming())
      .finish()
  }
}

/// A reference-counted handle to a [`Peer`], compared by reference
/// identity rather than by [`PeerId`].
///
/// This mirrors the reference-identity semantics the original
/// implementation relied on (comparing peer objects, not ids), made
/// explicit here via `Arc` pointer equality so that two simultaneous
/// connections sharing a `PeerId` are never confused with one another.
#[derive(Clone)]
pub struct PeerHandle(pub Arc<dyn Peer>);

impl PeerHandle {
  pub fn new(peer: Arc<dyn Peer>) -> Self {
    Self(peer)
  }

  pub fn id(&self) -> PeerId {
    self.0.id()
  }

  pub fn address(&self) -> Address {
    self.0.address()
  }

  pub fn is_incoming(&self) -> bool {
    self.0.is_incoming()
  }

  pub fn close(&self) {
    self.0.close();
  }
}

impl PartialEq for PeerHandle {
  fn eq(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.0, &other.0)
  }
}

impl Eq for PeerHandle {}

impl Hash for PeerHandle {
  fn hash<H: Hasher>(&self, state: &mut H) {
    (Arc::as_ptr(&self.0) as *const () as usize).hash(state);
  }
}

impl Debug for PeerHandle {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    Debug::fmt(&*self.0, f)
  }
}
