use thiserror::Error;

/// Errors raised by the sampler.
///
/// There are no recoverable errors surfaced across the public API (see
/// the crate-level docs): a failure generating a seed is fatal and
/// aborts the process rather than being returned, since the sampler's
/// Sybil-resistance properties depend on unpredictable seeds.
#[derive(Debug, Error)]
pub enum SamplerError {
  #[error("secure random source failed while generating a seed: {0}")]
  FatalRandomFailure(#[from] rand::Error),
}
