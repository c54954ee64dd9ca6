//! Key encodings and child key derivation

pub mod derivation;
pub mod format;

pub use derivation::{derive, derive_epsilon, KdfChain, KeyDeriver};
pub use format::{to_compressed, to_uncompressed};
