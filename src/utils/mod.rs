//! Hashing helpers and logging

pub mod crypto;
pub mod logging;

pub use crypto::*;
