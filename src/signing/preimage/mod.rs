//! Payload generation
//!
//! Produces the data that must be signed for each chain family, in the
//! order signatures must later be supplied.

pub mod bitcoin;
pub mod cosmos;
pub mod ethereum;
pub mod solana;

pub use self::bitcoin::get_bitcoin_sighashes;
pub use self::cosmos::get_cosmos_sign_doc_hash;
pub use self::ethereum::get_ethereum_signing_hash;
pub use self::solana::get_solana_message;
