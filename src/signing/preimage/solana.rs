//! Solana Pre-Image Generation
//!
//! Legacy message serialization. Ed25519 hashes internally, so the payload
//! handed to the signer is the serialized message itself, not a digest.

use crate::error::{ChainSigError, ChainSigResult};
use crate::types::SignPayload;
use serde::{Deserialize, Serialize};

/// Solana public key (32 bytes)
pub type Pubkey = [u8; 32];

/// System program id (all zeros, `11111111111111111111111111111111`)
pub const SYSTEM_PROGRAM_ID: Pubkey = [0u8; 32];

/// Solana account meta for instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolanaAccountMeta {
    #[serde(with = "crate::serde_bytes::hex32")]
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

/// Solana instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolanaInstruction {
    #[serde(with = "crate::serde_bytes::hex32")]
    pub program_id: Pubkey,
    pub accounts: Vec<SolanaAccountMeta>,
    #[serde(with = "crate::serde_bytes::hex_vec")]
    pub data: Vec<u8>,
}

/// Unsigned Solana transaction with a single signer (the fee payer)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedSolanaTransaction {
    #[serde(with = "crate::serde_bytes::hex32")]
    pub recent_blockhash: [u8; 32],
    #[serde(with = "crate::serde_bytes::hex32")]
    pub fee_payer: Pubkey,
    pub instructions: Vec<SolanaInstruction>,
}

/// System program `Transfer` instruction
pub fn system_transfer_instruction(from: Pubkey, to: Pubkey, lamports: u64) -> SolanaInstruction {
    let mut data = Vec::with_capacity(12);
    data.extend_from_slice(&2u32.to_le_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());

    SolanaInstruction {
        program_id: SYSTEM_PROGRAM_ID,
        accounts: vec![
            SolanaAccountMeta {
                pubkey: from,
                is_signer: true,
                is_writable: true,
            },
            SolanaAccountMeta {
                pubkey: to,
                is_signer: false,
                is_writable: true,
            },
        ],
        data,
    }
}

/// The message bytes to sign, as a single payload
pub fn get_solana_message(tx: &UnsignedSolanaTransaction) -> ChainSigResult<SignPayload> {
    let message = serialize_legacy_message(tx)?;
    Ok(SignPayload::message(message, 0).with_description(format!(
        "Solana tx: {} instruction(s), fee payer {}",
        tx.instructions.len(),
        bs58::encode(tx.fee_payer).into_string()
    )))
}

/// Serialize legacy transaction message
pub fn serialize_legacy_message(tx: &UnsignedSolanaTransaction) -> ChainSigResult<Vec<u8>> {
    if tx.instructions.is_empty() {
        return Err(ChainSigError::InvalidTransaction("transaction has no instructions".to_string()));
    }

    let (accounts, header) = compile_accounts(tx);
    if header.num_required_signatures != 1 {
        return Err(ChainSigError::InvalidTransaction(format!(
            "only the fee payer may sign, found {} signers",
            header.num_required_signatures
        )));
    }

    let mut message = Vec::new();

    // Message header (3 bytes)
    message.push(header.num_required_signatures);
    message.push(header.num_readonly_signed_accounts);
    message.push(header.num_readonly_unsigned_accounts);

    write_compact_u16(accounts.len() as u16, &mut message);
    for account in &accounts {
        message.extend_from_slice(account);
    }

    message.extend_from_slice(&tx.recent_blockhash);

    write_compact_u16(tx.instructions.len() as u16, &mut message);
    for ix in &tx.instructions {
        message.push(account_index(&accounts, &ix.program_id)?);

        write_compact_u16(ix.accounts.len() as u16, &mut message);
        for acc in &ix.accounts {
            message.push(account_index(&accounts, &acc.pubkey)?);
        }

        write_compact_u16(ix.data.len() as u16, &mut message);
        message.extend_from_slice(&ix.data);
    }

    Ok(message)
}

fn account_index(accounts: &[Pubkey], key: &Pubkey) -> ChainSigResult<u8> {
    accounts
        .iter()
        .position(|a| a == key)
        .map(|i| i as u8)
        .ok_or_else(|| ChainSigError::InvalidTransaction("account not found".to_string()))
}

struct MessageHeader {
    num_required_signatures: u8,
    num_readonly_signed_accounts: u8,
    num_readonly_unsigned_accounts: u8,
}

#[derive(Clone, Copy)]
struct AccountFlags {
    signer: bool,
    writable: bool,
}

/// Dedupe accounts (first appearance order, strongest privilege wins) and
/// order them: writable signers (fee payer first), readonly signers,
/// writable non-signers, readonly non-signers.
fn compile_accounts(tx: &UnsignedSolanaTransaction) -> (Vec<Pubkey>, MessageHeader) {
    let mut seen: Vec<(Pubkey, AccountFlags)> = vec![(
        tx.fee_payer,
        AccountFlags {
            signer: true,
            writable: true,
        },
    )];

    let mut upsert = |key: Pubkey, flags: AccountFlags| {
        match seen.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => {
                existing.signer |= flags.signer;
                existing.writable |= flags.writable;
            }
            None => seen.push((key, flags)),
        }
    };

    for ix in &tx.instructions {
        for acc in &ix.accounts {
            upsert(
                acc.pubkey,
                AccountFlags {
                    signer: acc.is_signer,
                    writable: acc.is_writable,
                },
            );
        }
        upsert(
            ix.program_id,
            AccountFlags {
                signer: false,
                writable: false,
            },
        );
    }

    let group = |signer: bool, writable: bool| -> Vec<Pubkey> {
        seen.iter()
            .filter(|(_, f)| f.signer == signer && f.writable == writable)
            .map(|(k, _)| *k)
            .collect()
    };

    let writable_signers = group(true, true);
    let readonly_signers = group(true, false);
    let writable_non_signers = group(false, true);
    let readonly_non_signers = group(false, false);

    let header = MessageHeader {
        num_required_signatures: (writable_signers.len() + readonly_signers.len()) as u8,
        num_readonly_signed_accounts: readonly_signers.len() as u8,
        num_readonly_unsigned_accounts: readonly_non_signers.len() as u8,
    };

    let accounts = [
        writable_signers,
        readonly_signers,
        writable_non_signers,
        readonly_non_signers,
    ]
    .concat();

    (accounts, header)
}

/// Solana compact-u16 (shortvec) length prefix
pub(crate) fn write_compact_u16(mut value: u16, buf: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer_tx() -> UnsignedSolanaTransaction {
        let from = [1u8; 32];
        let to = [2u8; 32];
        UnsignedSolanaTransaction {
            recent_blockhash: [9u8; 32],
            fee_payer: from,
            instructions: vec![system_transfer_instruction(from, to, 1_000_000)],
        }
    }

    #[test]
    fn test_transfer_message_layout() {
        let message = serialize_legacy_message(&transfer_tx()).unwrap();

        // header: 1 signer, 0 readonly signed, 1 readonly unsigned (system program)
        assert_eq!(&message[..3], &[1, 0, 1]);
        assert_eq!(message[3], 3);
        assert_eq!(&message[4..36], &[1u8; 32]);
        assert_eq!(&message[36..68], &[2u8; 32]);
        assert_eq!(&message[68..100], &SYSTEM_PROGRAM_ID);
        assert_eq!(&message[100..132], &[9u8; 32]);

        // one instruction: program 2, accounts [0, 1], 12 data bytes
        assert_eq!(&message[132..138], &[1, 2, 2, 0, 1, 12]);
        assert_eq!(&message[138..142], &2u32.to_le_bytes());
        assert_eq!(&message[142..], &1_000_000u64.to_le_bytes());
    }

    #[test]
    fn test_payload_is_message() {
        let tx = transfer_tx();
        let payload = get_solana_message(&tx).unwrap();
        assert_eq!(payload.payload, serialize_legacy_message(&tx).unwrap());
        assert_eq!(payload.key_type, crate::types::KeyType::Eddsa);
        assert!(payload.as_digest().is_err());
    }

    #[test]
    fn test_extra_signer_rejected() {
        let mut tx = transfer_tx();
        tx.instructions[0].accounts[1].is_signer = true;
        assert!(matches!(
            get_solana_message(&tx),
            Err(ChainSigError::InvalidTransaction(_))
        ));
    }

    #[test]
    fn test_empty_instructions_rejected() {
        let mut tx = transfer_tx();
        tx.instructions.clear();
        assert!(get_solana_message(&tx).is_err());
    }

    #[test]
    fn test_compact_u16() {
        let mut buf = Vec::new();
        write_compact_u16(0x7f, &mut buf);
        assert_eq!(buf, vec![0x7f]);

        let mut buf = Vec::new();
        write_compact_u16(0x80, &mut buf);
        assert_eq!(buf, vec![0x80, 0x01]);

        let mut buf = Vec::new();
        write_compact_u16(0x3fff, &mut buf);
        assert_eq!(buf, vec![0xff, 0x7f]);
    }
}
