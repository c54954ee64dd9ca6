//! chainsig CLI
//!
//! Offline helpers around the chainsig core: child key derivation, key
//! format conversion and MPC response normalization.

use anyhow::{Context, Result};
use bitcoin::{Address, CompressedPublicKey, Network};
use chainsig_core::chains::evm::address_from_public_key;
use chainsig_core::utils::crypto::to_checksum_address;
use chainsig_core::utils::logging::enable_debug;
use chainsig_core::{
    derive, normalize_json, to_compressed, ChainSigConfig, ChainSigError, Environment, KdfChain,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

/// Chain signatures toolkit - derive foreign-chain keys from the MPC root key.
#[derive(Parser, Debug)]
#[command(name = "chainsig")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging on stderr.
    #[arg(long, global = true)]
    debug: bool,

    /// JSON configuration file; overrides --env.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Derive the child key and addresses for a predecessor and path.
    Derive {
        /// Signer environment.
        #[arg(long, default_value = "testnet")]
        env: Environment,

        /// Account id (or EVM address) of the requester, used exactly as given.
        #[arg(long)]
        predecessor: String,

        /// Derivation path.
        #[arg(long, default_value = "")]
        path: String,

        /// Derivation domain: 0x1 (EVM) or 0x18d (NEAR). Defaults to the configured domain.
        #[arg(long)]
        kdf_chain: Option<KdfChain>,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Compress an uncompressed SEC1 public key.
    Compress {
        /// Uncompressed key, `04` + 128 hex chars.
        key: String,
    },

    /// Print the root public key of an environment.
    RootKey {
        /// Signer environment.
        #[arg(long, default_value = "testnet")]
        env: Environment,

        /// Print the `secp256k1:<base58>` form instead of SEC1 hex.
        #[arg(long)]
        naj: bool,
    },

    /// Normalize an MPC signature response to its canonical form.
    Normalize {
        /// Response JSON as returned by the signer contract.
        response: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.debug {
        enable_debug();
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let error = match e.downcast_ref::<ChainSigError>() {
                Some(err) => err.to_json(),
                None => serde_json::json!({
                    "code": "cli_error",
                    "message": format!("{:#}", e),
                }),
            };
            eprintln!("{}", serde_json::json!({ "error": error }));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Derive {
            env,
            predecessor,
            path,
            kdf_chain,
            json,
        } => {
            let config = load_config(cli.config.as_ref(), env)?;
            let chain = kdf_chain.unwrap_or(config.kdf_chain);
            let network = match config.environment {
                Some(Environment::Mainnet) => Network::Bitcoin,
                _ => Network::Testnet,
            };

            let child = derive(&config.root_uncompressed()?, &predecessor, &path, chain.tag())?;
            let compressed = to_compressed(&child)?;

            let uncompressed: [u8; 65] = hex::decode(&child)?
                .try_into()
                .map_err(|_| anyhow::anyhow!("derived key has wrong length"))?;
            let evm_address = to_checksum_address(&address_from_public_key(&uncompressed));

            let btc_key = CompressedPublicKey::from_slice(&hex::decode(&compressed)?)
                .context("derived key is not a valid compressed key")?;
            let btc_address = Address::p2wpkh(&btc_key, network).to_string();

            if json {
                let output = serde_json::json!({
                    "predecessor": predecessor,
                    "path": path,
                    "kdf_chain": chain.tag(),
                    "public_key": child,
                    "compressed_public_key": compressed,
                    "evm_address": evm_address,
                    "bitcoin_address": btc_address,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("Public key (uncompressed): {}", child);
                println!("Public key (compressed): {}", compressed);
                println!("EVM address: {}", evm_address);
                println!("Bitcoin address (P2WPKH): {}", btc_address);
            }
        }

        Commands::Compress { key } => {
            println!("{}", to_compressed(&key)?);
        }

        Commands::RootKey { env, naj } => {
            let config = load_config(cli.config.as_ref(), env)?;
            if naj {
                println!("{}", config.root_public_key);
            } else {
                println!("{}", config.root_uncompressed()?);
            }
        }

        Commands::Normalize { response } => {
            let signature = normalize_json(&response)?;
            println!("{}", serde_json::to_string_pretty(&signature)?);
        }
    }

    Ok(())
}

fn load_config(path: Option<&PathBuf>, env: Environment) -> Result<ChainSigConfig> {
    match path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            Ok(ChainSigConfig::from_json_str(&contents)?)
        }
        None => Ok(ChainSigConfig::for_environment(env)),
    }
}
