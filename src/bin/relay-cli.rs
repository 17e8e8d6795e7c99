use clap::{Parser, Subcommand};
use std::io::BufRead;
use std::path::PathBuf;
use zeroize::Zeroizing;

use tx_relay::config::load_config;
use tx_relay::vault::KeyVault;

#[derive(Parser)]
#[command(name = "relay-cli")]
#[command(about = "Key vault management for the transaction relay", long_about = None)]
struct Cli {
    /// Relay configuration file (vault path and master secret variable).
    #[arg(short, long, default_value = "relay.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Seal a private key under an id. The key is read from stdin unless
    /// --key-env names a variable holding it.
    Store {
        id: String,
        #[arg(long)]
        key_env: Option<String>,
        /// Mark the identity as a pool member.
        #[arg(long)]
        pool: bool,
    },
    /// Check whether an id is stored
    Exists { id: String },
    /// Delete a stored identity
    Delete { id: String },
    /// Replace an identity's key with a freshly generated one
    Rotate { id: String },
    /// List stored identities (addresses only)
    List,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(Some(&cli.config))?;
    let vault = KeyVault::open(&config.vault)?;

    match cli.command {
        Commands::Store { id, key_env, pool } => {
            let key = match key_env {
                Some(var) => Zeroizing::new(std::env::var(&var).map_err(|_| {
                    format!("environment variable {} is not set", var)
                })?),
                None => read_key_from_stdin()?,
            };
            let address = vault.store_identity(&id, key.trim(), pool)?;
            println!("{} {}", id, address);
        }
        Commands::Exists { id } => {
            let exists = vault.exists(&id);
            println!("{}", exists);
            if !exists {
                std::process::exit(1);
            }
        }
        Commands::Delete { id } => {
            vault.delete(&id)?;
            println!("deleted {}", id);
        }
        Commands::Rotate { id } => {
            let address = vault.rotate(&id)?;
            println!("{} {}", id, address);
        }
        Commands::List => {
            let records = vault.list()?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
    }

    Ok(())
}

fn read_key_from_stdin() -> Result<Zeroizing<String>, Box<dyn std::error::Error>> {
    let mut line = Zeroizing::new(String::new());
    std::io::stdin().lock().read_line(&mut line)?;
    if line.trim().is_empty() {
        return Err("no private key on stdin".into());
    }
    Ok(line)
}
