//! MountKV CLI - Command line interface for mounted key-value storage.
//!
//! Each invocation builds a storage from configuration, runs one command
//! and disposes the storage again.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

use mountkv_common::StorageValue;
use mountkv_storage::{create_default_registry, ProviderConfig, Storage, StorageConfig};

#[derive(Parser)]
#[command(name = "mountkv")]
#[command(about = "MountKV - Key-value storage with mountable providers")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Storage configuration file (JSON).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use a local directory as the default provider.
    #[arg(short, long)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the value stored at a key.
    Get {
        key: String,
    },

    /// Store a value. Valid JSON is stored as JSON, anything else as a string.
    Set {
        key: String,
        value: String,
    },

    /// Check whether a key exists.
    Has {
        key: String,
    },

    /// Remove a key.
    Remove {
        key: String,
    },

    /// List every key across all mounts.
    Keys,

    /// Remove every key from every mount.
    Clear,

    /// List mounts in resolution order.
    Mounts,

    /// Show which mount serves a key and the key it receives.
    Resolve {
        key: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(cli.config.as_deref(), cli.root.as_deref())?;
    let storage = Storage::from_config(&config, &create_default_registry())
        .context("Failed to build storage")?;

    let outcome = run(&storage, cli.command).await;
    let disposed = storage.dispose().await.context("Failed to dispose storage");

    outcome.and(disposed)
}

/// Load configuration from `path`, the default location, or nothing.
fn load_config(path: Option<&Path>, root: Option<&Path>) -> Result<StorageConfig> {
    let mut config = match path {
        Some(path) => StorageConfig::from_file(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        None => match default_config_path().filter(|p| p.is_file()) {
            Some(path) => {
                debug!("Using config {}", path.display());
                StorageConfig::from_file(&path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?
            }
            None => StorageConfig::default(),
        },
    };

    if let Some(root) = root {
        config.default = Some(ProviderConfig {
            provider: "local".to_string(),
            options: serde_json::json!({ "root": root }),
        });
    }

    Ok(config)
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("mountkv").join("storage.json"))
}

/// Parse a command-line value, falling back to a plain string.
fn parse_value(raw: &str) -> StorageValue {
    serde_json::from_str(raw).unwrap_or_else(|_| StorageValue::String(raw.to_string()))
}

async fn run(storage: &Storage, command: Commands) -> Result<()> {
    match command {
        Commands::Get { key } => {
            match storage.get_item(&key).await.context("Failed to read key")? {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => println!("(not set)"),
            }
        }

        Commands::Set { key, value } => {
            storage
                .set_item(&key, parse_value(&value))
                .await
                .context("Failed to write key")?;
            println!("Stored {}", key);
        }

        Commands::Has { key } => {
            let exists = storage.has_item(&key).await.context("Failed to check key")?;
            println!("{}", exists);
        }

        Commands::Remove { key } => {
            storage.remove_item(&key).await.context("Failed to remove key")?;
            println!("Removed {}", key);
        }

        Commands::Keys => {
            let mut keys = storage.get_keys().await.context("Failed to list keys")?;
            keys.sort();
            for key in keys {
                println!("{}", key);
            }
        }

        Commands::Clear => {
            storage.clear().await.context("Failed to clear storage")?;
            println!("Storage cleared.");
        }

        Commands::Mounts => {
            for mount in storage.mounts()? {
                let base = if mount.base.is_empty() {
                    "(default)"
                } else {
                    mount.base.as_str()
                };
                println!("  {:<24} {}", base, mount.provider);
            }
        }

        Commands::Resolve { key } => {
            let resolved = storage.resolve(&key)?;
            println!("Provider: {}", resolved.provider.name());
            println!("Base:     {}", resolved.base);
            println!("Key:      {}", resolved.key);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("42"), serde_json::json!(42));
        assert_eq!(parse_value(r#"{"a":1}"#), serde_json::json!({"a": 1}));
        assert_eq!(parse_value("hello"), serde_json::json!("hello"));
    }

    #[test]
    fn test_root_overrides_default_provider() {
        let config = load_config(None, Some(Path::new("/tmp/mountkv-data"))).unwrap();
        let default = config.default.unwrap();
        assert_eq!(default.provider, "local");
        assert_eq!(default.options, serde_json::json!({"root": "/tmp/mountkv-data"}));
    }
}
