//! Refsmith CLI
//!
//! Command-line interface for resolving placeholder references in text.
//!
//! # Usage
//!
//! ```bash
//! # Resolve a template file
//! refsmith resolve request.http --var USER=alice
//!
//! # Resolve from stdin
//! echo 'token: {{vault:secret/app#key}}' | refsmith resolve
//!
//! # Explain how a template would resolve, without substituting
//! refsmith explain request.http
//!
//! # Show provider availability
//! refsmith status
//! ```

use std::collections::HashMap;
use std::io::Read;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::FmtSubscriber;

use refsmith_core::{Config, Resolver};

#[derive(Parser)]
#[command(name = "refsmith")]
#[command(about = "Resolve {{namespace:identifier}} placeholders in text")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to a config file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve every placeholder in a file, or stdin when omitted
    Resolve {
        /// Input file; reads stdin when not given
        file: Option<PathBuf>,

        /// Additional variables for traditional lookup (KEY=VALUE, repeatable)
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,

        /// Exit non-zero if any reference fails
        #[arg(long)]
        strict: bool,
    },

    /// Show how each placeholder classifies and would resolve
    Explain {
        /// Input file; reads stdin when not given
        file: Option<PathBuf>,
    },

    /// Show provider availability and authentication state
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        FmtSubscriber::builder()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    }

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Resolve { file, vars, strict } => {
            resolve(config, file.as_deref(), &vars, strict).await
        }
        Commands::Explain { file } => explain(config, file.as_deref()).await,
        Commands::Status => status(config).await,
    }
}

fn read_input(file: Option<&std::path::Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("failed to read stdin")?;
            Ok(text)
        }
    }
}

fn parse_vars(vars: &[String]) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();
    for var in vars {
        let Some((key, value)) = var.split_once('=') else {
            bail!("invalid --var '{}', expected KEY=VALUE", var);
        };
        map.insert(key.to_string(), value.to_string());
    }
    Ok(map)
}

async fn resolve(
    config: Config,
    file: Option<&std::path::Path>,
    vars: &[String],
    strict: bool,
) -> Result<()> {
    let text = read_input(file)?;
    let vars = parse_vars(vars)?;

    let mut resolver = Resolver::initialize(config).await?;
    let result = resolver.resolve(&text, &[vars]).await;
    resolver.shutdown();

    print!("{}", result.text);

    for failure in &result.failures {
        eprintln!(
            "error: {}: {}{}",
            failure.reference,
            failure.kind,
            failure
                .provider
                .as_deref()
                .map(|p| format!(" (provider: {})", p))
                .unwrap_or_default()
        );
    }

    if strict && !result.failures.is_empty() {
        bail!("{} reference(s) failed to resolve", result.failures.len());
    }
    Ok(())
}

async fn explain(config: Config, file: Option<&std::path::Path>) -> Result<()> {
    let text = read_input(file)?;

    let mut resolver = Resolver::initialize(config).await?;
    let explanation = resolver.debug_explain(&text).await;
    resolver.shutdown();

    print!("{}", explanation);
    Ok(())
}

async fn status(config: Config) -> Result<()> {
    let mut resolver = Resolver::initialize(config).await?;
    let statuses = resolver.provider_status();

    println!("Providers:");
    for status in &statuses {
        let state = if !status.enabled {
            "disabled"
        } else if !status.available {
            "unavailable"
        } else if !status.authenticated {
            "unauthenticated"
        } else {
            "ready"
        };
        println!("  {:<8} {}", status.name, state);
    }

    resolver.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vars() {
        let vars = parse_vars(&["USER=alice".to_string(), "HOST=a=b".to_string()]).unwrap();
        assert_eq!(vars.get("USER").map(String::as_str), Some("alice"));
        // Only the first '=' splits.
        assert_eq!(vars.get("HOST").map(String::as_str), Some("a=b"));
    }

    #[test]
    fn test_parse_vars_rejects_missing_equals() {
        assert!(parse_vars(&["USER".to_string()]).is_err());
    }
}
