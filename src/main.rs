use std::path::Path;

use clap::{Parser, Subcommand};
use color_eyre::{Result, eyre::Context};
use homing::{
    EndpointResolver, ResolverConfig,
    config::{ResolverConfigValidator, load_config},
    metrics, tracing_setup,
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    /// Configuration file (optional; HOMING_* environment variables override it)
    #[clap(short, long, default_value = "homing.toml", global = true)]
    config: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve the backend address (default)
    Resolve {
        /// Print the address and how it was found as JSON
        #[clap(long)]
        json: bool,
    },
    /// Print the best address known right now without touching the network
    Peek,
    /// List candidate hosts without verifying them
    Candidates,
    /// Forget the cached endpoint and detected addresses
    Clear,
    /// Manage the user-supplied backend override
    Override {
        #[clap(subcommand)]
        action: OverrideAction,
    },
    /// Validate the configuration
    Validate,
    /// Initialize a new configuration file
    Init,
}

#[derive(Subcommand, Debug)]
enum OverrideAction {
    /// Always use this backend address
    Set { url: String },
    /// Go back to automatic resolution
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let command = args.command.unwrap_or(Commands::Resolve { json: false });

    match command {
        Commands::Validate => return validate_config_command(&args.config),
        Commands::Init => return init_config_command(&args.config).await,
        _ => {}
    }

    let config = load_config(Some(&args.config))
        .with_context(|| format!("Failed to load configuration from {}", args.config))?;
    tracing_setup::init_tracing_with_config(config.log_level(), config.logging.json)?;
    metrics::init_metrics();

    if let Err(e) = ResolverConfigValidator::validate(&config) {
        tracing::warn!("Configuration has problems, continuing with what is usable: {}", e);
    }
    let persistent = config.storage.path.is_some();
    let resolver = EndpointResolver::from_config(config)?;

    match command {
        Commands::Resolve { json } => {
            let resolved = resolver.resolve_detailed().await;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&resolved)
                        .context("Failed to encode resolution")?
                );
            } else {
                println!("{}", resolved.address);
            }
        }
        Commands::Peek => {
            println!("{}", resolver.resolve_best_effort());
        }
        Commands::Candidates => {
            let candidates = resolver.gather_candidates().await;
            if candidates.is_empty() {
                println!("No candidate hosts found");
            }
            for candidate in candidates.iter() {
                println!("{:<40} {}", candidate.host, candidate.technique);
            }
        }
        Commands::Clear => {
            warn_if_ephemeral(persistent);
            resolver.clear();
            println!("✅ Endpoint cache cleared");
        }
        Commands::Override { action } => {
            warn_if_ephemeral(persistent);
            match action {
                OverrideAction::Set { url } => {
                    let address = resolver.set_user_override(&url)?;
                    println!("✅ Backend override set to {address}");
                }
                OverrideAction::Clear => {
                    resolver.clear_user_override()?;
                    println!("✅ Backend override cleared");
                }
            }
        }
        Commands::Validate | Commands::Init => unreachable!(),
    }

    Ok(())
}

fn warn_if_ephemeral(persistent: bool) {
    if !persistent {
        eprintln!("⚠️  No storage.path configured; this change only lasts for this process");
    }
}

/// Validate configuration and exit
fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration: {config_path}");

    if !Path::new(config_path).exists() {
        println!("ℹ️  No file at '{config_path}', checking defaults and HOMING_* variables");
    }

    let config = match load_config(Some(config_path)) {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e:#}");
            std::process::exit(1);
        }
    };

    match ResolverConfigValidator::validate(&config) {
        Ok(()) => {
            print_summary(&config);
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Ensure addresses start with http:// or https://");
            println!("   • Ports must be between 1 and 65535");
            println!("   • STUN servers are written as host:port");
            std::process::exit(1);
        }
    }
}

fn print_summary(config: &ResolverConfig) {
    let probe = &config.probe;
    println!("✅ Configuration validation: OK");
    println!();
    println!("📋 Configuration Summary:");
    println!(
        "   • Backend override: {}",
        config
            .backend
            .url
            .as_deref()
            .or(config.backend.host.as_deref())
            .unwrap_or("none")
    );
    println!("   • Origin: {}", config.origin.as_deref().unwrap_or("none"));
    println!(
        "   • Default backend: {}://<host>:{}",
        config.default_protocol, config.default_port
    );
    println!("   • Fallback: {}", config.fallback_address);
    println!(
        "   • Health check: GET {} ({} ms)",
        config.health_check.path, config.health_check.timeout_ms
    );
    println!("   • Local probe: {:?}", probe.local_probe);
    println!(
        "   • External lookup: {}",
        probe.external_lookup_url.as_deref().unwrap_or("disabled")
    );
    println!("   • Common candidates: {}", probe.common_candidates.len());
    println!(
        "   • Storage: {}",
        config.storage.path.as_deref().unwrap_or("in-memory")
    );
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# Homing backend resolution configuration

# Host the client was served from; a non-loopback host is used directly
# origin = "192.168.1.50"

default_protocol = "http"
default_port = 8001
fallback_address = "http://localhost:8001"
debug = false

# Uncomment to pin the backend and skip discovery entirely
# [backend]
# url = "http://10.0.0.5:9000"
# or assemble it from parts:
# host = "10.0.0.5"
# port = 9000
# protocol = "http"

[health_check]
path = "/health"
timeout_ms = 3000

[probe]
# stun | interfaces | none
local_probe = "stun"
local_probe_timeout_ms = 3000
stun_servers = ["stun.l.google.com:19302"]
external_lookup_url = "https://api.ipify.org?format=json"
external_lookup_timeout_ms = 5000
common_candidates = [
    "192.168.1.1", "192.168.1.100",
    "192.168.0.1", "192.168.0.100",
    "10.0.0.1", "10.0.0.100",
    "172.16.0.1", "172.16.0.100",
]

[storage]
# Remembers the last working backend between runs
path = "homing-state.json"

[logging]
level = "info"
json = false
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'homing --config {config_path} resolve' to find the backend");
    Ok(())
}
