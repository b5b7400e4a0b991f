use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::ResolverConfig;

/// Prefix of the environment variables layered over the file
pub const ENV_PREFIX: &str = "HOMING";

fn file_format(config_path: &Path) -> FileFormat {
    match config_path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        Some("ini") => FileFormat::Ini,
        _ => FileFormat::Toml, // Default to TOML
    }
}

/// Load configuration from an optional file plus `HOMING_*` environment variables.
///
/// A missing file is not an error; every value then comes from the
/// environment or the defaults. Nested keys use `__`, e.g.
/// `HOMING_BACKEND__URL` or `HOMING_PROBE__LOCAL_PROBE`.
pub fn load_config(config_path: Option<&str>) -> Result<ResolverConfig> {
    load_config_with_env(config_path, Environment::with_prefix(ENV_PREFIX))
}

fn load_config_with_env(config_path: Option<&str>, env: Environment) -> Result<ResolverConfig> {
    let mut builder = Config::builder();

    if let Some(config_path) = config_path {
        let path = Path::new(config_path);
        builder = builder.add_source(File::new(config_path, file_format(path)).required(false));
    }

    let settings = builder
        .add_source(
            env.prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| match config_path {
            Some(path) => format!("Failed to build config from {path}"),
            None => "Failed to build config from environment".to_string(),
        })?;

    let resolver_config: ResolverConfig = settings
        .try_deserialize()
        .wrap_err("Failed to deserialize resolver config")?;

    Ok(resolver_config)
}
