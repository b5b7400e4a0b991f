use eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::core::address::ProbeTechnique;

/// Initialize tracing with an explicit level and format.
///
/// `RUST_LOG` still wins when set. Output goes to stderr so command output on
/// stdout stays machine readable.
pub fn init_tracing_with_config(level: &str, json_format: bool) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            EnvFilter::try_new(level).wrap_err_with(|| format!("Invalid log level: {level}"))?
        }
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);

    let result = if json_format {
        Registry::default()
            .with(env_filter)
            .with(fmt_layer.json().with_current_span(true).with_span_list(true))
            .try_init()
    } else {
        Registry::default()
            .with(env_filter)
            .with(fmt_layer.compact())
            .try_init()
    };
    result.wrap_err("Failed to install tracing subscriber")?;

    tracing::debug!(log_level = level, json = json_format, "homing logging initialized");
    Ok(())
}

/// Span covering one resolution pass
pub fn create_resolution_span(pass_id: &str) -> tracing::Span {
    tracing::info_span!(
        "resolution",
        pass.id = pass_id,
        resolution.source = tracing::field::Empty,
        resolution.address = tracing::field::Empty,
    )
}

/// Span covering one candidate gathering technique
pub fn create_probe_span(technique: ProbeTechnique) -> tracing::Span {
    tracing::debug_span!(
        "probe",
        probe.technique = technique.as_str(),
        probe.candidates = tracing::field::Empty,
    )
}
