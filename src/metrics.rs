//! Lightweight metrics helpers for homing.
//!
//! Thin wrappers over the `metrics` crate macros. No exporter is embedded; an
//! application embedding the resolver installs whichever recorder it likes.
//!
//! Provided metrics:
//! * `homing_resolutions_total` (counter, label `source`)
//! * `homing_resolution_duration_seconds` (histogram)
//! * `homing_verifications_total` (counter, label `outcome`)
//! * `homing_candidates_total` (counter, label `technique`)
//! * `homing_endpoint_reachable` (gauge per endpoint)
//!
//! [`ResolutionTimer`] records the pass duration on `Drop`, so early returns
//! are measured as well.
use std::time::Instant;

use metrics::{Unit, counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::Lazy;

use crate::core::address::{ProbeTechnique, ResolutionSource};

pub const HOMING_RESOLUTIONS_TOTAL: &str = "homing_resolutions_total";
pub const HOMING_RESOLUTION_DURATION_SECONDS: &str = "homing_resolution_duration_seconds";
pub const HOMING_VERIFICATIONS_TOTAL: &str = "homing_verifications_total";
pub const HOMING_CANDIDATES_TOTAL: &str = "homing_candidates_total";
pub const HOMING_ENDPOINT_REACHABLE: &str = "homing_endpoint_reachable";

/// Registers metric descriptions once, on first use
static DESCRIPTIONS: Lazy<()> = Lazy::new(|| {
    describe_counter!(
        HOMING_RESOLUTIONS_TOTAL,
        Unit::Count,
        "Completed resolution passes, by the step that produced the address."
    );
    describe_histogram!(
        HOMING_RESOLUTION_DURATION_SECONDS,
        Unit::Seconds,
        "Wall time of a full resolution pass."
    );
    describe_counter!(
        HOMING_VERIFICATIONS_TOTAL,
        Unit::Count,
        "Health checks issued against candidate endpoints."
    );
    describe_counter!(
        HOMING_CANDIDATES_TOTAL,
        Unit::Count,
        "Candidate hosts proposed, by discovery technique."
    );
    describe_gauge!(
        HOMING_ENDPOINT_REACHABLE,
        "Reachability of endpoints as last verified (1 reachable, 0 unreachable)"
    );
});

/// Count a completed resolution pass.
pub fn increment_resolution_total(source: &ResolutionSource) {
    counter!(HOMING_RESOLUTIONS_TOTAL, "source" => source.to_string()).increment(1);
}

/// Record a verification outcome and the endpoint's reachability gauge.
pub fn record_verification(endpoint: &str, reachable: bool) {
    Lazy::force(&DESCRIPTIONS);
    let value = if reachable { 1.0 } else { 0.0 };

    let outcome = if reachable { "reachable" } else { "unreachable" };
    counter!(HOMING_VERIFICATIONS_TOTAL, "outcome" => outcome).increment(1);
    gauge!(HOMING_ENDPOINT_REACHABLE, "endpoint" => endpoint.to_string()).set(value);
}

/// Count candidates proposed by one technique.
pub fn add_candidates(technique: ProbeTechnique, count: usize) {
    counter!(HOMING_CANDIDATES_TOTAL, "technique" => technique.as_str()).increment(count as u64);
}

/// RAII helper measuring a resolution pass.
pub struct ResolutionTimer {
    start: Instant,
}

impl ResolutionTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for ResolutionTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ResolutionTimer {
    fn drop(&mut self) {
        histogram!(HOMING_RESOLUTION_DURATION_SECONDS).record(self.start.elapsed().as_secs_f64());
    }
}

/// Initialize metric descriptions (idempotent).
pub fn init_metrics() {
    Lazy::force(&DESCRIPTIONS);
    tracing::debug!("homing metric descriptions registered");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_verification_without_recorder() {
        // No recorder installed: recording is a no-op and must not panic
        record_verification("http://metrics-test:8001", true);
        record_verification("http://metrics-test:8001", false);
    }

    #[test]
    fn test_resolution_timer() {
        let timer = ResolutionTimer::new();
        // Records on drop
        drop(timer);
    }

    #[test]
    fn test_counters_without_recorder() {
        init_metrics();
        increment_resolution_total(&ResolutionSource::Discovery(ProbeTechnique::CommonRange));
        add_candidates(ProbeTechnique::LocalNetwork, 3);
    }
}
