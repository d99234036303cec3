//! OpenTelemetry integration for kiroku.
//!
//! Provides the OTel tracing layer and a sampler that keeps every history
//! build and replay span while thinning out per-record store traffic.
//!
//! # Activation
//!
//! Build with the `telemetry` feature. Export then activates when standard
//! OTel environment variables are set:
//!
//! ```bash
//! OTEL_EXPORTER_OTLP_ENDPOINT=http://localhost:4317 kiroku replay --db doc.db
//! ```
//!
//! Set `OTEL_SDK_DISABLED=true` to explicitly disable even when the endpoint is set.

#[cfg(feature = "telemetry")]
mod otel;

#[cfg(feature = "telemetry")]
pub use otel::{OtelGuard, otel_layer};

/// Check whether OTel export should be enabled.
///
/// Returns `true` when standard OTel env vars indicate export is desired:
/// - `OTEL_SDK_DISABLED` is NOT set to `"true"`
/// - AND at least one of:
///   - `OTEL_EXPORTER_OTLP_ENDPOINT` is set
///   - `OTEL_TRACES_EXPORTER` is set (and not `"none"`)
pub fn otel_enabled() -> bool {
    enabled_from(|key| std::env::var(key).ok())
}

fn enabled_from(var: impl Fn(&str) -> Option<String>) -> bool {
    if var("OTEL_SDK_DISABLED").is_some_and(|v| v.eq_ignore_ascii_case("true")) {
        return false;
    }
    if var("OTEL_EXPORTER_OTLP_ENDPOINT").is_some() {
        return true;
    }
    var("OTEL_TRACES_EXPORTER").is_some_and(|exporter| !exporter.eq_ignore_ascii_case("none"))
}

/// Sampling rate for a span name.
///
/// | Prefix       | Rate | Spans                                  |
/// |--------------|------|----------------------------------------|
/// | `history.*`  | 100% | Tree builds and replays                |
/// | `hydrate.*`  | 100% | Bookmark fetches                       |
/// | `store.*`    |  1%  | Per-record store round-trips           |
/// | other        | 10%  | Unclassified                           |
pub fn sample_rate(name: &str) -> f64 {
    if name.starts_with("history") || name.starts_with("hydrate") {
        1.0
    } else if name.starts_with("store") {
        0.01
    } else {
        0.1
    }
}
