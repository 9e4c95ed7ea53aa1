// Website risk scoring
// Flag telemetry → base score → temporal decay → risk level → warn / don't warn.
// Pure functions except `monitor`, which fetches telemetry through `TelemetrySource`.

pub mod assessment;
pub mod classifier;
pub mod handlers;
pub mod monitor;
pub mod scoring;
