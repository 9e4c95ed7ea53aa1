pub mod telemetry;
pub mod vote;
