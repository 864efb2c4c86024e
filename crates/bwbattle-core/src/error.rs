//! Error types for the simulation core.
//!
//! - **`ConfigError`**: rejected configuration, raised before any tick runs
//! - **`BufferError`**: buffer operations (an empty buffer is an ordinary idle tick)
//! - **`SimError`**: what `run`/`step` return; invariant violations are fatal

use thiserror::Error;

// ── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid config TOML: {0}")]
    Toml(String),
    #[error("{field} must be a probability in [0, 1], got {value}")]
    Probability { field: String, value: f64 },
    #[error("{field} must be a finite non-negative rate, got {value}")]
    NegativeRate { field: String, value: f64 },
    #[error("{field} must be positive, got {value}")]
    NonPositive { field: String, value: f64 },
    #[error("{field} must be in {range}, got {value}")]
    OutOfRange {
        field: String,
        range: &'static str,
        value: f64,
    },
    #[error("class weights must not increase with lower priority (gold {gold} >= silver {silver} >= bronze {bronze})")]
    WeightOrder { gold: f64, silver: f64, bronze: f64 },
    #[error("arrival mix has no weight: at least one class rate must be above zero")]
    EmptyMix,
    #[error("packet size range for {class} is empty ({min} > {max})")]
    EmptySizeRange {
        class: &'static str,
        min: u32,
        max: u32,
    },
}

// ── Buffer ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BufferError {
    #[error("buffer capacity {capacity} exceeded")]
    CapacityExceeded { capacity: usize },
    #[error("buffer is empty")]
    EmptyBuffer,
}

// ── Simulation ──────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Internal logic fault. `state` holds a JSON dump of the run at the
    /// moment of failure.
    #[error("invariant violated at tick {tick}: {reason}")]
    InvariantViolation {
        tick: u64,
        reason: String,
        state: String,
    },
}
