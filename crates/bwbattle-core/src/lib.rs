//! # bwbattle-core
//!
//! Simulation of one shared router buffer under congestion, comparing how
//! four admission policies treat a prioritized traffic mix
//! (Gold > Silver > Bronze).
//!
//! Runs are deterministic: the same configuration and seed produce the same
//! report, byte for byte.
//!
//! ## Crate structure
//!
//! - [`packet`]: Traffic classes, per-class values, the packet record
//! - [`traffic`]: Seeded, restartable arrival generator
//! - [`buffer`]: Bounded buffer with FIFO or finish-time ordering
//! - [`policy`]: Tail-drop, choke AQM, token-bucket policing, WFQ
//! - [`scheduler`]: One departure attempt per tick, WFQ virtual clock
//! - [`metrics`]: Counters, reports, Prometheus rendering
//! - [`config`]: TOML options resolved into a validated config
//! - [`engine`]: Tick loop, `run`, `compare`
//! - [`error`]: Error types

pub mod buffer;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod packet;
pub mod policy;
pub mod scheduler;
pub mod traffic;

#[cfg(any(test, feature = "test-util"))]
pub mod test_util;

pub use config::{configure, PolicyKind, SimulationConfig, SimulationOptions};
pub use engine::{compare, run, Comparison, Simulation, TickSnapshot};
pub use error::{BufferError, ConfigError, SimError};
pub use metrics::{render_prometheus, render_prometheus_all, Report};
pub use packet::{Packet, PerClass, TrafficClass};
