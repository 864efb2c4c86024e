//! Fixtures shared by unit and integration tests. Built only for tests or
//! with the `test-util` feature.

use crate::config::{ArrivalModel, PolicyKind, SimulationConfig};

/// Capacity 20, rates 0.3/0.3/0.4, 1000 ticks, seed 42.
pub fn reference_config() -> SimulationConfig {
    SimulationConfig::default()
}

pub fn reference_with(policy: PolicyKind) -> SimulationConfig {
    reference_config().with_policy(policy)
}

/// Several packets per tick against a one-per-tick server: the buffer
/// stays full for most of the run.
pub fn overload_config(policy: PolicyKind) -> SimulationConfig {
    let mut cfg = reference_with(policy);
    cfg.traffic.model = ArrivalModel::Mix {
        packets_per_tick: 3,
    };
    cfg.service_probability = 1.0;
    cfg.total_ticks = 500;
    cfg
}
