//! # Simulation Engine
//!
//! Drives one run tick by tick: generate, admit each arrival in generation
//! order, serve once, record. [`run`] plays a whole run; [`Simulation::step`]
//! exposes the same loop one tick at a time for live consumers.
//!
//! After every tick the engine re-checks its invariants (buffer bound, token
//! range, conservation). A violation aborts the run with a JSON dump of the
//! state at that moment.

use serde::Serialize;
use tracing::{debug, error, info, trace};

use crate::buffer::Buffer;
use crate::config::{PolicyKind, SimulationConfig};
use crate::error::SimError;
use crate::metrics::{ClassCounters, MetricsCollector, Report, RunSummary};
use crate::packet::{Packet, PerClass, TrafficClass};
use crate::policy::{AdmissionPolicy, Decision, PolicyState, TickState};
use crate::scheduler::{Scheduler, ServeOutcome};
use crate::traffic::TrafficGenerator;

/// State of a run between two ticks. Cloned out, never borrowed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickSnapshot {
    pub policy: PolicyKind,
    /// Ticks completed so far.
    pub ticks_completed: u64,
    pub occupancy: usize,
    pub capacity: usize,
    pub buffered: PerClass<usize>,
    /// Buffer contents, head first.
    pub queue: Vec<Packet>,
    /// Packet served in the last completed tick, if any.
    pub served: Option<Packet>,
    pub virtual_clock: f64,
    pub policy_state: PolicyState,
    pub counters: PerClass<ClassCounters>,
    pub preemptions: u64,
}

pub struct Simulation {
    config: SimulationConfig,
    traffic: TrafficGenerator,
    buffer: Buffer,
    policy: AdmissionPolicy,
    scheduler: Scheduler,
    metrics: MetricsCollector,
    ticks_completed: u64,
    last_served: Option<Packet>,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Result<Self, SimError> {
        config.validate()?;
        let traffic = TrafficGenerator::from_config(&config)?;
        Ok(Self {
            traffic,
            buffer: Buffer::new(config.buffer_capacity),
            policy: AdmissionPolicy::from_config(&config),
            scheduler: Scheduler::new(config.service_probability, config.seed),
            metrics: MetricsCollector::new(config.record_series),
            ticks_completed: 0,
            last_served: None,
            config,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn is_finished(&self) -> bool {
        self.traffic.remaining() == 0
    }

    /// Runs one tick. `Ok(None)` once every configured tick has run.
    pub fn step(&mut self) -> Result<Option<TickSnapshot>, SimError> {
        if self.advance()? {
            Ok(Some(self.snapshot()))
        } else {
            Ok(None)
        }
    }

    pub fn snapshot(&self) -> TickSnapshot {
        TickSnapshot {
            policy: self.policy.kind(),
            ticks_completed: self.ticks_completed,
            occupancy: self.buffer.occupancy(),
            capacity: self.buffer.capacity(),
            buffered: self.buffer.count_by_class(),
            queue: self.buffer.iter().cloned().collect(),
            served: self.last_served.clone(),
            virtual_clock: self.scheduler.virtual_clock(),
            policy_state: self.policy.state(&self.buffer),
            counters: *self.metrics.counters(),
            preemptions: self.metrics.preemptions(),
        }
    }

    /// Report over the ticks run so far.
    pub fn finish(self) -> Report {
        let report = self.metrics.report(RunSummary {
            policy: self.policy.kind(),
            seed: self.config.seed,
            final_occupancy: self.buffer.occupancy(),
            peak_occupancy: self.buffer.max_occupancy_seen(),
        });
        info!(
            policy = report.policy.as_str(),
            ticks = report.total_ticks,
            gold_loss = report.classes.gold.loss_rate,
            silver_loss = report.classes.silver.loss_rate,
            bronze_loss = report.classes.bronze.loss_rate,
            preemptions = report.preemptions,
            "run finished"
        );
        report
    }

    fn advance(&mut self) -> Result<bool, SimError> {
        let Some(arrivals) = self.traffic.next() else {
            return Ok(false);
        };
        let state = TickState {
            tick: arrivals.tick,
            virtual_clock: self.scheduler.virtual_clock(),
        };

        self.policy.begin_tick(&state);
        for packet in arrivals.packets {
            self.admit(packet, &state)?;
        }

        self.last_served = match self.scheduler.serve(&mut self.buffer) {
            ServeOutcome::Served(packet) => {
                self.metrics.record_serve(packet.class);
                Some(packet)
            }
            ServeOutcome::Idle => None,
        };
        self.metrics.record_tick(self.buffer.occupancy());
        self.ticks_completed += 1;

        self.check_invariants(state.tick)?;
        Ok(true)
    }

    fn admit(&mut self, mut packet: Packet, state: &TickState) -> Result<(), SimError> {
        let class = packet.class;
        self.metrics.record_arrival(class);

        match self.policy.decide(&self.buffer, &mut packet, state) {
            Decision::Admit => self.enqueue(packet, state.tick),
            Decision::Drop(reason) => {
                trace!(tick = state.tick, id = packet.id, %class, ?reason, "dropped");
                self.metrics.record_drop(class, reason);
                Ok(())
            }
            Decision::AdmitWithPreemption { evict } => {
                let Some(victim) = self.buffer.remove_specific(|p| p.id == evict) else {
                    return Err(self.violation(
                        state.tick,
                        format!("preemption target {evict} not in buffer"),
                    ));
                };
                debug!(
                    tick = state.tick,
                    id = packet.id,
                    %class,
                    evicted = victim.id,
                    victim_class = %victim.class,
                    "preempted"
                );
                self.metrics.record_evict(victim.class);
                self.enqueue(packet, state.tick)
            }
        }
    }

    fn enqueue(&mut self, packet: Packet, tick: u64) -> Result<(), SimError> {
        let class = packet.class;
        let at = self.policy.insert_position();
        if let Err(e) = self.buffer.insert(packet, at) {
            return Err(self.violation(tick, format!("admitted {class} packet: {e}")));
        }
        self.metrics.record_admit(class);
        Ok(())
    }

    fn check_invariants(&self, tick: u64) -> Result<(), SimError> {
        if self.buffer.occupancy() > self.buffer.capacity() {
            return Err(self.violation(
                tick,
                format!(
                    "occupancy {} above capacity {}",
                    self.buffer.occupancy(),
                    self.buffer.capacity()
                ),
            ));
        }
        if let PolicyState::Tokens(tokens) = self.policy.state(&self.buffer) {
            for class in TrafficClass::ALL {
                let max = self.config.token_bucket.max_bucket_size[class];
                if tokens[class] < 0.0 || tokens[class] > max {
                    return Err(self.violation(
                        tick,
                        format!("{class} tokens {} outside [0, {max}]", tokens[class]),
                    ));
                }
            }
        }
        if let Err(reason) = self
            .metrics
            .check_conservation(&self.buffer.count_by_class())
        {
            return Err(self.violation(tick, reason));
        }
        Ok(())
    }

    fn violation(&self, tick: u64, reason: String) -> SimError {
        let state = serde_json::to_string(&self.snapshot())
            .unwrap_or_else(|e| format!("{{\"unserializable\":\"{e}\"}}"));
        error!(tick, %reason, %state, "invariant violated, aborting run");
        SimError::InvariantViolation {
            tick,
            reason,
            state,
        }
    }
}

/// Runs a whole simulation and returns its report.
pub fn run(config: SimulationConfig) -> Result<Report, SimError> {
    info!(
        policy = config.policy.as_str(),
        seed = config.seed,
        ticks = config.total_ticks,
        capacity = config.buffer_capacity,
        "starting run"
    );
    let mut sim = Simulation::new(config)?;
    while sim.advance()? {}
    Ok(sim.finish())
}

/// Reports for all four policies over identical traffic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub reports: Vec<Report>,
}

impl Comparison {
    pub fn report(&self, policy: PolicyKind) -> Option<&Report> {
        self.reports.iter().find(|r| r.policy == policy)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Runs every policy, one after another, with `config`'s seed and traffic.
pub fn compare(config: &SimulationConfig) -> Result<Comparison, SimError> {
    let reports = PolicyKind::ALL
        .into_iter()
        .map(|kind| run(config.with_policy(kind)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Comparison { reports })
}
