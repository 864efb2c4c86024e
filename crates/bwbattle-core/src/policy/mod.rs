//! Admission policies for the shared router buffer.
//!
//! Each arriving packet is offered to exactly one policy per run, which
//! decides whether it enters the buffer and what, if anything, it evicts:
//! - **TailDrop**: class-blind, admit while there is room (baseline)
//! - **ChokeAqm**: above an occupancy threshold only Gold gets in
//! - **TokenBucket**: per-class credit pools police sustained rates
//! - **WeightedFairQueuing**: finish-time ordering with preemption of lower
//!   weight traffic when full

pub mod choke;
pub mod tail_drop;
pub mod token_bucket;
pub mod wfq;

pub use choke::ChokeAqm;
pub use tail_drop::TailDrop;
pub use token_bucket::{Bucket, TokenBucketPolicy};
pub use wfq::WeightedFairQueuing;

use serde::{Deserialize, Serialize};

use crate::buffer::{Buffer, InsertAt};
use crate::config::{PolicyKind, SimulationConfig};
use crate::packet::{Packet, PerClass};

/// Per-tick context handed to every decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickState {
    pub tick: u64,
    /// WFQ system virtual time; the scheduler owns and advances it.
    pub virtual_clock: f64,
}

/// Why a packet did not make it into (or stay in) the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Buffer full.
    Capacity,
    /// ChokeAqm shed a non-Gold packet while congested.
    Congestion,
    /// TokenBucket had no token for the class.
    Policed,
    /// Evicted from the buffer by a higher-weight WFQ arrival.
    Preempted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Admit,
    Drop(DropReason),
    /// Admit after removing the buffered packet with this id.
    AdmitWithPreemption { evict: u64 },
}

/// Policy-internal state exposed in snapshots and failure dumps.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyState {
    Stateless,
    Choke { congested: bool },
    Tokens(PerClass<f64>),
}

/// The active admission policy, fixed for the whole run.
#[derive(Debug, Clone)]
pub enum AdmissionPolicy {
    TailDrop(TailDrop),
    ChokeAqm(ChokeAqm),
    TokenBucket(TokenBucketPolicy),
    Wfq(WeightedFairQueuing),
}

impl AdmissionPolicy {
    pub fn from_config(cfg: &SimulationConfig) -> Self {
        match cfg.policy {
            PolicyKind::TailDrop => AdmissionPolicy::TailDrop(TailDrop),
            PolicyKind::ChokeAqm => AdmissionPolicy::ChokeAqm(ChokeAqm::new(&cfg.choke)),
            PolicyKind::TokenBucket => {
                AdmissionPolicy::TokenBucket(TokenBucketPolicy::new(&cfg.token_bucket))
            }
            PolicyKind::Wfq => AdmissionPolicy::Wfq(WeightedFairQueuing::new(&cfg.wfq)),
        }
    }

    pub fn kind(&self) -> PolicyKind {
        match self {
            AdmissionPolicy::TailDrop(_) => PolicyKind::TailDrop,
            AdmissionPolicy::ChokeAqm(_) => PolicyKind::ChokeAqm,
            AdmissionPolicy::TokenBucket(_) => PolicyKind::TokenBucket,
            AdmissionPolicy::Wfq(_) => PolicyKind::Wfq,
        }
    }

    /// Called once at the start of every tick, before any arrival.
    pub fn begin_tick(&mut self, _tick: &TickState) {
        if let AdmissionPolicy::TokenBucket(tb) = self {
            tb.refill();
        }
    }

    /// Decides the fate of one arrival against the current buffer state.
    ///
    /// WFQ stamps `packet.finish_time`; other policies leave the packet alone.
    pub fn decide(&mut self, buffer: &Buffer, packet: &mut Packet, tick: &TickState) -> Decision {
        match self {
            AdmissionPolicy::TailDrop(p) => p.decide(buffer),
            AdmissionPolicy::ChokeAqm(p) => p.decide(buffer, packet),
            AdmissionPolicy::TokenBucket(p) => p.decide(buffer, packet),
            AdmissionPolicy::Wfq(p) => p.decide(buffer, packet, tick),
        }
    }

    pub fn insert_position(&self) -> InsertAt {
        match self {
            AdmissionPolicy::Wfq(_) => InsertAt::Sorted,
            _ => InsertAt::Tail,
        }
    }

    pub fn state(&self, buffer: &Buffer) -> PolicyState {
        match self {
            AdmissionPolicy::TailDrop(_) | AdmissionPolicy::Wfq(_) => PolicyState::Stateless,
            AdmissionPolicy::ChokeAqm(p) => PolicyState::Choke {
                congested: p.is_congested(buffer),
            },
            AdmissionPolicy::TokenBucket(p) => PolicyState::Tokens(p.tokens()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::TrafficClass;

    #[test]
    fn from_config_selects_policy_and_order() {
        let base = SimulationConfig::default();
        for kind in PolicyKind::ALL {
            let policy = AdmissionPolicy::from_config(&base.with_policy(kind));
            assert_eq!(policy.kind(), kind);
            let expected = if kind == PolicyKind::Wfq {
                InsertAt::Sorted
            } else {
                InsertAt::Tail
            };
            assert_eq!(policy.insert_position(), expected);
        }
    }

    #[test]
    fn begin_tick_refills_only_token_bucket() {
        let mut cfg = SimulationConfig::default().with_policy(PolicyKind::TokenBucket);
        cfg.token_bucket.initial_tokens = PerClass::new(0.0, 0.0, 0.0);
        let mut policy = AdmissionPolicy::from_config(&cfg);
        let buffer = Buffer::new(4);
        assert_eq!(
            policy.state(&buffer),
            PolicyState::Tokens(PerClass::new(0.0, 0.0, 0.0))
        );

        let tick = TickState {
            tick: 0,
            virtual_clock: 0.0,
        };
        policy.begin_tick(&tick);
        assert_eq!(
            policy.state(&buffer),
            PolicyState::Tokens(PerClass::new(5.0, 0.5, 0.2))
        );

        let mut packet = Packet::new(0, TrafficClass::Gold, 1.0, 0);
        assert_eq!(policy.decide(&buffer, &mut packet, &tick), Decision::Admit);
        assert_eq!(packet.finish_time, None);
    }

    #[test]
    fn cloned_token_bucket_keeps_its_own_tokens() {
        let cfg = SimulationConfig::default().with_policy(PolicyKind::TokenBucket);
        let fresh = AdmissionPolicy::from_config(&cfg);
        let tick = TickState {
            tick: 0,
            virtual_clock: 0.0,
        };

        // Spend every Gold token filling the buffer.
        let mut filler = fresh.clone();
        let mut buffer = Buffer::new(10);
        for id in 0..10 {
            let mut p = Packet::new(id, TrafficClass::Gold, 1.0, 0);
            assert_eq!(filler.decide(&buffer, &mut p, &tick), Decision::Admit);
            buffer.insert(p, filler.insert_position()).unwrap();
        }
        let mut gold = Packet::new(10, TrafficClass::Gold, 1.0, 0);
        assert_eq!(
            filler.decide(&buffer, &mut gold, &tick),
            Decision::Drop(DropReason::Policed)
        );

        // A fresh copy still has tokens and reaches the capacity check.
        for _ in 0..3 {
            let mut gold = Packet::new(11, TrafficClass::Gold, 1.0, 0);
            assert_eq!(
                fresh.clone().decide(&buffer, &mut gold, &tick),
                Decision::Drop(DropReason::Capacity)
            );
        }
    }
}
