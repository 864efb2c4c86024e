//! # Weighted fair queuing
//!
//! Every arrival is stamped with a virtual finish time
//! `max(virtual_clock, arrival_tick) + size / weight` and queued in finish
//! order. When the buffer is full a strictly heavier arrival evicts the
//! buffered packet of lowest weight that would be served last.

use super::{Decision, DropReason, TickState};
use crate::buffer::{finish_order, Buffer};
use crate::config::WfqConfig;
use crate::packet::{Packet, PerClass, TrafficClass};

#[derive(Debug, Clone)]
pub struct WeightedFairQueuing {
    weights: PerClass<f64>,
}

impl WeightedFairQueuing {
    pub fn new(cfg: &WfqConfig) -> Self {
        Self {
            weights: cfg.class_weights,
        }
    }

    pub fn weight(&self, class: TrafficClass) -> f64 {
        self.weights[class]
    }

    pub fn finish_time(&self, packet: &Packet, virtual_clock: f64) -> f64 {
        let start = virtual_clock.max(packet.arrival_tick as f64);
        start + packet.size / self.weights[packet.class]
    }

    pub fn decide(&self, buffer: &Buffer, packet: &mut Packet, tick: &TickState) -> Decision {
        packet.finish_time = Some(self.finish_time(packet, tick.virtual_clock));
        if !buffer.is_full() {
            return Decision::Admit;
        }

        let Some(victim) = self.victim(buffer) else {
            return Decision::Drop(DropReason::Capacity);
        };
        if self.weight(packet.class) > self.weight(victim.class) {
            tracing::trace!(
                arrival = packet.id,
                class = %packet.class,
                evict = victim.id,
                victim_class = %victim.class,
                "wfq: preempting"
            );
            Decision::AdmitWithPreemption { evict: victim.id }
        } else {
            Decision::Drop(DropReason::Capacity)
        }
    }

    /// Lowest-weight buffered packet, latest in service order among those.
    pub fn victim<'a>(&self, buffer: &'a Buffer) -> Option<&'a Packet> {
        buffer.iter().max_by(|a, b| {
            self.weight(b.class)
                .total_cmp(&self.weight(a.class))
                .then_with(|| finish_order(a, b))
        })
    }
}
