//! # Choke-packet AQM
//!
//! While the buffer is congested (occupancy ratio above the threshold) only
//! Gold is admitted; Silver and Bronze are shed outright. Below the threshold
//! the policy behaves exactly like tail-drop.
//!
//! Congestion is a pure function of the occupancy each arrival sees, unless a
//! release threshold is configured. Then the choke latches on above
//! `threshold` and lets go only once the ratio falls under
//! `release_threshold`.

use super::{Decision, DropReason, TailDrop};
use crate::buffer::Buffer;
use crate::config::ChokeConfig;
use crate::packet::{Packet, TrafficClass};

#[derive(Debug, Clone)]
pub struct ChokeAqm {
    threshold: f64,
    release_threshold: Option<f64>,
    latched: bool,
}

impl ChokeAqm {
    pub fn new(cfg: &ChokeConfig) -> Self {
        Self {
            threshold: cfg.threshold,
            release_threshold: cfg.release_threshold,
            latched: false,
        }
    }

    pub fn decide(&mut self, buffer: &Buffer, packet: &Packet) -> Decision {
        let ratio = buffer.occupancy_ratio();
        let congested = self.update(ratio);
        if congested && packet.class != TrafficClass::Gold {
            tracing::trace!(
                id = packet.id,
                class = %packet.class,
                ratio,
                "choke: shedding non-gold packet"
            );
            return Decision::Drop(DropReason::Congestion);
        }
        TailDrop.decide(buffer)
    }

    /// Congestion as the next arrival would see it, without side effects.
    pub fn is_congested(&self, buffer: &Buffer) -> bool {
        let ratio = buffer.occupancy_ratio();
        match self.release_threshold {
            None => ratio > self.threshold,
            Some(release) => {
                if ratio > self.threshold {
                    true
                } else if ratio < release {
                    false
                } else {
                    self.latched
                }
            }
        }
    }

    fn update(&mut self, ratio: f64) -> bool {
        match self.release_threshold {
            None => ratio > self.threshold,
            Some(release) => {
                if ratio > self.threshold {
                    self.latched = true;
                } else if ratio < release {
                    self.latched = false;
                }
                self.latched
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::InsertAt;

    fn fill(buffer: &mut Buffer, n: usize) {
        let start = buffer.occupancy() as u64;
        for i in 0..n as u64 {
            buffer
                .insert(
                    Packet::new(start + i, TrafficClass::Silver, 1.0, 0),
                    InsertAt::Tail,
                )
                .unwrap();
        }
    }

    fn pkt(class: TrafficClass) -> Packet {
        Packet::new(1_000, class, 1.0, 0)
    }

    #[test]
    fn behaves_like_tail_drop_below_threshold() {
        let mut choke = ChokeAqm::new(&ChokeConfig::default());
        let mut buffer = Buffer::new(20);
        fill(&mut buffer, 8); // ratio 0.4 is not above 0.4
        assert_eq!(choke.decide(&buffer, &pkt(TrafficClass::Bronze)), Decision::Admit);
        assert!(!choke.is_congested(&buffer));
    }

    #[test]
    fn sheds_non_gold_above_threshold() {
        let mut choke = ChokeAqm::new(&ChokeConfig::default());
        let mut buffer = Buffer::new(20);
        fill(&mut buffer, 9);
        assert!(choke.is_congested(&buffer));
        assert_eq!(
            choke.decide(&buffer, &pkt(TrafficClass::Silver)),
            Decision::Drop(DropReason::Congestion)
        );
        assert_eq!(
            choke.decide(&buffer, &pkt(TrafficClass::Bronze)),
            Decision::Drop(DropReason::Congestion)
        );
        assert_eq!(choke.decide(&buffer, &pkt(TrafficClass::Gold)), Decision::Admit);
    }

    #[test]
    fn gold_still_hits_capacity() {
        let mut choke = ChokeAqm::new(&ChokeConfig::default());
        let mut buffer = Buffer::new(5);
        fill(&mut buffer, 5);
        assert_eq!(
            choke.decide(&buffer, &pkt(TrafficClass::Gold)),
            Decision::Drop(DropReason::Capacity)
        );
    }

    #[test]
    fn instantaneous_mode_recovers_as_soon_as_ratio_drops() {
        let mut choke = ChokeAqm::new(&ChokeConfig::default());
        let mut buffer = Buffer::new(10);
        fill(&mut buffer, 5);
        assert!(matches!(
            choke.decide(&buffer, &pkt(TrafficClass::Bronze)),
            Decision::Drop(_)
        ));
        buffer.remove_head().unwrap();
        buffer.remove_head().unwrap();
        assert_eq!(choke.decide(&buffer, &pkt(TrafficClass::Bronze)), Decision::Admit);
    }

    #[test]
    fn hysteresis_holds_until_release_threshold() {
        let cfg = ChokeConfig {
            threshold: 0.4,
            release_threshold: Some(0.2),
        };
        let mut choke = ChokeAqm::new(&cfg);
        let mut buffer = Buffer::new(20);
        fill(&mut buffer, 9);
        assert!(matches!(
            choke.decide(&buffer, &pkt(TrafficClass::Silver)),
            Decision::Drop(DropReason::Congestion)
        ));

        // Drain to 5 (ratio 0.25): still latched.
        for _ in 0..4 {
            buffer.remove_head().unwrap();
        }
        assert!(choke.is_congested(&buffer));
        assert!(matches!(
            choke.decide(&buffer, &pkt(TrafficClass::Silver)),
            Decision::Drop(DropReason::Congestion)
        ));

        // Drain to 3 (ratio 0.15): released.
        buffer.remove_head().unwrap();
        buffer.remove_head().unwrap();
        assert!(!choke.is_congested(&buffer));
        assert_eq!(choke.decide(&buffer, &pkt(TrafficClass::Silver)), Decision::Admit);
    }
}
