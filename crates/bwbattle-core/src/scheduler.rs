//! # Scheduler / Server
//!
//! One departure attempt per tick, after all of the tick's arrivals have
//! been decided. The server succeeds with `service_probability` and always
//! takes the buffer head: arrival order for the FIFO policies, lowest finish
//! time under WFQ.
//!
//! The service coin comes from its own RNG stream and is flipped every tick,
//! busy or idle, so that every policy sees the same server given a seed.

use rand::rngs::StdRng;
use rand::RngExt as _;
use rand::SeedableRng;

use crate::buffer::Buffer;
use crate::packet::Packet;

/// Mixed into the run seed to derive the service stream.
const SERVICE_STREAM: u64 = 0x5EED_5E4F_1CE0_000F;

#[derive(Debug, Clone, PartialEq)]
pub enum ServeOutcome {
    Served(Packet),
    Idle,
}

#[derive(Debug)]
pub struct Scheduler {
    rng: StdRng,
    service_probability: f64,
    virtual_clock: f64,
}

impl Scheduler {
    pub fn new(service_probability: f64, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed ^ SERVICE_STREAM),
            service_probability,
            virtual_clock: 0.0,
        }
    }

    /// WFQ system virtual time. Only ever moves forward.
    pub fn virtual_clock(&self) -> f64 {
        self.virtual_clock
    }

    pub fn serve(&mut self, buffer: &mut Buffer) -> ServeOutcome {
        let coin = self.rng.random::<f64>();
        if coin >= self.service_probability {
            return ServeOutcome::Idle;
        }
        let Ok(packet) = buffer.remove_head() else {
            return ServeOutcome::Idle;
        };
        if let Some(finish) = packet.finish_time {
            self.virtual_clock = self.virtual_clock.max(finish);
        }
        ServeOutcome::Served(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::InsertAt;
    use crate::packet::TrafficClass;

    #[test]
    fn empty_buffer_is_idle() {
        let mut sched = Scheduler::new(1.0, 42);
        let mut buffer = Buffer::new(4);
        assert_eq!(sched.serve(&mut buffer), ServeOutcome::Idle);
        assert_eq!(sched.virtual_clock(), 0.0);
    }

    #[test]
    fn idle_tick_on_empty_buffer_does_not_stall_the_next_one() {
        let mut sched = Scheduler::new(1.0, 42);
        let mut buffer = Buffer::new(1);
        assert_eq!(sched.serve(&mut buffer), ServeOutcome::Idle);

        let mut p = Packet::new(0, TrafficClass::Gold, 1.0, 0);
        p.finish_time = Some(2.5);
        buffer.insert(p, InsertAt::Sorted).unwrap();
        assert!(matches!(sched.serve(&mut buffer), ServeOutcome::Served(p) if p.id == 0));
        assert_eq!(sched.virtual_clock(), 2.5);
        assert_eq!(sched.serve(&mut buffer), ServeOutcome::Idle);
    }

    #[test]
    fn certain_server_drains_one_per_tick_in_order() {
        let mut sched = Scheduler::new(1.0, 7);
        let mut buffer = Buffer::new(4);
        for id in 0..3 {
            buffer
                .insert(Packet::new(id, TrafficClass::Silver, 1.0, 0), InsertAt::Tail)
                .unwrap();
        }
        for id in 0..3 {
            match sched.serve(&mut buffer) {
                ServeOutcome::Served(p) => assert_eq!(p.id, id),
                ServeOutcome::Idle => panic!("server idle with {} queued", buffer.occupancy()),
            }
        }
        assert!(buffer.is_empty());
    }

    #[test]
    fn stopped_server_never_serves() {
        let mut sched = Scheduler::new(0.0, 7);
        let mut buffer = Buffer::new(4);
        buffer
            .insert(Packet::new(0, TrafficClass::Gold, 1.0, 0), InsertAt::Tail)
            .unwrap();
        for _ in 0..50 {
            assert_eq!(sched.serve(&mut buffer), ServeOutcome::Idle);
        }
        assert_eq!(buffer.occupancy(), 1);
    }

    #[test]
    fn virtual_clock_follows_finish_times_monotonically() {
        let mut sched = Scheduler::new(1.0, 1);
        let mut buffer = Buffer::new(4);
        for (id, finish) in [(0u64, 3.0), (1, 1.5)] {
            let p = Packet {
                finish_time: Some(finish),
                ..Packet::new(id, TrafficClass::Gold, 1.0, 0)
            };
            buffer.insert(p, InsertAt::Tail).unwrap();
        }
        sched.serve(&mut buffer);
        assert_eq!(sched.virtual_clock(), 3.0);
        sched.serve(&mut buffer);
        assert_eq!(sched.virtual_clock(), 3.0);
    }

    #[test]
    fn service_rate_tracks_probability() {
        let mut sched = Scheduler::new(0.7, 42);
        let mut buffer = Buffer::new(10_000);
        for id in 0..10_000 {
            buffer
                .insert(Packet::new(id, TrafficClass::Bronze, 1.0, 0), InsertAt::Tail)
                .unwrap();
        }
        let served = (0..5_000)
            .filter(|_| matches!(sched.serve(&mut buffer), ServeOutcome::Served(_)))
            .count();
        let rate = served as f64 / 5_000.0;
        assert!((rate - 0.7).abs() < 0.03, "rate {rate}");
    }
}
