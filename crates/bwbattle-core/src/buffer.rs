//! # Router Buffer
//!
//! Bounded container of admitted-but-unserved packets. The buffer keeps
//! whichever order the active policy asks for: arrival order for the FIFO
//! policies, ascending `(finish_time, arrival_tick, id)` for WFQ. The head is
//! always the next packet to serve.

use std::cmp::Ordering;
use std::collections::VecDeque;

use crate::error::BufferError;
use crate::packet::{Packet, PerClass, TrafficClass};

/// Where an admitted packet lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertAt {
    Tail,
    /// Sorted by finish time, ties broken by arrival tick then id.
    Sorted,
}

#[derive(Debug, Clone)]
pub struct Buffer {
    capacity: usize,
    contents: VecDeque<Packet>,
    high_water: usize,
}

/// Service order for WFQ. Packets without a finish time sort as zero.
pub fn finish_order(a: &Packet, b: &Packet) -> Ordering {
    let fa = a.finish_time.unwrap_or(0.0);
    let fb = b.finish_time.unwrap_or(0.0);
    fa.total_cmp(&fb)
        .then(a.arrival_tick.cmp(&b.arrival_tick))
        .then(a.id.cmp(&b.id))
}

impl Buffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            contents: VecDeque::with_capacity(capacity),
            high_water: 0,
        }
    }

    pub fn occupancy(&self) -> usize {
        self.contents.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.contents.len() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    /// `occupancy / capacity`.
    pub fn occupancy_ratio(&self) -> f64 {
        self.contents.len() as f64 / self.capacity as f64
    }

    /// Highest occupancy observed since creation.
    pub fn max_occupancy_seen(&self) -> usize {
        self.high_water
    }

    /// Packets from head (next to serve) to tail.
    pub fn iter(&self) -> impl Iterator<Item = &Packet> {
        self.contents.iter()
    }

    pub fn count_by_class(&self) -> PerClass<usize> {
        let mut counts = PerClass::default();
        for p in &self.contents {
            counts[p.class] += 1;
        }
        counts
    }

    pub fn contains_class(&self, class: TrafficClass) -> bool {
        self.contents.iter().any(|p| p.class == class)
    }

    /// Adds an admitted packet. Fails only if the caller skipped the
    /// admission check; the engine treats that as an invariant violation.
    pub fn insert(&mut self, packet: Packet, at: InsertAt) -> Result<(), BufferError> {
        if self.is_full() {
            return Err(BufferError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        match at {
            InsertAt::Tail => self.contents.push_back(packet),
            InsertAt::Sorted => {
                let pos = self
                    .contents
                    .partition_point(|queued| finish_order(queued, &packet) != Ordering::Greater);
                self.contents.insert(pos, packet);
            }
        }
        self.high_water = self.high_water.max(self.contents.len());
        Ok(())
    }

    /// Removes the next packet to serve.
    pub fn remove_head(&mut self) -> Result<Packet, BufferError> {
        self.contents.pop_front().ok_or(BufferError::EmptyBuffer)
    }

    /// Removes the last (tail-most) packet matching `predicate`.
    pub fn remove_specific(&mut self, predicate: impl Fn(&Packet) -> bool) -> Option<Packet> {
        let pos = self.contents.iter().rposition(predicate)?;
        self.contents.remove(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(id: u64, class: TrafficClass, tick: u64, finish: Option<f64>) -> Packet {
        Packet {
            finish_time: finish,
            ..Packet::new(id, class, 1.0, tick)
        }
    }

    #[test]
    fn fifo_insert_and_remove_head() {
        let mut buf = Buffer::new(3);
        buf.insert(packet(0, TrafficClass::Bronze, 0, None), InsertAt::Tail)
            .unwrap();
        buf.insert(packet(1, TrafficClass::Gold, 0, None), InsertAt::Tail)
            .unwrap();
        assert_eq!(buf.occupancy(), 2);
        assert_eq!(buf.remove_head().unwrap().id, 0);
        assert_eq!(buf.remove_head().unwrap().id, 1);
        assert_eq!(buf.remove_head(), Err(BufferError::EmptyBuffer));
    }

    #[test]
    fn insert_into_full_buffer_fails() {
        let mut buf = Buffer::new(1);
        buf.insert(packet(0, TrafficClass::Gold, 0, None), InsertAt::Tail)
            .unwrap();
        assert!(buf.is_full());
        let err = buf
            .insert(packet(1, TrafficClass::Gold, 0, None), InsertAt::Tail)
            .unwrap_err();
        assert_eq!(err, BufferError::CapacityExceeded { capacity: 1 });
        assert_eq!(buf.occupancy(), 1);
    }

    #[test]
    fn sorted_insert_orders_by_finish_then_tick_then_id() {
        let mut buf = Buffer::new(8);
        buf.insert(packet(4, TrafficClass::Bronze, 3, Some(5.0)), InsertAt::Sorted)
            .unwrap();
        buf.insert(packet(1, TrafficClass::Gold, 1, Some(1.2)), InsertAt::Sorted)
            .unwrap();
        buf.insert(packet(3, TrafficClass::Silver, 2, Some(2.5)), InsertAt::Sorted)
            .unwrap();
        // Same finish time as id 3, earlier arrival: goes first.
        buf.insert(packet(2, TrafficClass::Silver, 1, Some(2.5)), InsertAt::Sorted)
            .unwrap();
        // Same finish and arrival as id 2, larger id: goes after it.
        buf.insert(packet(5, TrafficClass::Gold, 1, Some(2.5)), InsertAt::Sorted)
            .unwrap();

        let order: Vec<u64> = buf.iter().map(|p| p.id).collect();
        assert_eq!(order, vec![1, 2, 5, 3, 4]);
        assert_eq!(buf.remove_head().unwrap().id, 1);
    }

    #[test]
    fn remove_specific_takes_last_match() {
        let mut buf = Buffer::new(5);
        for (id, class) in [
            (0, TrafficClass::Bronze),
            (1, TrafficClass::Gold),
            (2, TrafficClass::Bronze),
            (3, TrafficClass::Silver),
        ] {
            buf.insert(packet(id, class, 0, None), InsertAt::Tail).unwrap();
        }

        let evicted = buf.remove_specific(|p| p.class == TrafficClass::Bronze);
        assert_eq!(evicted.map(|p| p.id), Some(2));
        assert_eq!(buf.occupancy(), 3);
        assert!(buf.remove_specific(|p| p.id == 99).is_none());
        assert_eq!(buf.count_by_class(), PerClass::new(1, 1, 1));
    }

    #[test]
    fn tracks_high_water_and_ratio() {
        let mut buf = Buffer::new(4);
        for id in 0..3 {
            buf.insert(packet(id, TrafficClass::Silver, 0, None), InsertAt::Tail)
                .unwrap();
        }
        buf.remove_head().unwrap();
        assert_eq!(buf.max_occupancy_seen(), 3);
        assert!((buf.occupancy_ratio() - 0.5).abs() < f64::EPSILON);
    }
}
