//! # Packet Model
//!
//! Traffic classes and the simulated packet value. Packets are created by
//! the traffic generator and never change afterwards, except for the WFQ
//! finish time stamped on arrival.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};

/// Priority class of a packet. Gold is the most valuable traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficClass {
    Gold,
    Silver,
    Bronze,
}

impl TrafficClass {
    /// All classes, highest priority first.
    pub const ALL: [TrafficClass; 3] = [TrafficClass::Gold, TrafficClass::Silver, TrafficClass::Bronze];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficClass::Gold => "gold",
            TrafficClass::Silver => "silver",
            TrafficClass::Bronze => "bronze",
        }
    }
}

impl fmt::Display for TrafficClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One value per traffic class.
///
/// Serializes as `{ "gold": .., "silver": .., "bronze": .. }` in that fixed
/// order, so reports built from it are byte-stable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerClass<T> {
    pub gold: T,
    pub silver: T,
    pub bronze: T,
}

impl<T> PerClass<T> {
    pub fn new(gold: T, silver: T, bronze: T) -> Self {
        Self {
            gold,
            silver,
            bronze,
        }
    }

    pub fn from_fn(mut f: impl FnMut(TrafficClass) -> T) -> Self {
        Self {
            gold: f(TrafficClass::Gold),
            silver: f(TrafficClass::Silver),
            bronze: f(TrafficClass::Bronze),
        }
    }

    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> PerClass<U> {
        PerClass {
            gold: f(&self.gold),
            silver: f(&self.silver),
            bronze: f(&self.bronze),
        }
    }

    /// Iterates `(class, value)` pairs, highest priority first.
    pub fn iter(&self) -> impl Iterator<Item = (TrafficClass, &T)> {
        TrafficClass::ALL.into_iter().map(move |class| (class, &self[class]))
    }
}

impl<T> Index<TrafficClass> for PerClass<T> {
    type Output = T;

    fn index(&self, class: TrafficClass) -> &T {
        match class {
            TrafficClass::Gold => &self.gold,
            TrafficClass::Silver => &self.silver,
            TrafficClass::Bronze => &self.bronze,
        }
    }
}

impl<T> IndexMut<TrafficClass> for PerClass<T> {
    fn index_mut(&mut self, class: TrafficClass) -> &mut T {
        match class {
            TrafficClass::Gold => &mut self.gold,
            TrafficClass::Silver => &mut self.silver,
            TrafficClass::Bronze => &mut self.bronze,
        }
    }
}

/// A simulated packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    /// Unique, strictly increasing within a run.
    pub id: u64,
    pub class: TrafficClass,
    /// Service cost used by the WFQ finish-time formula.
    pub size: f64,
    pub arrival_tick: u64,
    /// Virtual finish time, stamped only under WFQ.
    pub finish_time: Option<f64>,
}

impl Packet {
    pub fn new(id: u64, class: TrafficClass, size: f64, arrival_tick: u64) -> Self {
        Self {
            id,
            class,
            size,
            arrival_tick,
            finish_time: None,
        }
    }
}
