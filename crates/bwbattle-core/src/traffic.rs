//! # Traffic Generator
//!
//! Deterministic, seeded packet arrivals. Given a seed the generator yields
//! the same sequence of per-tick batches every time, so the four admission
//! policies can be compared on identical traffic.

use crate::config::{ArrivalModel, SimulationConfig, SizeModel, TrafficConfig};
use crate::error::ConfigError;
use crate::packet::{Packet, PerClass, TrafficClass};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::RngExt as _;
use rand::SeedableRng;

/// Packets generated for one tick, in generation order.
#[derive(Debug, Clone, PartialEq)]
pub struct TickArrivals {
    pub tick: u64,
    pub packets: Vec<Packet>,
}

/// Lazy, finite, restartable arrival sequence.
///
/// Iterating yields exactly `total_ticks` batches. [`restart`](Self::restart)
/// rewinds to tick 0 with the original seed.
#[derive(Debug)]
pub struct TrafficGenerator {
    cfg: TrafficConfig,
    total_ticks: u64,
    seed: u64,
    rng: StdRng,
    next_tick: u64,
    next_id: u64,
}

impl TrafficGenerator {
    pub fn new(cfg: TrafficConfig, total_ticks: u64, seed: u64) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            total_ticks,
            seed,
            rng: StdRng::seed_from_u64(seed),
            next_tick: 0,
            next_id: 0,
        })
    }

    pub fn from_config(config: &SimulationConfig) -> Result<Self, ConfigError> {
        Self::new(config.traffic.clone(), config.total_ticks, config.seed)
    }

    pub fn restart(&mut self) {
        self.rng = StdRng::seed_from_u64(self.seed);
        self.next_tick = 0;
        self.next_id = 0;
    }

    pub fn remaining(&self) -> u64 {
        self.total_ticks.saturating_sub(self.next_tick)
    }

    fn arrivals(&mut self, tick: u64) -> Vec<Packet> {
        let burst = self
            .cfg
            .burst
            .as_ref()
            .filter(|b| b.is_burst(tick))
            .map(|b| b.gold_multiplier);
        let rates = self.cfg.arrival_rates;
        let model = self.cfg.model;

        let classes = match model {
            ArrivalModel::Mix { packets_per_tick } => {
                let mut weights = rates;
                if let Some(mult) = burst {
                    weights.gold *= mult as f64;
                }
                (0..packets_per_tick)
                    .map(|_| self.draw_from_mix(&weights))
                    .collect::<Vec<_>>()
            }
            ArrivalModel::Bernoulli => {
                let mut classes = Vec::with_capacity(3);
                for class in TrafficClass::ALL {
                    let trials = match (class, burst) {
                        (TrafficClass::Gold, Some(mult)) => mult,
                        _ => 1,
                    };
                    for _ in 0..trials {
                        if self.rng.random::<f64>() < rates[class] {
                            classes.push(class);
                        }
                    }
                }
                classes.shuffle(&mut self.rng);
                classes
            }
            ArrivalModel::Batch => {
                let mut classes = Vec::new();
                for class in TrafficClass::ALL {
                    let rate = rates[class];
                    let mut count = rate.trunc() as u64;
                    if self.rng.random::<f64>() < rate.fract() {
                        count += 1;
                    }
                    if let (TrafficClass::Gold, Some(mult)) = (class, burst) {
                        count = count.saturating_mul(u64::from(mult));
                    }
                    classes.extend(std::iter::repeat(class).take(count as usize));
                }
                classes.shuffle(&mut self.rng);
                classes
            }
        };

        let packets: Vec<Packet> = classes
            .into_iter()
            .map(|class| {
                let size = self.draw_size(class);
                let id = self.next_id;
                self.next_id += 1;
                Packet::new(id, class, size, tick)
            })
            .collect();

        tracing::trace!(
            tick,
            count = packets.len(),
            burst = burst.is_some(),
            "generated arrivals"
        );
        packets
    }

    fn draw_from_mix(&mut self, weights: &PerClass<f64>) -> TrafficClass {
        let total = weights.gold + weights.silver + weights.bronze;
        let mut pick = self.rng.random::<f64>() * total;
        for (class, w) in weights.iter() {
            if pick < *w {
                return class;
            }
            pick -= *w;
        }
        // Rounding can leave `pick` a hair above the last bucket.
        TrafficClass::ALL
            .into_iter()
            .rev()
            .find(|c| weights[*c] > 0.0)
            .unwrap_or(TrafficClass::Bronze)
    }

    fn draw_size(&mut self, class: TrafficClass) -> f64 {
        match self.cfg.sizes[class] {
            SizeModel::Constant { size } => size,
            SizeModel::Uniform { min, max } => {
                let span = (max - min + 1) as f64;
                let offset = (self.rng.random::<f64>() * span) as u32;
                (min + offset.min(max - min)) as f64
            }
        }
    }
}

impl Iterator for TrafficGenerator {
    type Item = TickArrivals;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_tick >= self.total_ticks {
            return None;
        }
        let tick = self.next_tick;
        self.next_tick += 1;
        let packets = self.arrivals(tick);
        Some(TickArrivals { tick, packets })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.remaining() as usize;
        (left, Some(left))
    }
}
