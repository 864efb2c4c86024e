//! # Token-bucket policing
//!
//! One credit pool per class, refilled once per tick before any arrival of
//! that tick is examined. An admission costs one token. A class with less
//! than one token is policed; a class with a token still needs buffer room,
//! and keeps its token when the buffer is full.

use super::{Decision, DropReason};
use crate::buffer::Buffer;
use crate::config::TokenBucketConfig;
use crate::packet::{Packet, PerClass};

const ADMISSION_COST: f64 = 1.0;

/// A single credit pool, `0 <= tokens <= max_size`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bucket {
    tokens: f64,
    refill_rate: f64,
    max_size: f64,
}

impl Bucket {
    pub fn new(refill_rate: f64, max_size: f64, initial: f64) -> Self {
        Self {
            tokens: initial.clamp(0.0, max_size),
            refill_rate,
            max_size,
        }
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn refill(&mut self) {
        self.tokens = (self.tokens + self.refill_rate).min(self.max_size);
    }

    pub fn can_spend(&self, cost: f64) -> bool {
        self.tokens >= cost
    }

    pub fn consume(&mut self, cost: f64) -> bool {
        if self.can_spend(cost) {
            self.tokens -= cost;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenBucketPolicy {
    buckets: PerClass<Bucket>,
}

impl TokenBucketPolicy {
    pub fn new(cfg: &TokenBucketConfig) -> Self {
        Self {
            buckets: PerClass::from_fn(|class| {
                Bucket::new(
                    cfg.refill_rates[class],
                    cfg.max_bucket_size[class],
                    cfg.initial_tokens[class],
                )
            }),
        }
    }

    pub fn refill(&mut self) {
        self.buckets.gold.refill();
        self.buckets.silver.refill();
        self.buckets.bronze.refill();
    }

    pub fn tokens(&self) -> PerClass<f64> {
        self.buckets.map(Bucket::tokens)
    }

    pub fn decide(&mut self, buffer: &Buffer, packet: &Packet) -> Decision {
        let bucket = &mut self.buckets[packet.class];
        if !bucket.can_spend(ADMISSION_COST) {
            return Decision::Drop(DropReason::Policed);
        }
        if buffer.is_full() {
            return Decision::Drop(DropReason::Capacity);
        }
        bucket.consume(ADMISSION_COST);
        Decision::Admit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::InsertAt;
    use crate::packet::TrafficClass;

    fn empty_buckets() -> TokenBucketConfig {
        TokenBucketConfig {
            initial_tokens: PerClass::new(0.0, 0.0, 0.0),
            ..Default::default()
        }
    }

    #[test]
    fn bucket_refill_is_capped() {
        let mut b = Bucket::new(0.75, 2.0, 0.0);
        b.refill();
        b.refill();
        assert!((b.tokens() - 1.5).abs() < 1e-12);
        b.refill();
        b.refill();
        assert!((b.tokens() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn bucket_consume_requires_full_token() {
        let mut b = Bucket::new(0.5, 5.0, 0.5);
        assert!(!b.consume(1.0));
        b.refill();
        assert!(b.consume(1.0));
        assert!(b.tokens().abs() < 1e-12);
    }

    #[test]
    fn bronze_admitted_once_every_five_ticks() {
        let mut policy = TokenBucketPolicy::new(&empty_buckets());
        let buffer = Buffer::new(20);
        let mut admitted_ticks = Vec::new();
        for tick in 0..20 {
            policy.refill();
            let p = Packet::new(tick, TrafficClass::Bronze, 1.0, tick);
            if policy.decide(&buffer, &p) == Decision::Admit {
                admitted_ticks.push(tick);
            }
        }
        assert!(admitted_ticks.len() >= 3 && admitted_ticks.len() <= 4);
        for pair in admitted_ticks.windows(2) {
            assert!(pair[1] - pair[0] >= 4, "{admitted_ticks:?}");
        }
    }

    #[test]
    fn gold_is_effectively_unbounded() {
        let mut policy = TokenBucketPolicy::new(&empty_buckets());
        let buffer = Buffer::new(100);
        for tick in 0..10u64 {
            policy.refill();
            for i in 0..3 {
                let p = Packet::new(tick * 3 + i, TrafficClass::Gold, 1.0, tick);
                assert_eq!(policy.decide(&buffer, &p), Decision::Admit);
            }
        }
    }

    #[test]
    fn full_buffer_keeps_the_token() {
        let mut policy = TokenBucketPolicy::new(&TokenBucketConfig::default());
        let mut buffer = Buffer::new(1);
        buffer
            .insert(Packet::new(0, TrafficClass::Gold, 1.0, 0), InsertAt::Tail)
            .unwrap();
        let before = policy.tokens().silver;
        let p = Packet::new(1, TrafficClass::Silver, 1.0, 0);
        assert_eq!(
            policy.decide(&buffer, &p),
            Decision::Drop(DropReason::Capacity)
        );
        assert_eq!(policy.tokens().silver, before);
    }

    #[test]
    fn empty_bucket_is_policed() {
        let mut policy = TokenBucketPolicy::new(&empty_buckets());
        let buffer = Buffer::new(20);
        let p = Packet::new(0, TrafficClass::Silver, 1.0, 0);
        assert_eq!(
            policy.decide(&buffer, &p),
            Decision::Drop(DropReason::Policed)
        );
    }
}
