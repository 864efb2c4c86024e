use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::packet::{PerClass, TrafficClass};

pub const CONFIG_VERSION: u32 = 1;

// ─── Input (TOML) ───────────────────────────────────────────────────────────

/// Raw simulation options. Every field is optional; [`configure`] fills the
/// gaps with the reference configuration and validates the result.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SimulationOptions {
    pub version: u32,
    pub buffer_capacity: Option<usize>,
    pub policy: Option<PolicyKind>,
    pub congestion_threshold: Option<f64>,
    pub release_threshold: Option<f64>,
    pub refill_rates: PerClassInput<f64>,
    pub max_bucket_size: PerClassInput<f64>,
    pub initial_tokens: PerClassInput<f64>,
    pub class_weights: PerClassInput<f64>,
    pub arrival_rates: PerClassInput<f64>,
    pub arrival_model: Option<ArrivalModelKind>,
    pub packets_per_tick: Option<u32>,
    pub burst_schedule: Option<BurstScheduleInput>,
    pub sizes: PerClassInput<SizeModel>,
    pub service_probability: Option<f64>,
    pub total_ticks: Option<u64>,
    pub seed: Option<u64>,
    pub record_series: Option<bool>,
}

/// Partial per-class override; missing classes keep their defaults.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct PerClassInput<T> {
    pub gold: Option<T>,
    pub silver: Option<T>,
    pub bronze: Option<T>,
}

impl<T: Copy> PerClassInput<T> {
    fn is_empty(&self) -> bool {
        self.gold.is_none() && self.silver.is_none() && self.bronze.is_none()
    }

    fn or(self, defaults: PerClass<T>) -> PerClass<T> {
        PerClass {
            gold: self.gold.unwrap_or(defaults.gold),
            silver: self.silver.unwrap_or(defaults.silver),
            bronze: self.bronze.unwrap_or(defaults.bronze),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BurstScheduleInput {
    pub every: Option<u64>,
    pub ticks: Vec<u64>,
    pub gold_multiplier: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrivalModelKind {
    Mix,
    Bernoulli,
    Batch,
}

// ─── Resolved configuration ─────────────────────────────────────────────────

/// Which admission policy drives a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    TailDrop,
    ChokeAqm,
    TokenBucket,
    Wfq,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 4] = [
        PolicyKind::TailDrop,
        PolicyKind::ChokeAqm,
        PolicyKind::TokenBucket,
        PolicyKind::Wfq,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::TailDrop => "tail_drop",
            PolicyKind::ChokeAqm => "choke_aqm",
            PolicyKind::TokenBucket => "token_bucket",
            PolicyKind::Wfq => "wfq",
        }
    }
}

impl std::str::FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "tail_drop" | "taildrop" => Ok(PolicyKind::TailDrop),
            "choke_aqm" | "choke" => Ok(PolicyKind::ChokeAqm),
            "token_bucket" | "token" => Ok(PolicyKind::TokenBucket),
            "wfq" | "weighted_fair_queuing" => Ok(PolicyKind::Wfq),
            other => Err(format!("unknown policy '{other}'")),
        }
    }
}

/// How arrivals are drawn each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrivalModel {
    /// `packets_per_tick` packets, each class drawn proportionally to the rates.
    Mix { packets_per_tick: u32 },
    /// Independent per-class coin flips; rates are probabilities.
    Bernoulli,
    /// Per-class counts; the fractional part is a coin flip for one more.
    Batch,
}

/// Per-class packet size distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SizeModel {
    Constant { size: f64 },
    /// Integer sizes in `min..=max`.
    Uniform { min: u32, max: u32 },
}

impl Default for SizeModel {
    fn default() -> Self {
        SizeModel::Uniform { min: 1, max: 3 }
    }
}

/// Ticks on which a Gold surge is injected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BurstSchedule {
    pub every: Option<u64>,
    pub ticks: BTreeSet<u64>,
    pub gold_multiplier: u32,
}

impl BurstSchedule {
    pub fn is_burst(&self, tick: u64) -> bool {
        self.ticks.contains(&tick) || self.every.is_some_and(|n| tick % n == 0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrafficConfig {
    pub arrival_rates: PerClass<f64>,
    pub model: ArrivalModel,
    pub burst: Option<BurstSchedule>,
    pub sizes: PerClass<SizeModel>,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            arrival_rates: PerClass::new(0.3, 0.3, 0.4),
            model: ArrivalModel::Mix {
                packets_per_tick: 1,
            },
            burst: None,
            sizes: PerClass::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChokeConfig {
    pub threshold: f64,
    /// Enables hysteresis: once congested, stay congested until the
    /// occupancy ratio drops below this value.
    pub release_threshold: Option<f64>,
}

impl Default for ChokeConfig {
    fn default() -> Self {
        Self {
            threshold: 0.4,
            release_threshold: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenBucketConfig {
    pub refill_rates: PerClass<f64>,
    pub max_bucket_size: PerClass<f64>,
    pub initial_tokens: PerClass<f64>,
}

impl Default for TokenBucketConfig {
    fn default() -> Self {
        let max_bucket_size = PerClass::new(10.0, 5.0, 2.0);
        Self {
            refill_rates: PerClass::new(5.0, 0.5, 0.2),
            max_bucket_size,
            initial_tokens: max_bucket_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WfqConfig {
    pub class_weights: PerClass<f64>,
}

impl Default for WfqConfig {
    fn default() -> Self {
        Self {
            class_weights: PerClass::new(4.0, 2.0, 1.0),
        }
    }
}

/// Validated configuration for one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationConfig {
    pub version: u32,
    pub buffer_capacity: usize,
    pub policy: PolicyKind,
    pub choke: ChokeConfig,
    pub token_bucket: TokenBucketConfig,
    pub wfq: WfqConfig,
    pub traffic: TrafficConfig,
    /// Chance per tick that the server completes one departure.
    pub service_probability: f64,
    pub total_ticks: u64,
    pub seed: u64,
    pub record_series: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            buffer_capacity: 20,
            policy: PolicyKind::TailDrop,
            choke: ChokeConfig::default(),
            token_bucket: TokenBucketConfig::default(),
            wfq: WfqConfig::default(),
            traffic: TrafficConfig::default(),
            service_probability: 0.7,
            total_ticks: 1000,
            seed: 42,
            record_series: false,
        }
    }
}

impl SimulationConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        if input.trim().is_empty() {
            return Ok(SimulationConfig::default());
        }
        let parsed: SimulationOptions =
            toml::from_str(input).map_err(|e| ConfigError::Toml(e.to_string()))?;
        parsed.resolve()
    }

    /// Same configuration with a different policy.
    pub fn with_policy(&self, policy: PolicyKind) -> Self {
        Self {
            policy,
            ..self.clone()
        }
    }

    /// Checks every numeric constraint. [`SimulationOptions::resolve`] calls
    /// this; callers that build a config by hand should too.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_capacity == 0 {
            return Err(non_positive("buffer_capacity", 0.0));
        }
        if self.total_ticks == 0 {
            return Err(non_positive("total_ticks", 0.0));
        }
        check_probability("service_probability", self.service_probability)?;

        let threshold = self.choke.threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::OutOfRange {
                field: "congestion_threshold".into(),
                range: "(0, 1]",
                value: threshold,
            });
        }
        if let Some(release) = self.choke.release_threshold {
            if !(release >= 0.0 && release < threshold) {
                return Err(ConfigError::OutOfRange {
                    field: "release_threshold".into(),
                    range: "[0, congestion_threshold)",
                    value: release,
                });
            }
        }

        let tb = &self.token_bucket;
        for class in TrafficClass::ALL {
            check_rate(&field("refill_rates", class), tb.refill_rates[class])?;
            check_positive(&field("max_bucket_size", class), tb.max_bucket_size[class])?;
            let initial = tb.initial_tokens[class];
            if !(initial >= 0.0 && initial <= tb.max_bucket_size[class]) {
                return Err(ConfigError::OutOfRange {
                    field: field("initial_tokens", class),
                    range: "[0, max_bucket_size]",
                    value: initial,
                });
            }
            check_positive(&field("class_weights", class), self.wfq.class_weights[class])?;
        }
        let w = self.wfq.class_weights;
        if w.gold < w.silver || w.silver < w.bronze {
            return Err(ConfigError::WeightOrder {
                gold: w.gold,
                silver: w.silver,
                bronze: w.bronze,
            });
        }

        self.traffic.validate()
    }
}

impl TrafficConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.model {
            ArrivalModel::Mix { packets_per_tick } => {
                if packets_per_tick == 0 {
                    return Err(non_positive("packets_per_tick", 0.0));
                }
                check_arrivals("packets_per_tick", f64::from(packets_per_tick))?;
                for class in TrafficClass::ALL {
                    check_probability(&field("arrival_rates", class), self.arrival_rates[class])?;
                }
                let total: f64 = self.arrival_rates.iter().map(|(_, r)| *r).sum();
                if total <= 0.0 {
                    return Err(ConfigError::EmptyMix);
                }
            }
            ArrivalModel::Bernoulli => {
                for class in TrafficClass::ALL {
                    check_probability(&field("arrival_rates", class), self.arrival_rates[class])?;
                }
                check_arrivals("burst_schedule.gold_multiplier", self.gold_multiplier())?;
            }
            ArrivalModel::Batch => {
                for class in TrafficClass::ALL {
                    let name = field("arrival_rates", class);
                    let rate = self.arrival_rates[class];
                    check_rate(&name, rate)?;
                    let peak = match class {
                        TrafficClass::Gold => rate.ceil() * self.gold_multiplier(),
                        _ => rate.ceil(),
                    };
                    check_arrivals(&name, peak)?;
                }
            }
        }

        if let Some(burst) = &self.burst {
            if burst.every == Some(0) {
                return Err(non_positive("burst_schedule.every", 0.0));
            }
            if burst.gold_multiplier == 0 {
                return Err(non_positive("burst_schedule.gold_multiplier", 0.0));
            }
        }

        for class in TrafficClass::ALL {
            match self.sizes[class] {
                SizeModel::Constant { size } => check_positive(&field("sizes", class), size)?,
                SizeModel::Uniform { min, max } => {
                    if min == 0 {
                        return Err(non_positive(&field("sizes", class), 0.0));
                    }
                    if min > max {
                        return Err(ConfigError::EmptySizeRange {
                            class: class.as_str(),
                            min,
                            max,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Largest Gold surge factor any tick can see.
    fn gold_multiplier(&self) -> f64 {
        self.burst
            .as_ref()
            .map_or(1.0, |b| f64::from(b.gold_multiplier.max(1)))
    }
}

// ─── Resolution ─────────────────────────────────────────────────────────────

/// Builds a validated [`SimulationConfig`] from raw options.
pub fn configure(options: SimulationOptions) -> Result<SimulationConfig, ConfigError> {
    options.resolve()
}

impl SimulationOptions {
    pub fn resolve(self) -> Result<SimulationConfig, ConfigError> {
        let version = if self.version == 0 {
            CONFIG_VERSION
        } else {
            self.version
        };
        if version != CONFIG_VERSION {
            return Err(ConfigError::OutOfRange {
                field: "version".into(),
                range: "{1}",
                value: version as f64,
            });
        }

        let defaults = SimulationConfig::default();
        let policy = self.policy.unwrap_or(defaults.policy);
        self.warn_unused(policy);

        let token_defaults = TokenBucketConfig::default();
        let max_bucket_size = self.max_bucket_size.or(token_defaults.max_bucket_size);
        // Buckets start full unless told otherwise.
        let initial_tokens = self.initial_tokens.or(max_bucket_size);

        let model = match self.arrival_model.unwrap_or(ArrivalModelKind::Mix) {
            ArrivalModelKind::Mix => ArrivalModel::Mix {
                packets_per_tick: self.packets_per_tick.unwrap_or(1),
            },
            ArrivalModelKind::Bernoulli => ArrivalModel::Bernoulli,
            ArrivalModelKind::Batch => ArrivalModel::Batch,
        };

        let burst = self.burst_schedule.map(|b| BurstSchedule {
            every: b.every,
            ticks: b.ticks.into_iter().collect(),
            gold_multiplier: b.gold_multiplier.unwrap_or(2),
        });

        let cfg = SimulationConfig {
            version,
            buffer_capacity: self.buffer_capacity.unwrap_or(defaults.buffer_capacity),
            policy,
            choke: ChokeConfig {
                threshold: self
                    .congestion_threshold
                    .unwrap_or(defaults.choke.threshold),
                release_threshold: self.release_threshold,
            },
            token_bucket: TokenBucketConfig {
                refill_rates: self.refill_rates.or(token_defaults.refill_rates),
                max_bucket_size,
                initial_tokens,
            },
            wfq: WfqConfig {
                class_weights: self.class_weights.or(defaults.wfq.class_weights),
            },
            traffic: TrafficConfig {
                arrival_rates: self.arrival_rates.or(defaults.traffic.arrival_rates),
                model,
                burst,
                sizes: self.sizes.or(defaults.traffic.sizes),
            },
            service_probability: self
                .service_probability
                .unwrap_or(defaults.service_probability),
            total_ticks: self.total_ticks.unwrap_or(defaults.total_ticks),
            seed: self.seed.unwrap_or(defaults.seed),
            record_series: self.record_series.unwrap_or(false),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn warn_unused(&self, policy: PolicyKind) {
        let choke_set = self.congestion_threshold.is_some() || self.release_threshold.is_some();
        if choke_set && policy != PolicyKind::ChokeAqm {
            tracing::warn!(policy = policy.as_str(), "congestion thresholds ignored");
        }
        let bucket_set = !self.refill_rates.is_empty()
            || !self.max_bucket_size.is_empty()
            || !self.initial_tokens.is_empty();
        if bucket_set && policy != PolicyKind::TokenBucket {
            tracing::warn!(policy = policy.as_str(), "token bucket settings ignored");
        }
        if !self.class_weights.is_empty() && policy != PolicyKind::Wfq {
            tracing::warn!(policy = policy.as_str(), "class weights ignored");
        }
        if self.packets_per_tick.is_some()
            && !matches!(self.arrival_model, None | Some(ArrivalModelKind::Mix))
        {
            tracing::warn!("packets_per_tick only applies to the mix arrival model");
        }
    }
}

fn field(name: &str, class: TrafficClass) -> String {
    format!("{name}.{class}")
}

fn non_positive(field: &str, value: f64) -> ConfigError {
    ConfigError::NonPositive {
        field: field.to_string(),
        value,
    }
}

fn check_probability(field: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Probability {
            field: field.to_string(),
            value,
        })
    }
}

fn check_rate(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NegativeRate {
            field: field.to_string(),
            value,
        })
    }
}

/// Upper bound on packets one class can emit in a single tick.
pub const MAX_ARRIVALS_PER_TICK: u32 = 10_000;

fn check_arrivals(field: &str, peak: f64) -> Result<(), ConfigError> {
    if peak <= f64::from(MAX_ARRIVALS_PER_TICK) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field: field.to_string(),
            range: "[0, 10000] packets per tick",
            value: peak,
        })
    }
}

fn check_positive(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(non_positive(field, value))
    }
}
