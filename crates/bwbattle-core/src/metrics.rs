//! # Metrics
//!
//! Per-class counters for a run, the final [`Report`], and its Prometheus
//! text exposition.
//!
//! An eviction moves one packet of the victim's class from `admitted` to
//! `dropped`, so `arrived == admitted + dropped` and
//! `admitted == served + buffered` hold per class at every tick boundary.

use std::fmt::Write;

use serde::Serialize;

use crate::config::PolicyKind;
use crate::packet::{PerClass, TrafficClass};
use crate::policy::DropReason;

// ─── Counters ───────────────────────────────────────────────────────────────

/// Drops broken down by reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DropCounts {
    pub capacity: u64,
    pub congestion: u64,
    pub policed: u64,
    pub preempted: u64,
}

impl DropCounts {
    pub fn get(&self, reason: DropReason) -> u64 {
        match reason {
            DropReason::Capacity => self.capacity,
            DropReason::Congestion => self.congestion,
            DropReason::Policed => self.policed,
            DropReason::Preempted => self.preempted,
        }
    }

    fn bump(&mut self, reason: DropReason) {
        match reason {
            DropReason::Capacity => self.capacity += 1,
            DropReason::Congestion => self.congestion += 1,
            DropReason::Policed => self.policed += 1,
            DropReason::Preempted => self.preempted += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.capacity + self.congestion + self.policed + self.preempted
    }

    fn add(&mut self, other: &DropCounts) {
        self.capacity += other.capacity;
        self.congestion += other.congestion;
        self.policed += other.policed;
        self.preempted += other.preempted;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClassCounters {
    pub arrived: u64,
    pub admitted: u64,
    pub dropped: u64,
    pub served: u64,
    /// Admitted, then preempted out of the buffer.
    pub evicted: u64,
    pub drops: DropCounts,
}

impl ClassCounters {
    pub fn loss_rate(&self) -> f64 {
        if self.arrived == 0 {
            0.0
        } else {
            self.dropped as f64 / self.arrived as f64
        }
    }
}

// ─── Time series ────────────────────────────────────────────────────────────

/// Per-tick samples, recorded when `record_series` is on.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimeSeries {
    pub occupancy: Vec<usize>,
    /// Loss rate so far, per class, after each tick.
    pub cumulative_loss: PerClass<Vec<f64>>,
    /// Packets served in each tick, per class.
    pub served: PerClass<Vec<u32>>,
}

impl TimeSeries {
    pub fn len(&self) -> usize {
        self.occupancy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.occupancy.is_empty()
    }
}

// ─── Collector ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    counters: PerClass<ClassCounters>,
    preemptions: u64,
    ticks: u64,
    served_this_tick: PerClass<u32>,
    series: Option<TimeSeries>,
}

impl MetricsCollector {
    pub fn new(record_series: bool) -> Self {
        Self {
            series: record_series.then(TimeSeries::default),
            ..Default::default()
        }
    }

    pub fn record_arrival(&mut self, class: TrafficClass) {
        self.counters[class].arrived += 1;
    }

    pub fn record_admit(&mut self, class: TrafficClass) {
        self.counters[class].admitted += 1;
    }

    pub fn record_drop(&mut self, class: TrafficClass, reason: DropReason) {
        let c = &mut self.counters[class];
        c.dropped += 1;
        c.drops.bump(reason);
    }

    /// A previously admitted packet of `class` was preempted.
    pub fn record_evict(&mut self, class: TrafficClass) {
        let c = &mut self.counters[class];
        c.admitted -= 1;
        c.evicted += 1;
        c.dropped += 1;
        c.drops.bump(DropReason::Preempted);
        self.preemptions += 1;
    }

    pub fn record_serve(&mut self, class: TrafficClass) {
        self.counters[class].served += 1;
        self.served_this_tick[class] += 1;
    }

    /// Closes the current tick.
    pub fn record_tick(&mut self, occupancy: usize) {
        self.ticks += 1;
        let served = std::mem::take(&mut self.served_this_tick);
        if let Some(series) = &mut self.series {
            series.occupancy.push(occupancy);
            for class in TrafficClass::ALL {
                series.cumulative_loss[class].push(self.counters[class].loss_rate());
                series.served[class].push(served[class]);
            }
        }
    }

    pub fn counters(&self) -> &PerClass<ClassCounters> {
        &self.counters
    }

    pub fn preemptions(&self) -> u64 {
        self.preemptions
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Checks both conservation equations against what is still buffered.
    pub fn check_conservation(&self, buffered: &PerClass<usize>) -> Result<(), String> {
        for (class, c) in self.counters.iter() {
            if c.arrived != c.admitted + c.dropped {
                return Err(format!(
                    "{class}: arrived {} != admitted {} + dropped {}",
                    c.arrived, c.admitted, c.dropped
                ));
            }
            let queued = buffered[class] as u64;
            if c.admitted != c.served + queued {
                return Err(format!(
                    "{class}: admitted {} != served {} + buffered {queued}",
                    c.admitted, c.served
                ));
            }
        }
        Ok(())
    }

    pub fn report(&self, run: RunSummary) -> Report {
        let classes = self.counters.map(|c| ClassReport::new(c, self.ticks));
        let mut total = ClassCounters::default();
        for (_, c) in self.counters.iter() {
            total.arrived += c.arrived;
            total.admitted += c.admitted;
            total.dropped += c.dropped;
            total.served += c.served;
            total.evicted += c.evicted;
            total.drops.add(&c.drops);
        }
        Report {
            policy: run.policy,
            seed: run.seed,
            total_ticks: self.ticks,
            classes,
            aggregate: ClassReport::new(&total, self.ticks),
            preemptions: self.preemptions,
            final_occupancy: run.final_occupancy,
            peak_occupancy: run.peak_occupancy,
            series: self.series.clone(),
        }
    }
}

/// Run-level facts the collector does not track itself.
#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    pub policy: PolicyKind,
    pub seed: u64,
    pub final_occupancy: usize,
    pub peak_occupancy: usize,
}

// ─── Report ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassReport {
    pub arrived: u64,
    pub admitted: u64,
    pub dropped: u64,
    pub served: u64,
    pub evicted: u64,
    pub drops: DropCounts,
    pub loss_rate: f64,
    /// Served packets per tick.
    pub throughput: f64,
}

impl ClassReport {
    fn new(c: &ClassCounters, ticks: u64) -> Self {
        let throughput = if ticks == 0 {
            0.0
        } else {
            c.served as f64 / ticks as f64
        };
        Self {
            arrived: c.arrived,
            admitted: c.admitted,
            dropped: c.dropped,
            served: c.served,
            evicted: c.evicted,
            drops: c.drops,
            loss_rate: c.loss_rate(),
            throughput,
        }
    }
}

/// Outcome of one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub policy: PolicyKind,
    pub seed: u64,
    pub total_ticks: u64,
    pub classes: PerClass<ClassReport>,
    pub aggregate: ClassReport,
    pub preemptions: u64,
    pub final_occupancy: usize,
    pub peak_occupancy: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<TimeSeries>,
}

impl Report {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn loss_rate(&self, class: TrafficClass) -> f64 {
        self.classes[class].loss_rate
    }
}

// ─── Prometheus ─────────────────────────────────────────────────────────────

const DROP_REASONS: [(DropReason, &str); 4] = [
    (DropReason::Capacity, "capacity"),
    (DropReason::Congestion, "congestion"),
    (DropReason::Policed, "policed"),
    (DropReason::Preempted, "preempted"),
];

/// Render one report as Prometheus text exposition format.
pub fn render_prometheus(report: &Report) -> String {
    render_prometheus_all(std::slice::from_ref(report))
}

/// Render several reports (one per policy) with shared HELP/TYPE headers.
pub fn render_prometheus_all(reports: &[Report]) -> String {
    let mut out = String::with_capacity(4096);

    // ── Per-class counters ──────────────────────────────────────

    let counters: [(&str, &str, fn(&ClassReport) -> u64); 5] = [
        ("arrived", "Packets generated.", |c| c.arrived),
        ("admitted", "Packets admitted and not evicted.", |c| c.admitted),
        ("dropped", "Packets dropped, including evictions.", |c| c.dropped),
        ("served", "Packets that left the buffer through the server.", |c| c.served),
        ("evicted", "Admitted packets later preempted.", |c| c.evicted),
    ];
    for (name, help, value) in counters {
        header(&mut out, &format!("bwbattle_packets_{name}_total"), help, "counter");
        for r in reports {
            for (class, c) in r.classes.iter() {
                let _ = writeln!(
                    out,
                    "bwbattle_packets_{name}_total{{policy=\"{}\",class=\"{class}\"}} {}",
                    r.policy.as_str(),
                    value(c)
                );
            }
        }
    }

    header(
        &mut out,
        "bwbattle_drops_total",
        "Drops by class and reason.",
        "counter",
    );
    for r in reports {
        for (class, c) in r.classes.iter() {
            for (reason, label) in DROP_REASONS {
                let _ = writeln!(
                    out,
                    "bwbattle_drops_total{{policy=\"{}\",class=\"{class}\",reason=\"{label}\"}} {}",
                    r.policy.as_str(),
                    c.drops.get(reason)
                );
            }
        }
    }

    // ── Per-class rates ─────────────────────────────────────────

    header(
        &mut out,
        "bwbattle_loss_rate",
        "Dropped over arrived (0.0-1.0).",
        "gauge",
    );
    for r in reports {
        for (class, c) in r.classes.iter() {
            let _ = writeln!(
                out,
                "bwbattle_loss_rate{{policy=\"{}\",class=\"{class}\"}} {:.6}",
                r.policy.as_str(),
                c.loss_rate
            );
        }
    }

    header(
        &mut out,
        "bwbattle_throughput",
        "Served packets per tick.",
        "gauge",
    );
    for r in reports {
        for (class, c) in r.classes.iter() {
            let _ = writeln!(
                out,
                "bwbattle_throughput{{policy=\"{}\",class=\"{class}\"}} {:.6}",
                r.policy.as_str(),
                c.throughput
            );
        }
    }

    // ── Run-level ───────────────────────────────────────────────

    header(
        &mut out,
        "bwbattle_preemptions_total",
        "WFQ evictions performed.",
        "counter",
    );
    for r in reports {
        let _ = writeln!(
            out,
            "bwbattle_preemptions_total{{policy=\"{}\"}} {}",
            r.policy.as_str(),
            r.preemptions
        );
    }

    header(
        &mut out,
        "bwbattle_buffer_occupancy",
        "Packets left in the buffer at the end of the run.",
        "gauge",
    );
    for r in reports {
        let _ = writeln!(
            out,
            "bwbattle_buffer_occupancy{{policy=\"{}\"}} {}",
            r.policy.as_str(),
            r.final_occupancy
        );
    }

    header(
        &mut out,
        "bwbattle_buffer_peak_occupancy",
        "Highest buffer occupancy seen during the run.",
        "gauge",
    );
    for r in reports {
        let _ = writeln!(
            out,
            "bwbattle_buffer_peak_occupancy{{policy=\"{}\"}} {}",
            r.policy.as_str(),
            r.peak_occupancy
        );
    }

    header(&mut out, "bwbattle_ticks_total", "Ticks simulated.", "counter");
    for r in reports {
        let _ = writeln!(
            out,
            "bwbattle_ticks_total{{policy=\"{}\"}} {}",
            r.policy.as_str(),
            r.total_ticks
        );
    }

    out
}

fn header(out: &mut String, name: &str, help: &str, kind: &str) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} {kind}");
}
