// crates/core/src/scoring.rs
//! Pillar/CSI calculator (C8, §4.8). Pure functions over already-computed
//! AI and time micro-metrics; no I/O.

use crate::model::{AiMetrics, PillarScores, TimeMetrics};

/// Piecewise-linear thresholds mapping a raw time metric (seconds or
/// minutes) to a 0–10 "goodness" score. Defaults match §4.8.
#[derive(Debug, Clone, Copy)]
pub struct TimeThreshold {
    pub good_at: f64,
    pub zero_at: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct EfficiencyThresholds {
    pub first_response: TimeThreshold,
    pub avg_response: TimeThreshold,
    pub total_handling: TimeThreshold,
}

impl Default for EfficiencyThresholds {
    fn default() -> Self {
        Self {
            first_response: TimeThreshold { good_at: 60.0, zero_at: 1800.0 },
            avg_response: TimeThreshold { good_at: 120.0, zero_at: 3600.0 },
            total_handling: TimeThreshold { good_at: 5.0, zero_at: 60.0 },
        }
    }
}

fn normalize_time(value: f64, t: TimeThreshold) -> f64 {
    if value <= t.good_at {
        10.0
    } else if value >= t.zero_at {
        0.0
    } else {
        10.0 * (t.zero_at - value) / (t.zero_at - t.good_at)
    }
}

fn clip(v: f64, lo: f64, hi: f64) -> f64 {
    v.max(lo).min(hi)
}

fn effectiveness(ai: &AiMetrics) -> f64 {
    (ai.resolution_achieved + ai.fcr_score) / 2.0
}

fn effort(ai: &AiMetrics) -> f64 {
    clip((7.0 - ai.ces) / 6.0 * 10.0, 0.0, 10.0)
}

fn efficiency(time: &TimeMetrics, thresholds: &EfficiencyThresholds) -> Option<f64> {
    let mut scores = Vec::with_capacity(3);
    if let Some(v) = time.first_response_time {
        scores.push(normalize_time(v, thresholds.first_response));
    }
    if let Some(v) = time.avg_response_time {
        scores.push(normalize_time(v, thresholds.avg_response));
    }
    if let Some(v) = time.total_handling_time {
        scores.push(normalize_time(v, thresholds.total_handling));
    }
    if scores.is_empty() {
        None
    } else {
        Some(scores.iter().sum::<f64>() / scores.len() as f64)
    }
}

fn empathy(ai: &AiMetrics) -> f64 {
    let shift_component = (ai.sentiment_shift + 5.0) / 10.0 * 10.0;
    clip(0.4 * ai.sentiment_score + 0.6 * shift_component, 0.0, 10.0)
}

/// Weight of each pillar in the CSI composite (§4.8).
const W_EFFECTIVENESS: f64 = 0.40;
const W_EFFORT: f64 = 0.25;
const W_EFFICIENCY: f64 = 0.15;
const W_EMPATHY: f64 = 0.20;

/// Computes the four pillars and the composite CSI. `ai` is `None` when a
/// job never produced a usable result for this unit (time metrics may
/// still exist independently, but without AI metrics no pillar other than
/// Efficiency is computable).
pub fn compute(ai: Option<&AiMetrics>, time: &TimeMetrics, thresholds: &EfficiencyThresholds) -> PillarScores {
    let effectiveness_score = ai.map(effectiveness);
    let effort_score = ai.map(effort);
    let efficiency_score = efficiency(time, thresholds);
    let empathy_score = ai.map(empathy);

    let weighted = [
        (effectiveness_score, W_EFFECTIVENESS),
        (effort_score, W_EFFORT),
        (efficiency_score, W_EFFICIENCY),
        (empathy_score, W_EMPATHY),
    ];

    let available: Vec<(f64, f64)> = weighted
        .iter()
        .filter_map(|(v, w)| v.map(|v| (v, *w)))
        .collect();

    let csi_score = if available.is_empty() {
        None
    } else {
        let weight_sum: f64 = available.iter().map(|(_, w)| w).sum();
        let weighted_sum: f64 = available.iter().map(|(v, w)| v * w / weight_sum).sum();
        Some(10.0 * weighted_sum)
    };

    PillarScores {
        effectiveness_score,
        effort_score,
        efficiency_score,
        empathy_score,
        csi_score,
    }
}
