// crates/core/src/time_metrics.rs
//! Deterministic time-metrics calculator (C7, §4.7). Runs after the LLM
//! adapter (C5) returns, before the pillar/CSI calculator (C8).

use crate::model::{Direction, Message, TimeMetrics};

/// Computes `first_response_time`, `avg_response_time`, and
/// `total_handling_time` for one day's messages. `messages` must all share
/// the same `analysis_date` and need not be pre-sorted.
pub fn compute(messages: &[Message]) -> TimeMetrics {
    if messages.len() < 2 {
        return TimeMetrics {
            first_response_time: None,
            avg_response_time: None,
            total_handling_time: None,
        };
    }

    let mut ordered: Vec<&Message> = messages.iter().collect();
    ordered.sort_by_key(|m| m.social_create_time);

    let total_handling_time = {
        let first = ordered.first().unwrap().social_create_time;
        let last = ordered.last().unwrap().social_create_time;
        Some((last - first).num_seconds() as f64 / 60.0)
    };

    let first_response_time = ordered
        .iter()
        .position(|m| m.direction == Direction::ToCompany)
        .and_then(|from_idx| {
            ordered[from_idx..]
                .iter()
                .find(|m| m.direction == Direction::ToClient)
                .map(|reply| {
                    (reply.social_create_time - ordered[from_idx].social_create_time)
                        .num_seconds() as f64
                })
        });

    let mut gaps = Vec::new();
    for pair in ordered.windows(2) {
        if pair[0].direction == Direction::ToCompany && pair[1].direction == Direction::ToClient {
            gaps.push((pair[1].social_create_time - pair[0].social_create_time).num_seconds() as f64);
        }
    }
    let avg_response_time = if gaps.is_empty() {
        None
    } else {
        Some(gaps.iter().sum::<f64>() / gaps.len() as f64)
    };

    TimeMetrics {
        first_response_time,
        avg_response_time,
        total_handling_time,
    }
}
