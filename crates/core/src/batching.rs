// crates/core/src/batching.rs
//! Token estimator & batcher (C4, §4.4). Packs DailyAnalysis work units
//! into jobs bounded by a token budget and a hard unit-count cap.

use chrono::NaiveDate;

/// One DailyAnalysis unit queued for scoring, carrying just enough to
/// batch and to build the LLM prompt (§4.5).
#[derive(Debug, Clone)]
pub struct WorkUnit {
    pub daily_analysis_id: i64,
    pub chat_id: String,
    pub analysis_date: NaiveDate,
    /// Concatenation of the day's messages, already formatted for the
    /// prompt (direction + content + timestamp per message).
    pub prompt_text: String,
}

/// `ceil(char_len / 4)` — the estimator from §4.4.
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() + 3) / 4
}

/// One packed batch, ready to become a Job (C3's `create_job`).
#[derive(Debug, Clone)]
pub struct Batch {
    pub units: Vec<WorkUnit>,
}

impl Batch {
    pub fn total_tokens(&self) -> usize {
        self.units.iter().map(|u| estimate_tokens(&u.prompt_text)).sum()
    }
}

/// First-fit batcher, walking units in the order produced by C2 (§4.4).
/// A unit whose own estimate exceeds `max_tokens_per_job` is placed alone.
pub fn pack(units: Vec<WorkUnit>, max_tokens_per_job: usize, batch_size: usize) -> Vec<Batch> {
    let mut batches: Vec<Batch> = Vec::new();

    for unit in units {
        let tokens = estimate_tokens(&unit.prompt_text);

        if tokens > max_tokens_per_job {
            batches.push(Batch { units: vec![unit] });
            continue;
        }

        let target = batches.iter_mut().find(|b| {
            b.units.len() < batch_size && b.total_tokens() + tokens <= max_tokens_per_job
        });

        match target {
            Some(b) => b.units.push(unit),
            None => batches.push(Batch { units: vec![unit] }),
        }
    }

    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(id: i64, text: &str) -> WorkUnit {
        WorkUnit {
            daily_analysis_id: id,
            chat_id: "C1".to_string(),
            analysis_date: NaiveDate::from_ymd_opt(2025, 8, 26).unwrap(),
            prompt_text: text.to_string(),
        }
    }

    #[test]
    fn empty_input_produces_zero_jobs() {
        assert!(pack(vec![], 16_000, 20).is_empty());
    }

    #[test]
    fn estimate_matches_ceil_div_four() {
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn respects_batch_size_cap() {
        let units: Vec<_> = (0..25).map(|i| unit(i, "x")).collect();
        let batches = pack(units, 1_000_000, 20);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].units.len(), 20);
        assert_eq!(batches[1].units.len(), 5);
    }

    #[test]
    fn respects_token_budget() {
        let units = vec![unit(1, &"x".repeat(4000)), unit(2, &"x".repeat(4000))];
        // each unit ~1000 tokens; budget 1500 forces separate batches
        let batches = pack(units, 1500, 20);
        assert_eq!(batches.len(), 2);
    }

    #[test]
    fn oversized_unit_gets_its_own_batch() {
        let units = vec![unit(1, "small"), unit(2, &"x".repeat(100_000))];
        let batches = pack(units, 16_000, 20);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1].units.len(), 1);
    }

    #[test]
    fn backfills_an_earlier_batch_that_still_has_room() {
        // Budget 1000: unit A (900) opens batch 0; B (900) can't join batch 0
        // so it opens batch 1; C (100) doesn't fit batch 1 (900+100>1000) but
        // does fit the leftover room in batch 0 (900+100<=1000) — first-fit
        // should backfill batch 0 rather than opening a third batch.
        let units = vec![
            unit(1, &"x".repeat(3600)),
            unit(2, &"x".repeat(3600)),
            unit(3, &"x".repeat(400)),
        ];
        let batches = pack(units, 1000, 20);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].units.len(), 2);
        assert_eq!(batches[0].units[1].daily_analysis_id, 3);
        assert_eq!(batches[1].units.len(), 1);
    }

    #[test]
    fn total_tokens_never_exceed_budget_across_batches() {
        let units: Vec<_> = (0..50).map(|i| unit(i, &"x".repeat(400))).collect();
        let batches = pack(units, 400, 20);
        for b in &batches {
            assert!(b.total_tokens() <= 400);
            assert!(b.units.len() <= 20);
        }
    }
}
