//! Vote rounds and resolution

use erwin_protocol::{VoteOption, VoteRoundPayload};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct VoteRound {
    pub id: Uuid,
    /// Track that was playing when the round opened
    pub for_track_id: Option<Uuid>,
    pub started_at_ms: i64,
    pub ends_at_ms: i64,
    pub options_json: String,
    pub winner_track_id: Option<Uuid>,
    pub resolved_at_ms: Option<i64>,
}

impl VoteRound {
    pub fn options(&self) -> Result<Vec<VoteOption>, serde_json::Error> {
        serde_json::from_str(&self.options_json)
    }

    /// Accepting votes at `now_ms`.
    pub fn is_open(&self, now_ms: i64) -> bool {
        self.resolved_at_ms.is_none() && now_ms < self.ends_at_ms
    }

    pub fn has_expired(&self, now_ms: i64) -> bool {
        self.resolved_at_ms.is_none() && now_ms >= self.ends_at_ms
    }

    pub fn payload(&self, options: Vec<VoteOption>, counts: Vec<u32>) -> VoteRoundPayload {
        VoteRoundPayload {
            round_id: self.id,
            started_at: self.started_at_ms,
            ends_at: self.ends_at_ms,
            options,
            counts,
            winner: self.winner_track_id,
        }
    }
}

/// Count votes per option. Out-of-range indices are ignored.
pub fn tally(option_count: usize, option_indices: &[i64]) -> Vec<u32> {
    let mut counts = vec![0u32; option_count];
    for index in option_indices {
        if let Some(slot) = usize::try_from(*index).ok().and_then(|i| counts.get_mut(i)) {
            *slot += 1;
        }
    }
    counts
}

/// Index of the winning option.
///
/// Uniform among the options sharing the maximum count, which with no votes
/// cast is every option. Returns `None` only for an empty round.
pub fn pick_winner<R: Rng + ?Sized>(counts: &[u32], rng: &mut R) -> Option<usize> {
    let max = counts.iter().copied().max()?;
    let leaders: Vec<usize> = counts
        .iter()
        .enumerate()
        .filter(|(_, c)| **c == max)
        .map(|(i, _)| i)
        .collect();
    leaders.choose(rng).copied()
}

/// Up to `count` distinct candidates in random order.
pub fn sample_options<T: Clone, R: Rng + ?Sized>(candidates: &[T], count: usize, rng: &mut R) -> Vec<T> {
    let mut picked: Vec<T> = candidates.choose_multiple(rng, count).cloned().collect();
    picked.shuffle(rng);
    picked
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn test_tally_ignores_out_of_range() {
        assert_eq!(tally(3, &[0, 2, 2, 5, -1]), vec![1, 0, 2]);
    }

    #[test]
    fn test_strict_maximum_always_wins() {
        for seed in 0..200 {
            let mut rng = StdRng::seed_from_u64(seed);
            assert_eq!(pick_winner(&[1, 4, 2], &mut rng), Some(1));
        }
    }

    #[test]
    fn test_ties_resolve_among_leaders_only() {
        let mut seen = HashSet::new();
        for seed in 0..500 {
            let mut rng = StdRng::seed_from_u64(seed);
            let winner = pick_winner(&[3, 1, 3, 0], &mut rng).unwrap();
            assert!(winner == 0 || winner == 2);
            seen.insert(winner);
        }
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_no_votes_picks_any_option() {
        let mut seen = HashSet::new();
        for seed in 0..500 {
            let mut rng = StdRng::seed_from_u64(seed);
            seen.insert(pick_winner(&[0, 0, 0], &mut rng).unwrap());
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_empty_round_has_no_winner() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(pick_winner(&[], &mut rng), None);
    }

    #[test]
    fn test_sample_options_without_replacement() {
        let mut rng = StdRng::seed_from_u64(7);
        let candidates: Vec<u32> = (0..10).collect();
        let picked = sample_options(&candidates, 4, &mut rng);
        assert_eq!(picked.len(), 4);
        assert_eq!(picked.iter().collect::<HashSet<_>>().len(), 4);

        let few = sample_options(&candidates[..2], 5, &mut rng);
        assert_eq!(few.len(), 2);
    }

    #[test]
    fn test_round_window() {
        let round = VoteRound {
            id: Uuid::new_v4(),
            for_track_id: None,
            started_at_ms: 1_000,
            ends_at_ms: 16_000,
            options_json: "[]".into(),
            winner_track_id: None,
            resolved_at_ms: None,
        };
        assert!(round.is_open(15_999));
        assert!(!round.is_open(16_000));
        assert!(round.has_expired(16_000));
    }
}
