// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Answer assembly: layout-specific rules that turn scored cells into
// answers, plus the selection rule they share.

pub mod multiple_choice;
pub mod numeric;
pub mod true_false;

pub use multiple_choice::MultipleChoiceAssembler;
pub use numeric::{LADDER_SYMBOLS, NumericAssembler, parse_decimal};
pub use true_false::TrueFalseAssembler;

use markwerk_core::config::ScoringConfig;
use markwerk_core::{AnswerSet, Layout};

use crate::score::ScoredRegion;

/// Layout-specific answer rules.
pub trait AnswerAssembler: Send + Sync {
    fn layout(&self) -> Layout;

    /// Build the answer set from regions in question order.
    fn assemble(&self, regions: &[ScoredRegion]) -> AnswerSet;
}

/// Outcome of picking one cell out of a group of alternatives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selection {
    /// Index of the accepted alternative.
    pub winner: Option<usize>,
    /// Score of the strongest alternative, accepted or not.
    pub confidence: f32,
    /// A runner-up was also above the floor and close to the winner.
    pub ambiguous: bool,
}

/// Floor and ambiguity margin applied to every group of alternatives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionRules {
    pub floor: f32,
    pub ambiguity_margin: f32,
}

impl SelectionRules {
    pub fn from_config(config: &ScoringConfig) -> Self {
        Self {
            floor: config.confidence_floor,
            ambiguity_margin: config.ambiguity_margin,
        }
    }

    /// Strongest alternative above the floor. Equal scores go to the lower
    /// index.
    pub fn select(&self, scores: &[f32]) -> Selection {
        let mut best: Option<(usize, f32)> = None;
        for (i, &score) in scores.iter().enumerate() {
            match best {
                Some((_, top)) if score <= top => {}
                _ => best = Some((i, score)),
            }
        }
        let Some((index, top)) = best else {
            return Selection {
                winner: None,
                confidence: 0.0,
                ambiguous: false,
            };
        };
        if top <= self.floor {
            return Selection {
                winner: None,
                confidence: top,
                ambiguous: false,
            };
        }
        let runner_up = scores
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != index)
            .map(|(_, &s)| s)
            .fold(f32::MIN, f32::max);
        Selection {
            winner: Some(index),
            confidence: top,
            ambiguous: runner_up > self.floor && top - runner_up <= self.ambiguity_margin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> SelectionRules {
        SelectionRules::from_config(&ScoringConfig::default())
    }

    #[test]
    fn picks_strongest_above_floor() {
        let s = rules().select(&[0.02, 0.31, 0.05, 0.0]);
        assert_eq!(s.winner, Some(1));
        assert!((s.confidence - 0.31).abs() < 1e-6);
        assert!(!s.ambiguous);
    }

    /// Equal scores resolve to the lower index, and are flagged.
    #[test]
    fn tie_goes_to_lower_index() {
        let s = rules().select(&[0.0, 0.4, 0.0, 0.4]);
        assert_eq!(s.winner, Some(1));
        assert!(s.ambiguous);
    }

    #[test]
    fn nothing_above_floor_is_unanswered() {
        let s = rules().select(&[0.05, 0.1, 0.02]);
        assert_eq!(s.winner, None);
        assert!((s.confidence - 0.1).abs() < 1e-6);
        assert_eq!(rules().select(&[]).winner, None);
    }

    #[test]
    fn close_runner_up_below_floor_is_not_ambiguous() {
        let r = SelectionRules {
            floor: 0.10,
            ambiguity_margin: 0.05,
        };
        assert!(!r.select(&[0.13, 0.09]).ambiguous);
        assert!(r.select(&[0.13, 0.11]).ambiguous);
        assert!(!r.select(&[0.30, 0.11]).ambiguous);
    }
}
