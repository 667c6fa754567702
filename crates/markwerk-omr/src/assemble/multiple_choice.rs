// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Multiple-choice section: ten questions per block, options A to D.

use markwerk_core::{AnswerSet, ChoiceAnswer, EntryStatus, Layout};

use super::{AnswerAssembler, SelectionRules};
use crate::score::ScoredRegion;

const OPTIONS: [char; 4] = ['A', 'B', 'C', 'D'];
const IDENTITY: [usize; 4] = [0, 1, 2, 3];

#[derive(Debug, Clone)]
pub struct MultipleChoiceAssembler {
    /// `remap[region][printed column]` is the option index.
    remap: Vec<[usize; 4]>,
    rules: SelectionRules,
}

impl MultipleChoiceAssembler {
    pub fn new(remap: Vec<[usize; 4]>, rules: SelectionRules) -> Self {
        Self { remap, rules }
    }

    /// Option scores of one row, in A-D order.
    fn option_scores(&self, region: &ScoredRegion, row: usize) -> [f32; 4] {
        let remap = self.remap.get(region.index).copied().unwrap_or(IDENTITY);
        let mut scores = [0.0f32; 4];
        for (column, &option) in remap.iter().enumerate().take(region.columns) {
            scores[option] = region.cell(row, column).score.confidence;
        }
        scores
    }
}

impl AnswerAssembler for MultipleChoiceAssembler {
    fn layout(&self) -> Layout {
        Layout::P1
    }

    fn assemble(&self, regions: &[ScoredRegion]) -> AnswerSet {
        let mut answers = Vec::with_capacity(regions.iter().map(|r| r.rows).sum());
        for region in regions {
            for row in 0..region.rows {
                let selection = self.rules.select(&self.option_scores(region, row));
                let degraded = (0..region.columns).any(|c| region.cell(row, c).degraded);
                answers.push(ChoiceAnswer {
                    question: (region.index * region.rows + row + 1) as u32,
                    option: selection.winner.map(|i| OPTIONS[i]),
                    status: if selection.winner.is_some() {
                        EntryStatus::Answered
                    } else {
                        EntryStatus::Unanswered
                    },
                    confidence: selection.confidence,
                    ambiguous: selection.ambiguous,
                    degraded,
                });
            }
        }
        AnswerSet::MultipleChoice(answers)
    }
}
