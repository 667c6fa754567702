// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// True/false section: each block is one numbered cell with sub-parts a to d,
// answered by marking the "true" or the "false" column.

use markwerk_core::{AnswerSet, EntryStatus, Layout, TrueFalseAnswer};

use super::{AnswerAssembler, SelectionRules};
use crate::score::ScoredRegion;

const TRUE_COLUMN: usize = 0;
const FALSE_COLUMN: usize = 1;

#[derive(Debug, Clone)]
pub struct TrueFalseAssembler {
    rules: SelectionRules,
}

impl TrueFalseAssembler {
    pub fn new(rules: SelectionRules) -> Self {
        Self { rules }
    }
}

impl AnswerAssembler for TrueFalseAssembler {
    fn layout(&self) -> Layout {
        Layout::P2
    }

    fn assemble(&self, regions: &[ScoredRegion]) -> AnswerSet {
        let mut answers = Vec::new();
        for region in regions {
            for row in 0..region.rows {
                let truth = region.cell(row, TRUE_COLUMN);
                let falsity = region.cell(row, FALSE_COLUMN);
                // True first, so an exact tie reads as true.
                let selection = self
                    .rules
                    .select(&[truth.score.confidence, falsity.score.confidence]);
                answers.push(TrueFalseAnswer {
                    cell: region.index as u32 + 1,
                    sub_part: (b'a' + row as u8) as char,
                    value: selection.winner.map(|w| w == TRUE_COLUMN),
                    status: if selection.winner.is_some() {
                        EntryStatus::Answered
                    } else {
                        EntryStatus::Unanswered
                    },
                    confidence: selection.confidence,
                    ambiguous: selection.ambiguous,
                    degraded: truth.degraded || falsity.degraded,
                });
            }
        }
        AnswerSet::TrueFalse(answers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::ScoredCell;
    use markwerk_core::config::ScoringConfig;
    use markwerk_core::{CellCoordinate, CellScore};

    fn region(index: usize, rows: &[[f32; 2]; 4]) -> ScoredRegion {
        let cells = rows
            .iter()
            .enumerate()
            .flat_map(|(row, pair)| {
                pair.iter().enumerate().map(move |(column, &confidence)| ScoredCell {
                    coordinate: CellCoordinate { region: index, row, column },
                    score: CellScore {
                        confidence,
                        ..CellScore::default()
                    },
                    degraded: false,
                })
            })
            .collect();
        ScoredRegion {
            index,
            rows: 4,
            columns: 2,
            cells,
        }
    }

    fn answers(regions: &[ScoredRegion]) -> Vec<TrueFalseAnswer> {
        let assembler = TrueFalseAssembler::new(SelectionRules::from_config(&ScoringConfig::default()));
        match assembler.assemble(regions) {
            AnswerSet::TrueFalse(v) => v,
            other => panic!("unexpected answer set {other:?}"),
        }
    }

    /// Sub-parts are read independently of each other.
    #[test]
    fn sub_parts_are_independent() {
        let out = answers(&[region(
            0,
            &[[0.4, 0.0], [0.0, 0.4], [0.0, 0.0], [0.3, 0.02]],
        )]);
        let values: Vec<Option<bool>> = out.iter().map(|a| a.value).collect();
        assert_eq!(values, vec![Some(true), Some(false), None, Some(true)]);
        assert_eq!(out[2].status, EntryStatus::Unanswered);
        let labels: Vec<char> = out.iter().map(|a| a.sub_part).collect();
        assert_eq!(labels, vec!['a', 'b', 'c', 'd']);
    }

    #[test]
    fn tie_reads_as_true() {
        let out = answers(&[region(5, &[[0.3, 0.3], [0.0; 2], [0.0; 2], [0.0; 2]])]);
        assert_eq!(out[0].value, Some(true));
        assert!(out[0].ambiguous);
        assert_eq!(out[0].cell, 6);
    }
}
