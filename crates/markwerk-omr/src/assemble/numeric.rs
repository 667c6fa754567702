// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Decimal-entry section: every question is a few digit ladders; the marked
// symbols of a question spell a signed decimal with a comma separator.

use markwerk_core::config::NUMERIC_QUESTIONS;
use markwerk_core::{AnswerSet, EntryStatus, Layout, NumericAnswer};

use super::{AnswerAssembler, SelectionRules};
use crate::score::ScoredRegion;

/// Ladder rows from top to bottom.
pub const LADDER_SYMBOLS: [char; 12] = ['-', ',', '0', '1', '2', '3', '4', '5', '6', '7', '8', '9'];

#[derive(Debug, Clone)]
pub struct NumericAssembler {
    positions: usize,
    rules: SelectionRules,
}

impl NumericAssembler {
    pub fn new(positions: usize, rules: SelectionRules) -> Self {
        Self { positions, rules }
    }

    fn question(&self, region: &ScoredRegion, question: usize) -> NumericAnswer {
        let mut text = String::new();
        let mut confidence: Option<f32> = None;
        let mut ambiguous = false;
        let mut degraded = false;

        for position in 0..self.positions {
            let ladder = question * self.positions + position;
            if ladder >= region.columns {
                break;
            }
            let selection = self.rules.select(&region.column_confidences(ladder));
            degraded |= (0..region.rows).any(|row| region.cell(row, ladder).degraded);
            if let Some(row) = selection.winner {
                if let Some(&symbol) = LADDER_SYMBOLS.get(row) {
                    text.push(symbol);
                    confidence = Some(confidence.map_or(selection.confidence, |c| c.min(selection.confidence)));
                    ambiguous |= selection.ambiguous;
                }
            }
        }

        let (value, status) = if text.is_empty() {
            (None, EntryStatus::Unanswered)
        } else {
            match parse_decimal(&text) {
                Some(v) => (Some(v), EntryStatus::Answered),
                None => (None, EntryStatus::Malformed),
            }
        };
        NumericAnswer {
            question: question as u32 + 1,
            value,
            text,
            status,
            confidence: confidence.unwrap_or(0.0),
            ambiguous,
            degraded,
        }
    }
}

impl AnswerAssembler for NumericAssembler {
    fn layout(&self) -> Layout {
        Layout::P3
    }

    fn assemble(&self, regions: &[ScoredRegion]) -> AnswerSet {
        let answers = match regions.first() {
            Some(region) => (0..NUMERIC_QUESTIONS).map(|q| self.question(region, q)).collect(),
            None => Vec::new(),
        };
        AnswerSet::Numeric(answers)
    }
}

/// Parse `[-]digits[,digits]` with at least one digit overall.
pub fn parse_decimal(text: &str) -> Option<f64> {
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (whole, fraction) = match body.split_once(',') {
        Some((w, f)) => (w, f),
        None => (body, ""),
    };
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(whole) || !all_digits(fraction) || whole.len() + fraction.len() == 0 {
        return None;
    }

    let digits = |s: &str| s.bytes().fold(0.0f64, |acc, b| acc * 10.0 + f64::from(b - b'0'));
    let value = digits(whole) + digits(fraction) / 10f64.powi(fraction.len() as i32);
    Some(if negative { -value } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::ScoredCell;
    use markwerk_core::config::ScoringConfig;
    use markwerk_core::{CellCoordinate, CellScore};

    fn symbol_row(symbol: char) -> usize {
        LADDER_SYMBOLS.iter().position(|&s| s == symbol).expect("ladder symbol")
    }

    /// A numeric region with `entries[q]` marked in question `q`'s ladders;
    /// a space leaves a ladder blank.
    fn region(entries: &[&str]) -> ScoredRegion {
        let columns = NUMERIC_QUESTIONS * 4;
        let mut marks = vec![None; columns];
        for (q, entry) in entries.iter().enumerate() {
            for (p, ch) in entry.chars().enumerate() {
                if ch != ' ' {
                    marks[q * 4 + p] = Some(symbol_row(ch));
                }
            }
        }
        let mut cells = Vec::new();
        for row in 0..12 {
            for column in 0..columns {
                let confidence = if marks[column] == Some(row) { 0.35 } else { 0.0 };
                cells.push(ScoredCell {
                    coordinate: CellCoordinate { region: 0, row, column },
                    score: CellScore {
                        confidence,
                        ..CellScore::default()
                    },
                    degraded: false,
                });
            }
        }
        ScoredRegion {
            index: 0,
            rows: 12,
            columns,
            cells,
        }
    }

    fn answers(entries: &[&str]) -> Vec<NumericAnswer> {
        let assembler = NumericAssembler::new(4, SelectionRules::from_config(&ScoringConfig::default()));
        match assembler.assemble(&[region(entries)]) {
            AnswerSet::Numeric(v) => v,
            other => panic!("unexpected answer set {other:?}"),
        }
    }

    #[test]
    fn parses_signed_comma_decimals() {
        assert_eq!(parse_decimal("-1,5"), Some(-1.5));
        assert_eq!(parse_decimal("2024"), Some(2024.0));
        assert_eq!(parse_decimal(",25"), Some(0.25));
        assert_eq!(parse_decimal("7,"), Some(7.0));
        assert_eq!(parse_decimal("-"), None);
        assert_eq!(parse_decimal("1,2,3"), None);
        assert_eq!(parse_decimal("1-2"), None);
        assert_eq!(parse_decimal(""), None);
    }

    #[test]
    fn reads_minus_one_and_a_half() {
        let out = answers(&["-1,5"]);
        assert_eq!(out.len(), NUMERIC_QUESTIONS);
        assert_eq!(out[0].text, "-1,5");
        assert_eq!(out[0].value, Some(-1.5));
        assert_eq!(out[0].status, EntryStatus::Answered);
        assert!((out[0].confidence - 0.35).abs() < 1e-6);
        assert_eq!(out[1].status, EntryStatus::Unanswered);
        assert_eq!(out[1].text, "");
    }

    /// Blank ladders are skipped; the remaining symbols are joined.
    #[test]
    fn blank_ladders_are_skipped() {
        let out = answers(&["", "1 2 ", "  -5"]);
        assert_eq!(out[1].text, "12");
        assert_eq!(out[1].value, Some(12.0));
        assert_eq!(out[2].value, Some(-5.0));
    }

    #[test]
    fn misplaced_sign_is_malformed() {
        let out = answers(&["1-2"]);
        assert_eq!(out[0].status, EntryStatus::Malformed);
        assert_eq!(out[0].text, "1-2");
        assert_eq!(out[0].value, None);
    }
}
