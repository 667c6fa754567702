// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Markwerk answer-sheet grader.

use serde::{Deserialize, Serialize};

/// Answer-sheet section being graded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// 40 multiple-choice questions in four blocks of ten, options A-D.
    P1,
    /// Eight true/false cells (2 x 4), four sub-parts each.
    P2,
    /// Eight decimal-entry questions in one block of digit ladders.
    P3,
}

impl Layout {
    pub const ALL: [Layout; 3] = [Layout::P1, Layout::P2, Layout::P3];

    /// Number of independently detected regions on the sheet.
    pub const fn region_count(self) -> usize {
        match self {
            Layout::P1 => 4,
            Layout::P2 => 8,
            Layout::P3 => 1,
        }
    }

    /// Logical answer rows inside one region.
    pub const fn rows_per_region(self) -> usize {
        match self {
            Layout::P1 => 10,
            Layout::P2 => 4,
            Layout::P3 => 12,
        }
    }
}

impl std::fmt::Display for Layout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Layout::P1 => "p1",
            Layout::P2 => "p2",
            Layout::P3 => "p3",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for Layout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "p1" => Ok(Layout::P1),
            "p2" => Ok(Layout::P2),
            "p3" => Ok(Layout::P3),
            other => Err(format!("unknown layout '{other}' (expected p1, p2 or p3)")),
        }
    }
}

/// Logical shape of one layout: how many regions, and the answer grid inside
/// each region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridTopology {
    pub layout: Layout,
    pub regions: usize,
    /// Logical rows per region (questions, sub-parts, or ladder rows).
    pub rows: usize,
    /// Logical answer columns per region (options, states, or ladders).
    pub columns: usize,
}

impl GridTopology {
    pub fn cells_per_region(&self) -> usize {
        self.rows * self.columns
    }
}

/// Logical address of one answer cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellCoordinate {
    pub region: usize,
    pub row: usize,
    pub column: usize,
}

/// Mark evidence for one cell. All values lie in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CellScore {
    /// Mean darkness relative to the region's paper background.
    pub darkness: f32,
    /// Ink fill fraction above the region's unmarked baseline.
    pub fill: f32,
    /// Blended mark confidence.
    pub confidence: f32,
    /// True when the sampled patch was too small to measure.
    pub degenerate: bool,
}

/// Grid axis a warning refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Rows,
    Columns,
}

/// Non-fatal quality problems surfaced next to the answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QualityWarning {
    /// A drift-correction anchor was not found; the band fell back to
    /// uniform spacing.
    AlignmentDegraded {
        region: usize,
        axis: Axis,
        band: usize,
        /// Ladder column for layouts aligned one column at a time.
        #[serde(skip_serializing_if = "Option::is_none")]
        ladder: Option<usize>,
    },
}

/// Outcome of one answer entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Answered,
    /// Nothing cleared the confidence floor.
    Unanswered,
    /// Marks were found but do not form a valid entry (decimal grammar).
    Malformed,
}

/// One multiple-choice question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceAnswer {
    pub question: u32,
    pub option: Option<char>,
    pub status: EntryStatus,
    pub confidence: f32,
    /// The runner-up also cleared the floor within the ambiguity margin.
    pub ambiguous: bool,
    /// Some of the cells were aligned with the uniform fallback.
    pub degraded: bool,
}

/// One true/false sub-part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrueFalseAnswer {
    /// Cell number, 1-8.
    pub cell: u32,
    /// Sub-part letter, a-d.
    pub sub_part: char,
    pub value: Option<bool>,
    pub status: EntryStatus,
    pub confidence: f32,
    pub ambiguous: bool,
    pub degraded: bool,
}

/// One decimal-entry question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericAnswer {
    pub question: u32,
    pub value: Option<f64>,
    /// Marked symbols in position order, as printed on the sheet (`-1,5`).
    pub text: String,
    pub status: EntryStatus,
    /// Weakest confidence among the selected symbols.
    pub confidence: f32,
    pub ambiguous: bool,
    pub degraded: bool,
}

/// Ordered answers for one sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "entries", rename_all = "snake_case")]
pub enum AnswerSet {
    MultipleChoice(Vec<ChoiceAnswer>),
    TrueFalse(Vec<TrueFalseAnswer>),
    Numeric(Vec<NumericAnswer>),
}

impl AnswerSet {
    pub fn len(&self) -> usize {
        match self {
            AnswerSet::MultipleChoice(entries) => entries.len(),
            AnswerSet::TrueFalse(entries) => entries.len(),
            AnswerSet::Numeric(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries that ended without an accepted answer.
    pub fn unanswered(&self) -> usize {
        let statuses: Vec<EntryStatus> = match self {
            AnswerSet::MultipleChoice(entries) => entries.iter().map(|e| e.status).collect(),
            AnswerSet::TrueFalse(entries) => entries.iter().map(|e| e.status).collect(),
            AnswerSet::Numeric(entries) => entries.iter().map(|e| e.status).collect(),
        };
        statuses
            .into_iter()
            .filter(|s| *s != EntryStatus::Answered)
            .count()
    }
}

/// Where a region was found and what it was resampled to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSummary {
    pub index: usize,
    /// Corners in source pixels: top-left, top-right, bottom-right, bottom-left.
    pub corners: [[f32; 2]; 4],
    pub area: f32,
    /// Rectified size after rotation.
    pub width: u32,
    pub height: u32,
}

/// Everything the grader reports for one sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetReport {
    pub layout: Layout,
    /// SHA-256 of the decoded source pixels.
    pub source_digest: String,
    pub source_width: u32,
    pub source_height: u32,
    pub regions: Vec<RegionSummary>,
    pub answers: AnswerSet,
    pub warnings: Vec<QualityWarning>,
}
