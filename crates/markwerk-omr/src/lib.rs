// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// markwerk-omr: Optical mark recognition for Markwerk answer sheets.
//
// Finds the answer blocks on a photographed or scanned sheet, rectifies them,
// aligns the printed grid against print drift, scores every bubble and
// assembles multiple-choice, true/false and decimal-entry answers.

pub mod align;
pub mod assemble;
pub mod debug;
pub mod geometry;
pub mod grader;
pub mod layout;
pub mod preprocess;
pub mod rectify;
pub mod region;
pub mod sample;
pub mod score;
pub mod source;
pub mod synthetic;

// Re-export the primary structs so callers can use `markwerk_omr::SheetGrader` etc.
pub use align::{AnchorLocator, GridAligner, ProjectionRidgeLocator, UniformLocator};
pub use assemble::AnswerAssembler;
pub use debug::{DebugSink, DirectorySink, NullSink};
pub use grader::SheetGrader;
pub use layout::LayoutProfile;
pub use source::SourceImage;
pub use synthetic::{AnswerKey, SheetRenderer};
