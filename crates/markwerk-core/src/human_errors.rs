// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable diagnoses for grading failures and quality warnings.
//
// Whoever submitted the sheet needs to know whether to retake the photo, use
// a different sheet, or report a fault. The severity drives that choice.

use crate::error::MarkwerkError;
use crate::types::{Axis, QualityWarning};

/// What the submitter should do about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The photo is unusable; a better capture of the same sheet will work.
    Retake,
    /// The image does not show the expected sheet section.
    WrongInput,
    /// Configuration or system fault; resubmitting will not help.
    Internal,
}

/// A diagnosis with a plain summary and an actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// One-line summary.
    pub message: String,
    /// What to try next.
    pub suggestion: String,
    /// Whether resubmitting a different image can succeed.
    pub retriable: bool,
    pub severity: Severity,
}

/// Convert a `MarkwerkError` into a diagnosis someone at a scanning desk can
/// act on.
pub fn diagnose(err: &MarkwerkError) -> HumanError {
    match err {
        MarkwerkError::ImageDecode(_) => HumanError {
            message: "The file could not be read as an image.".into(),
            suggestion: "Save the scan as JPEG or PNG and submit it again.".into(),
            retriable: true,
            severity: Severity::WrongInput,
        },

        MarkwerkError::Preprocess { reason } => HumanError {
            message: "The photo is too small, blank or washed out to grade.".into(),
            suggestion: format!(
                "Retake the photo in even light with the whole sheet in frame. ({reason})"
            ),
            retriable: true,
            severity: Severity::Retake,
        },

        MarkwerkError::RegionNotFound {
            layout,
            found,
            required,
        } => {
            if *found == 0 {
                HumanError {
                    message: format!("No answer blocks of section {layout} were found."),
                    suggestion: "Check that the right section was chosen and that the sheet is flat and fully visible.".into(),
                    retriable: true,
                    severity: Severity::WrongInput,
                }
            } else {
                HumanError {
                    message: format!(
                        "Only {found} of the {required} answer blocks of section {layout} were found."
                    ),
                    suggestion: "Make sure no block is covered, folded or cut off at the edge of the photo.".into(),
                    retriable: true,
                    severity: Severity::Retake,
                }
            }
        }

        MarkwerkError::MalformedQuadrilateral { .. } => HumanError {
            message: "An answer block is too distorted to straighten.".into(),
            suggestion: "Photograph the sheet from directly above rather than at an angle.".into(),
            retriable: true,
            severity: Severity::Retake,
        },

        MarkwerkError::InvalidConfig(detail) => HumanError {
            message: "The grading settings are invalid.".into(),
            suggestion: format!("Fix the configuration file and try again. ({detail})"),
            retriable: false,
            severity: Severity::Internal,
        },

        MarkwerkError::Io(io_err) => {
            if io_err.kind() == std::io::ErrorKind::NotFound {
                HumanError {
                    message: "The file couldn't be found.".into(),
                    suggestion: "Check the path and try again.".into(),
                    retriable: true,
                    severity: Severity::WrongInput,
                }
            } else {
                HumanError {
                    message: "A file could not be read or written.".into(),
                    suggestion: format!("Check permissions and free space. ({io_err})"),
                    retriable: false,
                    severity: Severity::Internal,
                }
            }
        }

        MarkwerkError::Serialization(_) => HumanError {
            message: "A settings or report file is not valid JSON.".into(),
            suggestion: "Regenerate the file with `markwerk config` and edit from there.".into(),
            retriable: false,
            severity: Severity::Internal,
        },
    }
}

/// One-line description of a quality warning for logs and CLI output.
pub fn describe_warning(warning: &QualityWarning) -> String {
    match warning {
        QualityWarning::AlignmentDegraded {
            region,
            axis,
            band,
            ladder,
        } => {
            let axis = match axis {
                Axis::Rows => "row",
                Axis::Columns => "column",
            };
            match ladder {
                Some(ladder) => format!(
                    "region {region}, ladder {ladder}: {axis} band {band} used uniform spacing; marks there are less certain"
                ),
                None => format!(
                    "region {region}: {axis} band {band} used uniform spacing; marks there are less certain"
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Layout;

    #[test]
    fn missing_blocks_ask_for_retake() {
        let diagnosis = diagnose(&MarkwerkError::RegionNotFound {
            layout: Layout::P1,
            found: 3,
            required: 4,
        });
        assert_eq!(diagnosis.severity, Severity::Retake);
        assert!(diagnosis.message.contains("3 of the 4"));
    }

    /// Zero blocks usually means the wrong section was selected.
    #[test]
    fn no_blocks_suggest_wrong_input() {
        let diagnosis = diagnose(&MarkwerkError::RegionNotFound {
            layout: Layout::P3,
            found: 0,
            required: 1,
        });
        assert_eq!(diagnosis.severity, Severity::WrongInput);
    }

    #[test]
    fn config_faults_are_internal() {
        let diagnosis = diagnose(&MarkwerkError::InvalidConfig("bad".into()));
        assert_eq!(diagnosis.severity, Severity::Internal);
        assert!(!diagnosis.retriable);
    }

    #[test]
    fn io_not_found_is_wrong_input() {
        let err = MarkwerkError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(diagnose(&err).severity, Severity::WrongInput);
    }

    #[test]
    fn warning_description_names_ladder() {
        let text = describe_warning(&QualityWarning::AlignmentDegraded {
            region: 0,
            axis: Axis::Rows,
            band: 2,
            ladder: Some(7),
        });
        assert!(text.starts_with("region 0, ladder 7: row band 2"));
    }
}
