// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Markwerk.

use thiserror::Error;

use crate::types::Layout;

/// Top-level error type for all Markwerk operations.
///
/// Only fatal conditions live here. Degraded alignment and low-confidence
/// entries are reported inside the `SheetReport`.
#[derive(Debug, Error)]
pub enum MarkwerkError {
    // -- Input errors --
    #[error("image decode failed: {0}")]
    ImageDecode(String),

    #[error("preprocessing failed: {reason}")]
    Preprocess { reason: String },

    // -- Geometry errors --
    #[error("{layout} sheet needs {required} regions, found {found}")]
    RegionNotFound {
        layout: Layout,
        found: usize,
        required: usize,
    },

    #[error("malformed quadrilateral{}: {reason}", region_suffix(.region))]
    MalformedQuadrilateral {
        region: Option<usize>,
        reason: String,
    },

    // -- Configuration --
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // -- Storage / serialization --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn region_suffix(region: &Option<usize>) -> String {
    match region {
        Some(index) => format!(" for region {index}"),
        None => String::new(),
    }
}

/// Pipeline stage an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Decode,
    Preprocess,
    RegionDetection,
    Rectification,
    Configuration,
    Io,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Decode => "decode",
            Stage::Preprocess => "preprocess",
            Stage::RegionDetection => "region detection",
            Stage::Rectification => "rectification",
            Stage::Configuration => "configuration",
            Stage::Io => "io",
        };
        f.write_str(name)
    }
}

impl MarkwerkError {
    pub fn stage(&self) -> Stage {
        match self {
            MarkwerkError::ImageDecode(_) => Stage::Decode,
            MarkwerkError::Preprocess { .. } => Stage::Preprocess,
            MarkwerkError::RegionNotFound { .. } => Stage::RegionDetection,
            MarkwerkError::MalformedQuadrilateral { .. } => Stage::Rectification,
            MarkwerkError::InvalidConfig(_) => Stage::Configuration,
            MarkwerkError::Io(_) | MarkwerkError::Serialization(_) => Stage::Io,
        }
    }

    /// True when the image itself is the problem (bad photo, wrong sheet),
    /// false for configuration and system faults.
    pub fn is_input_problem(&self) -> bool {
        matches!(
            self,
            MarkwerkError::ImageDecode(_)
                | MarkwerkError::Preprocess { .. }
                | MarkwerkError::RegionNotFound { .. }
                | MarkwerkError::MalformedQuadrilateral { .. }
        )
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, MarkwerkError>;
