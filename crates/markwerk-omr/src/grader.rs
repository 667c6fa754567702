// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Sheet grading: runs one image through detection, rectification,
// alignment, sampling, scoring and answer assembly.

use std::sync::Arc;

use image::DynamicImage;
use markwerk_core::config::GradingConfig;
use markwerk_core::error::Result;
use markwerk_core::human_errors::describe_warning;
use markwerk_core::{Layout, RegionSummary, SheetReport};
use rayon::prelude::*;
use tracing::{info, instrument, warn};

use crate::align::{AnchorLocator, CellGrid, GridAligner};
use crate::debug::{DebugSink, NullSink, emit, grid_overlay, region_overlay};
use crate::layout::LayoutProfile;
use crate::preprocess::Preprocessor;
use crate::rectify::{PerspectiveRectifier, RectifiedGrid};
use crate::region::RegionDetector;
use crate::sample::CellSampler;
use crate::score::{BubbleScorer, ScoredRegion};
use crate::source::SourceImage;

/// Per-region pipeline output.
struct RegionResult {
    grid: RectifiedGrid,
    cells: CellGrid,
    scored: ScoredRegion,
}

/// Grades answer-sheet images. Holds no per-sheet state; share it freely.
#[derive(Debug, Clone)]
pub struct SheetGrader {
    config: GradingConfig,
    preprocessor: Preprocessor,
    detector: RegionDetector,
    aligner: GridAligner,
    sampler: CellSampler,
    scorer: BubbleScorer,
}

impl SheetGrader {
    /// Validate `config` and build the pipeline stages from it.
    pub fn new(config: GradingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            preprocessor: Preprocessor::new(config.preprocess.clone()),
            detector: RegionDetector::new(config.detection.clone()),
            aligner: GridAligner::from_config(&config.alignment),
            sampler: CellSampler::new(&config.sampling),
            scorer: BubbleScorer::new(config.scoring.clone(), config.alignment.degraded_penalty),
            config,
        })
    }

    /// Swap the grid-line anchor strategy.
    pub fn with_locator(mut self, locator: Arc<dyn AnchorLocator>) -> Self {
        self.aligner = GridAligner::new(locator, self.config.alignment.max_correction);
        self
    }

    pub fn config(&self) -> &GradingConfig {
        &self.config
    }

    pub fn grade(&self, source: &SourceImage, layout: Layout) -> Result<SheetReport> {
        self.grade_with_sink(source, layout, &NullSink)
    }

    /// Grade `source` as a `layout` sheet, handing intermediate images to
    /// `sink`.
    #[instrument(skip_all, fields(layout = %layout, width = source.width(), height = source.height()))]
    pub fn grade_with_sink(&self, source: &SourceImage, layout: Layout, sink: &dyn DebugSink) -> Result<SheetReport> {
        let gray = source.to_gray();
        self.preprocessor.validate(&gray)?;

        let mask = self.preprocessor.detection_mask(&gray);
        let profile = LayoutProfile::from_config(&self.config, layout);
        let quads = self.detector.detect(&mask, &profile)?;
        if sink.is_enabled() {
            emit(sink, "detection_mask", DynamicImage::ImageLuma8(mask));
            emit(sink, "regions", DynamicImage::ImageRgb8(region_overlay(&gray, &quads)));
        }

        let (width, height) = profile.canonical_size();
        let rectifier = PerspectiveRectifier::new(width, height);

        let results = quads
            .par_iter()
            .enumerate()
            .map(|(index, quad)| {
                let grid = rectifier.rectify(&gray, quad, index, &self.preprocessor)?;
                let cells = self.aligner.align(&grid, &profile.geometry);
                let patches = self.sampler.sample(&grid, &cells);
                let scored = self
                    .scorer
                    .score(index, cells.row_count(), cells.column_count(), &patches);
                Ok(RegionResult { grid, cells, scored })
            })
            .collect::<Result<Vec<RegionResult>>>()?;

        if sink.is_enabled() {
            for result in &results {
                let overlay = grid_overlay(
                    &result.grid,
                    &result.cells,
                    &result.scored,
                    self.config.scoring.confidence_floor,
                );
                emit(sink, &format!("region_{:02}", result.grid.index), DynamicImage::ImageRgb8(overlay));
            }
        }

        let warnings: Vec<_> = results
            .iter()
            .flat_map(|r| r.cells.warnings.iter().cloned())
            .collect();
        for warning in &warnings {
            warn!(warning = %describe_warning(warning), "Alignment degraded");
        }

        let scored: Vec<ScoredRegion> = results.iter().map(|r| r.scored.clone()).collect();
        let answers = profile.assembler(&self.config).assemble(&scored);

        let regions = results
            .iter()
            .map(|r| RegionSummary {
                index: r.grid.index,
                corners: r.grid.quad.to_array(),
                area: r.grid.quad.area(),
                width: r.grid.width(),
                height: r.grid.height(),
            })
            .collect();

        info!(
            entries = answers.len(),
            unanswered = answers.unanswered(),
            warnings = warnings.len(),
            "Sheet graded"
        );

        Ok(SheetReport {
            layout,
            source_digest: source.digest(),
            source_width: source.width(),
            source_height: source.height(),
            regions,
            answers,
            warnings,
        })
    }
}
