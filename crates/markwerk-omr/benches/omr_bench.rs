// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the markwerk-omr crate: full-sheet grading of
// rendered reference sheets, plus the region preprocessing pass on its own.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use image::{DynamicImage, imageops};

use markwerk_core::{GradingConfig, Layout};
use markwerk_omr::preprocess::Preprocessor;
use markwerk_omr::{AnswerKey, SheetGrader, SheetRenderer, SourceImage};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn reference_sheet(layout: Layout) -> SourceImage {
    let sheet = SheetRenderer::new(&GradingConfig::default(), layout)
        .render(&AnswerKey::sample(layout))
        .expect("reference sheet renders");
    SourceImage::from_dynamic(DynamicImage::ImageLuma8(sheet))
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

/// Grade one reference sheet of every layout end to end.
fn bench_grade_sheet(c: &mut Criterion) {
    let grader = SheetGrader::new(GradingConfig::default()).expect("default config is valid");
    for layout in Layout::ALL {
        let source = reference_sheet(layout);
        c.bench_function(&format!("grade_sheet ({layout})"), |b| {
            b.iter(|| black_box(grader.grade(black_box(&source), layout).expect("grades")));
        });
    }
}

/// CLAHE, bilateral smoothing and binarization of the decimal-entry block,
/// the largest region any layout produces, cut from a rendered sheet.
fn bench_region_preprocess(c: &mut Criterion) {
    let config = GradingConfig::default();
    let renderer = SheetRenderer::new(&config, Layout::P3);
    let sheet = renderer
        .render(&AnswerKey::sample(Layout::P3))
        .expect("reference sheet renders");
    let (x, y) = renderer.block_origin(0);
    let (width, height) = renderer.block_size();
    let block = imageops::crop_imm(&sheet, x, y, width, height).to_image();
    let preprocessor = Preprocessor::new(config.preprocess);

    c.bench_function(&format!("region_preprocess ({width}x{height})"), |b| {
        b.iter(|| black_box(preprocessor.process(black_box(&block))));
    });
}

criterion_group!(benches, bench_grade_sheet, bench_region_preprocess);
criterion_main!(benches);
