// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Layout profiles: the closed set of per-section parameters (topology, grid
// geometry, region ordering, detection band) fed into the shared pipeline.

use markwerk_core::config::{AxisConfig, GradingConfig, RegionConfig};
use markwerk_core::{GridTopology, Layout};

use crate::assemble::{
    AnswerAssembler, MultipleChoiceAssembler, NumericAssembler, SelectionRules, TrueFalseAssembler,
};

/// How detected regions are put into question order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionOrder {
    /// Stacked blocks: by top edge, then left edge.
    TopToBottom,
    /// Gridded blocks: rows top-down, left-to-right inside a row.
    RowMajor,
    /// Exactly one block.
    Single,
}

/// Where the answer grid sits inside a rectified region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridGeometry {
    pub rows: AxisConfig,
    pub columns: AxisConfig,
    pub row_cells: usize,
    pub column_cells: usize,
    /// Align rows separately inside every column instead of once for the
    /// whole region.
    pub rows_per_column: bool,
}

/// Everything the shared pipeline needs to know about one layout.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutProfile {
    pub layout: Layout,
    pub topology: GridTopology,
    pub region: RegionConfig,
    pub geometry: GridGeometry,
    pub order: RegionOrder,
}

impl LayoutProfile {
    pub fn from_config(config: &GradingConfig, layout: Layout) -> Self {
        let topology = config.topology(layout);
        let (rows, columns) = config.axes(layout);
        let order = match layout {
            Layout::P1 => RegionOrder::TopToBottom,
            Layout::P2 => RegionOrder::RowMajor,
            Layout::P3 => RegionOrder::Single,
        };
        Self {
            layout,
            topology,
            region: config.region(layout).clone(),
            geometry: GridGeometry {
                rows,
                columns,
                row_cells: topology.rows,
                column_cells: topology.columns,
                rows_per_column: layout == Layout::P3,
            },
            order,
        }
    }

    /// Size of the rectified region once rotated upright.
    pub fn canonical_size(&self) -> (u32, u32) {
        (self.region.canonical_width, self.region.canonical_height)
    }

    /// The answer rules for this layout.
    pub fn assembler(&self, config: &GradingConfig) -> Box<dyn AnswerAssembler> {
        let rules = SelectionRules::from_config(&config.scoring);
        match self.layout {
            Layout::P1 => Box::new(MultipleChoiceAssembler::new(config.p1.column_remap.clone(), rules)),
            Layout::P2 => Box::new(TrueFalseAssembler::new(rules)),
            Layout::P3 => Box::new(NumericAssembler::new(config.p3.positions, rules)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_follow_layout_topology() {
        let config = GradingConfig::default();
        let p1 = LayoutProfile::from_config(&config, Layout::P1);
        assert_eq!(p1.order, RegionOrder::TopToBottom);
        assert_eq!((p1.geometry.row_cells, p1.geometry.column_cells), (10, 4));
        assert!(!p1.geometry.rows_per_column);

        let p2 = LayoutProfile::from_config(&config, Layout::P2);
        assert_eq!(p2.order, RegionOrder::RowMajor);
        assert_eq!(p2.geometry.rows.band_size, 0, "true/false cells use equal spacing");

        let p3 = LayoutProfile::from_config(&config, Layout::P3);
        assert!(p3.geometry.rows_per_column);
        assert_eq!(p3.geometry.column_cells, 32);
        assert_eq!(p3.canonical_size(), (1000, 420));
    }

    #[test]
    fn assembler_matches_layout() {
        let config = GradingConfig::default();
        for layout in Layout::ALL {
            let profile = LayoutProfile::from_config(&config, layout);
            assert_eq!(profile.assembler(&config).layout(), layout);
        }
    }
}
