//! Layout checks: every image should have a mask next door.

use crate::types::{LayoutSummary, TileSample, TileSummary};
use std::collections::BTreeMap;

pub fn summarize_layout(samples: &[TileSample]) -> LayoutSummary {
    let mut by_tile: BTreeMap<u32, TileSummary> = BTreeMap::new();
    let mut summary = LayoutSummary::default();
    for sample in samples {
        let entry = by_tile.entry(sample.tile).or_insert_with(|| TileSummary {
            tile: sample.tile,
            ..Default::default()
        });
        entry.images += 1;
        summary.total_images += 1;
        if !sample.mask.is_file() {
            entry.missing_masks += 1;
            summary.missing_masks.push(sample.mask.clone());
        }
    }
    summary.tiles = by_tile.into_values().collect();
    summary
}
