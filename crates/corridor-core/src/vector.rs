//! Preprocessed criterion vectors as handed over by the preprocessor.

use crate::tiling::ProjectAreaGrid;
use geo::{Coord, CoordsIter, Geometry, Rect};
use std::collections::BTreeMap;
use tracing::warn;

/// One `(geometry, suitability_value)` record.
#[derive(Debug, Clone, PartialEq)]
pub struct SuitabilityFeature {
    pub geometry: Geometry<f64>,
    pub value: i64,
}

impl SuitabilityFeature {
    pub fn new(geometry: impl Into<Geometry<f64>>, value: i64) -> Self {
        Self {
            geometry: geometry.into(),
            value,
        }
    }
}

/// Per-criterion records keyed by criterion name. A missing or empty entry
/// means the criterion is skipped.
pub type ProcessedLayers = BTreeMap<String, Vec<SuitabilityFeature>>;

/// A criterion's records with the tiles each one touches.
#[derive(Debug, Clone)]
pub struct ProcessedVector<'a> {
    pub criterion: String,
    pub features: &'a [SuitabilityFeature],
    /// `tile_index[tile_id]` lists indices into `features`.
    tile_index: Vec<Vec<usize>>,
}

impl<'a> ProcessedVector<'a> {
    /// Tag every feature with the tiles its bounding box, grown by `buffer`,
    /// intersects.
    ///
    /// The box is taken over finite coordinates only, so a feature with a
    /// stray NaN still lands in (and later fails) the tiles it reaches.
    pub fn tag(
        criterion: impl Into<String>,
        features: &'a [SuitabilityFeature],
        buffer: f64,
        grid: &ProjectAreaGrid,
    ) -> Self {
        let criterion = criterion.into();
        let mut tile_index = vec![Vec::new(); grid.tiles().len()];
        for (i, feature) in features.iter().enumerate() {
            let Some(rect) = finite_bounds(&feature.geometry, buffer) else {
                warn!(criterion = %criterion, feature = i, "feature has no finite coordinates, dropped");
                continue;
            };
            for tile_id in grid.tiles_intersecting(&rect) {
                tile_index[tile_id].push(i);
            }
        }
        Self {
            criterion,
            features,
            tile_index,
        }
    }

    pub fn features_in_tile(&self, tile_id: usize) -> Vec<&'a SuitabilityFeature> {
        let features = self.features;
        self.tile_index
            .get(tile_id)
            .map(|members| members.iter().map(|&i| &features[i]).collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

fn finite_bounds(geometry: &Geometry<f64>, buffer: f64) -> Option<Rect<f64>> {
    let mut coords = geometry
        .coords_iter()
        .filter(|c| c.x.is_finite() && c.y.is_finite());
    let first = coords.next()?;
    let (min, max) = coords.fold((first, first), |(min, max), c| {
        (
            Coord {
                x: min.x.min(c.x),
                y: min.y.min(c.y),
            },
            Coord {
                x: max.x.max(c.x),
                y: max.y.max(c.y),
            },
        )
    });
    Some(Rect::new(
        Coord {
            x: min.x - buffer,
            y: min.y - buffer,
        },
        Coord {
            x: max.x + buffer,
            y: max.y + buffer,
        },
    ))
}
