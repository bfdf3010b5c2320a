//! Group aggregation of per-criterion tile rasters into a composite.
//!
//! Cells are `Option<i32>`; `None` is no-data. Over that type:
//! - group A takes the maximum of present values (`None` if none present),
//! - group B sums present values (`None` acts as 0),
//! - any present value in a group C raster excludes the cell.
//!
//! The composite is `clamp(A + B, final_lower, final_upper)` with C
//! exclusions and cells outside the project area set to `None`. Work is
//! split into sub-blocks that run in parallel and are stitched back together
//! once every block of the tile is done.

use crate::cancel::CancelToken;
use crate::error::{AggregationError, Result};
use crate::grid::{Grid, Raster, Window};
use crate::preset::{Bounds, Group};
use rayon::prelude::*;
use tracing::trace;

/// One criterion's raster for a tile.
#[derive(Debug, Clone)]
pub struct AggregationLayer {
    pub name: String,
    pub raster: Raster,
    pub group: Group,
}

impl AggregationLayer {
    pub fn new(name: impl Into<String>, raster: Raster, group: Group) -> Self {
        Self {
            name: name.into(),
            raster,
            group,
        }
    }

    /// Build a layer from an untyped group tag.
    pub fn tagged(name: impl Into<String>, raster: Raster, tag: &str) -> Result<Self, AggregationError> {
        Ok(Self::new(name, raster, tag.parse()?))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AggregationSettings {
    pub final_bounds: Bounds,
    pub block_size: usize,
    /// Value for in-area cells without any A or B contribution.
    pub fill_value: Option<i32>,
}

/// Partial composite for one sub-block of a tile.
#[derive(Debug, Clone)]
pub struct RasterBlock {
    pub window: Window,
    pub cells: Vec<Option<i32>>,
}

pub fn aggregate_tile(
    tile_id: usize,
    layers: &[AggregationLayer],
    mask: Option<&Grid<bool>>,
    settings: &AggregationSettings,
    cancel: &CancelToken,
) -> Result<Raster> {
    if !layers.iter().any(|l| matches!(l.group, Group::A | Group::B)) {
        return Err(AggregationError::InvalidSuitabilityRasterInput.into());
    }
    let shape = layers[0].raster.shape();
    for layer in layers {
        if layer.raster.shape() != shape {
            return Err(AggregationError::ShapeMismatch {
                name: layer.name.clone(),
                got: layer.raster.shape(),
                expected: shape,
            }
            .into());
        }
    }
    if let Some(mask) = mask {
        if mask.shape() != shape {
            return Err(AggregationError::ShapeMismatch {
                name: "project area mask".to_string(),
                got: mask.shape(),
                expected: shape,
            }
            .into());
        }
    }

    let windows = Window::blocks(shape.0, shape.1, settings.block_size);
    let blocks = windows
        .into_par_iter()
        .map(|window| {
            cancel.check()?;
            Ok(aggregate_block(window, layers, mask, settings))
        })
        .collect::<Result<Vec<RasterBlock>>>()?;

    let mut composite = Raster::filled(shape.0, shape.1, None);
    for block in &blocks {
        composite.write_window(&block.window, &block.cells);
    }
    trace!(tile = tile_id, blocks = blocks.len(), "tile blocks merged");
    Ok(composite)
}

fn aggregate_block(
    window: Window,
    layers: &[AggregationLayer],
    mask: Option<&Grid<bool>>,
    settings: &AggregationSettings,
) -> RasterBlock {
    let n = window.len();
    let mut best: Vec<Option<i32>> = vec![None; n];
    let mut sum: Vec<Option<i64>> = vec![None; n];
    let mut excluded = vec![false; n];

    for layer in layers {
        let cells = layer.raster.window(&window);
        match layer.group {
            Group::A => {
                for (acc, cell) in best.iter_mut().zip(&cells) {
                    *acc = max_present(*acc, *cell);
                }
            }
            Group::B => {
                for (acc, cell) in sum.iter_mut().zip(&cells) {
                    *acc = sum_present(*acc, *cell);
                }
            }
            Group::C => {
                for (flag, cell) in excluded.iter_mut().zip(&cells) {
                    *flag |= cell.is_some();
                }
            }
        }
    }

    let inside = mask.map(|m| m.window(&window));
    let bounds = settings.final_bounds;
    let cells = (0..n)
        .map(|i| {
            let in_area = inside.as_ref().map_or(true, |m| m[i]);
            if !in_area || excluded[i] {
                return None;
            }
            match (best[i], sum[i]) {
                (None, None) => settings.fill_value,
                (a, b) => Some(bounds.clamp(a.unwrap_or(0) as i64 + b.unwrap_or(0))),
            }
        })
        .collect();

    RasterBlock {
        window,
        cells,
    }
}

fn max_present(acc: Option<i32>, cell: Option<i32>) -> Option<i32> {
    match (acc, cell) {
        (Some(a), Some(c)) => Some(a.max(c)),
        (a, c) => a.or(c),
    }
}

fn sum_present(acc: Option<i64>, cell: Option<i32>) -> Option<i64> {
    match (acc, cell) {
        (acc, None) => acc,
        (acc, Some(c)) => Some(acc.unwrap_or(0) + c as i64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn raster(cells: &[Option<i32>]) -> Raster {
        Raster::from_vec(2, 2, cells.to_vec()).unwrap()
    }

    fn settings(lower: i32, upper: i32) -> AggregationSettings {
        AggregationSettings {
            final_bounds: Bounds::new(lower, upper),
            block_size: 1,
            fill_value: None,
        }
    }

    fn run(layers: &[AggregationLayer], s: &AggregationSettings) -> Raster {
        aggregate_tile(0, layers, None, s, &CancelToken::new()).unwrap()
    }

    #[test]
    fn group_a_takes_max_and_all_absent_is_no_data() {
        let layers = vec![
            AggregationLayer::new("a1", raster(&[Some(5), None, Some(9), None]), Group::A),
            AggregationLayer::new("a2", raster(&[Some(7), Some(3), Some(2), None]), Group::A),
        ];
        let out = run(&layers, &settings(0, 100));
        assert_eq!(out.cells(), &[Some(7), Some(3), Some(9), None]);
    }

    #[test]
    fn group_b_sums_present_values() {
        let layers = vec![
            AggregationLayer::new("b1", raster(&[Some(5), None, Some(1), None]), Group::B),
            AggregationLayer::new("b2", raster(&[Some(7), Some(3), None, None]), Group::B),
        ];
        let out = run(&layers, &settings(0, 100));
        assert_eq!(out.cells(), &[Some(12), Some(3), Some(1), None]);
    }

    #[test]
    fn group_c_overrides_any_a_or_b_value() {
        let layers = vec![
            AggregationLayer::new("a", raster(&[Some(50); 4]), Group::A),
            AggregationLayer::new("b", raster(&[Some(10); 4]), Group::B),
            AggregationLayer::new("c", raster(&[None, Some(1), None, Some(-5)]), Group::C),
        ];
        let out = run(&layers, &settings(0, 100));
        assert_eq!(out.cells(), &[Some(60), None, Some(60), None]);
    }

    #[test]
    fn a_plus_b_is_clipped_to_final_bounds() {
        let layers = vec![
            AggregationLayer::new("a", raster(&[Some(100), Some(-40), None, Some(3)]), Group::A),
            AggregationLayer::new("b", raster(&[Some(20), None, Some(-2), None]), Group::B),
        ];
        let out = run(&layers, &settings(1, 100));
        assert_eq!(out.cells(), &[Some(100), Some(1), Some(1), Some(3)]);
    }

    #[test]
    fn fill_value_applies_only_to_uncovered_cells() {
        let layers = vec![AggregationLayer::new(
            "a",
            raster(&[Some(4), None, None, None]),
            Group::A,
        )];
        let s = AggregationSettings {
            fill_value: Some(50),
            ..settings(1, 100)
        };
        let mask = Grid::from_vec(2, 2, vec![true, true, true, false]).unwrap();
        let out = aggregate_tile(0, &layers, Some(&mask), &s, &CancelToken::new()).unwrap();
        assert_eq!(out.cells(), &[Some(4), Some(50), Some(50), None]);
    }

    #[test]
    fn only_exclusions_is_invalid_input() {
        let layers = vec![AggregationLayer::new("c", raster(&[None; 4]), Group::C)];
        let err = aggregate_tile(0, &layers, None, &settings(0, 1), &CancelToken::new()).unwrap_err();
        assert!(matches!(
            err,
            Error::Aggregation(AggregationError::InvalidSuitabilityRasterInput)
        ));
    }

    #[test]
    fn unknown_group_tag_is_rejected() {
        let err = AggregationLayer::tagged("x", raster(&[None; 4]), "Z").unwrap_err();
        assert!(matches!(err, AggregationError::InvalidGroupValue(ref t) if t == "Z"));
    }

    #[test]
    fn cancelled_tile_reports_cancellation() {
        let layers = vec![AggregationLayer::new("a", raster(&[Some(1); 4]), Group::A)];
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = aggregate_tile(0, &layers, None, &settings(0, 10), &cancel).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn composite_stays_in_range_for_arbitrary_inputs() {
        fn random_raster(rng: &mut StdRng) -> Raster {
            let cells = (0..64 * 64)
                .map(|_| {
                    rng.random_bool(0.7)
                        .then(|| rng.random_range(-100_000..100_000))
                })
                .collect();
            Raster::from_vec(64, 64, cells).unwrap()
        }

        let mut rng = StdRng::seed_from_u64(7);
        let layers = vec![
            AggregationLayer::new("a1", random_raster(&mut rng), Group::A),
            AggregationLayer::new("a2", random_raster(&mut rng), Group::A),
            AggregationLayer::new("b1", random_raster(&mut rng), Group::B),
            AggregationLayer::new("b2", random_raster(&mut rng), Group::B),
        ];
        let s = AggregationSettings {
            final_bounds: Bounds::new(1, 250),
            block_size: 16,
            fill_value: None,
        };
        let out = run(&layers, &s);
        assert!(out
            .cells()
            .iter()
            .flatten()
            .all(|v| (1..=250).contains(v)));
    }
}
