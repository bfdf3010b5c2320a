//! Least-cost path over a cost raster.
//!
//! Cells are 8-connected. Moving between adjacent cells costs the mean of
//! both cell costs times the step length (1 or sqrt 2). Missing cells, and
//! cells with a negative cost, are impassable. Each pair of consecutive
//! waypoints is an independent A* search; the heuristic is the octile
//! distance scaled by the cheapest cell, so it degrades to Dijkstra on
//! rasters containing zero-cost cells.

use crate::cancel::CancelToken;
use crate::error::{Error, GeometryError, Result, RoutingError};
use crate::geotransform::RasterIndex;
use crate::grid::{CellIndex, Grid, Raster};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::f64::consts::SQRT_2;
use std::time::{Duration, Instant};
use tracing::debug;

/// Frontier pops between cancellation and budget checks.
const CHECK_INTERVAL: usize = 1024;

const NEIGHBOURS: [(i64, i64, f64); 8] = [
    (-1, -1, SQRT_2),
    (-1, 0, 1.0),
    (-1, 1, SQRT_2),
    (0, -1, 1.0),
    (0, 1, 1.0),
    (1, -1, SQRT_2),
    (1, 0, 1.0),
    (1, 1, SQRT_2),
];

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SolverOptions {
    /// Wall-clock limit per segment search. `None` means unbounded.
    pub segment_budget: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct PathResult {
    pub cells: Vec<CellIndex>,
    pub segment_costs: Vec<f64>,
    /// `true` on every cell the path visits.
    pub mask: Grid<bool>,
}

impl PathResult {
    pub fn total_cost(&self) -> f64 {
        self.segment_costs.iter().sum()
    }
}

#[derive(Debug, Clone, Copy)]
struct FloatOrd(f64);

impl PartialEq for FloatOrd {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for FloatOrd {}

impl PartialOrd for FloatOrd {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloatOrd {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenNode {
    offset: usize,
    g_score: FloatOrd,
    f_score: FloatOrd,
}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.f_score
            .cmp(&other.f_score)
            .then_with(|| self.g_score.cmp(&other.g_score))
            .then_with(|| self.offset.cmp(&other.offset))
    }
}

/// Solve the route through `waypoints` in order.
pub fn least_cost_path(
    raster: &Raster,
    waypoints: &[RasterIndex],
    options: &SolverOptions,
    cancel: &CancelToken,
) -> Result<PathResult> {
    if waypoints.len() < 2 {
        return Err(GeometryError::TooFewRoutePoints(waypoints.len()).into());
    }
    let (rows, cols) = raster.shape();
    let stops = waypoints
        .iter()
        .enumerate()
        .map(|(waypoint, w)| {
            if raster.contains(w.row, w.col) {
                Ok(CellIndex::new(w.row as usize, w.col as usize))
            } else {
                Err(RoutingError::WaypointOutOfBounds {
                    waypoint,
                    row: w.row,
                    col: w.col,
                    rows,
                    cols,
                })
            }
        })
        .collect::<Result<Vec<_>, RoutingError>>()?;

    let min_cost = raster
        .cells()
        .iter()
        .flatten()
        .copied()
        .filter(|v| *v >= 0)
        .min()
        .map_or(0.0, f64::from);

    let segments = stops
        .par_windows(2)
        .enumerate()
        .map(|(segment, pair)| {
            let (path, cost) = solve_segment(raster, segment, pair[0], pair[1], min_cost, options, cancel)?;
            debug!(segment, cost, cells = path.len(), "segment solved");
            Ok((path, cost))
        })
        .collect::<Vec<Result<_>>>()
        .into_iter()
        .collect::<Result<Vec<_>>>()?;

    let capacity = stops.windows(2).map(|p| p[0].manhattan(&p[1])).sum::<usize>() + 1;
    let mut cells = Vec::with_capacity(capacity);
    let mut segment_costs = Vec::with_capacity(segments.len());
    for (path, cost) in segments {
        // Consecutive segments share their seam waypoint.
        let skip = usize::from(!cells.is_empty());
        cells.extend_from_slice(&path[skip..]);
        segment_costs.push(cost);
    }

    let mut mask = Grid::filled(rows, cols, false);
    for cell in &cells {
        mask.set(cell.row, cell.col, true);
    }

    Ok(PathResult {
        cells,
        segment_costs,
        mask,
    })
}

fn cell_cost(raster: &Raster, offset: usize) -> Option<f64> {
    raster.cells()[offset].filter(|v| *v >= 0).map(f64::from)
}

fn octile(a: CellIndex, b: CellIndex) -> f64 {
    let dr = a.row.abs_diff(b.row) as f64;
    let dc = a.col.abs_diff(b.col) as f64;
    dr.max(dc) - dr.min(dc) + SQRT_2 * dr.min(dc)
}

fn solve_segment(
    raster: &Raster,
    segment: usize,
    from: CellIndex,
    to: CellIndex,
    min_cost: f64,
    options: &SolverOptions,
    cancel: &CancelToken,
) -> Result<(Vec<CellIndex>, f64)> {
    let unreachable = || -> Error {
        RoutingError::UnreachableWaypoint {
            segment,
            from: (from.row, from.col),
            to: (to.row, to.col),
        }
        .into()
    };

    let start = raster.offset(from);
    let goal = raster.offset(to);
    if cell_cost(raster, start).is_none() || cell_cost(raster, goal).is_none() {
        return Err(unreachable());
    }

    let n = raster.len();
    let mut g_score = vec![f64::INFINITY; n];
    let mut came_from = vec![usize::MAX; n];
    let mut closed = vec![false; n];
    g_score[start] = 0.0;

    let mut open_set: BinaryHeap<Reverse<OpenNode>> = BinaryHeap::new();
    open_set.push(Reverse(OpenNode {
        offset: start,
        g_score: FloatOrd(0.0),
        f_score: FloatOrd(octile(from, to) * min_cost),
    }));

    let started = Instant::now();
    let mut pops = 0usize;
    while let Some(Reverse(current)) = open_set.pop() {
        if pops % CHECK_INTERVAL == 0 {
            cancel.check()?;
            if let Some(budget) = options.segment_budget {
                if started.elapsed() >= budget {
                    return Err(RoutingError::SegmentBudgetExceeded { segment, budget }.into());
                }
            }
        }
        pops += 1;

        let offset = current.offset;
        if closed[offset] || current.g_score.0 > g_score[offset] {
            continue;
        }
        if offset == goal {
            break;
        }
        closed[offset] = true;

        let Some(here) = cell_cost(raster, offset) else {
            continue;
        };
        let cell = raster.cell_at(offset);
        for (dr, dc, step) in NEIGHBOURS {
            let (row, col) = (cell.row as i64 + dr, cell.col as i64 + dc);
            if !raster.contains(row, col) {
                continue;
            }
            let next = CellIndex::new(row as usize, col as usize);
            let next_offset = raster.offset(next);
            if closed[next_offset] {
                continue;
            }
            let Some(there) = cell_cost(raster, next_offset) else {
                continue;
            };
            let tentative_g = g_score[offset] + (here + there) / 2.0 * step;
            if tentative_g < g_score[next_offset] {
                g_score[next_offset] = tentative_g;
                came_from[next_offset] = offset;
                open_set.push(Reverse(OpenNode {
                    offset: next_offset,
                    g_score: FloatOrd(tentative_g),
                    f_score: FloatOrd(tentative_g + octile(next, to) * min_cost),
                }));
            }
        }
    }

    let cost = g_score[goal];
    if !cost.is_finite() {
        return Err(unreachable());
    }

    let mut path = vec![to];
    let mut current = goal;
    while current != start {
        current = came_from[current];
        path.push(raster.cell_at(current));
    }
    path.reverse();
    Ok((path, cost))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(rows: usize, cols: usize, cost: i32) -> Raster {
        Raster::filled(rows, cols, Some(cost))
    }

    fn idx(row: i64, col: i64) -> RasterIndex {
        RasterIndex { row, col }
    }

    fn solve(raster: &Raster, waypoints: &[RasterIndex]) -> Result<PathResult> {
        least_cost_path(raster, waypoints, &SolverOptions::default(), &CancelToken::new())
    }

    #[test]
    fn uniform_diagonal_costs_steps_times_sqrt2() {
        let result = solve(&uniform(5, 5, 1), &[idx(0, 0), idx(4, 4)]).unwrap();
        assert!((result.total_cost() - 4.0 * SQRT_2).abs() < 1e-9);
        let expected: Vec<CellIndex> = (0..5).map(|i| CellIndex::new(i, i)).collect();
        assert_eq!(result.cells, expected);
        assert!(result.mask.get(2, 2).copied().unwrap_or(false));
        assert!(!result.mask.get(0, 4).copied().unwrap_or(true));
    }

    #[test]
    fn barrier_forces_the_gate() {
        let mut raster = uniform(5, 5, 1);
        for col in 0..5 {
            raster.set(2, col, Some(1000));
        }
        raster.set(2, 4, Some(1));
        let result = solve(&raster, &[idx(0, 0), idx(4, 0)]).unwrap();
        let crossings: Vec<&CellIndex> = result.cells.iter().filter(|c| c.row == 2).collect();
        assert_eq!(crossings, vec![&CellIndex::new(2, 4)]);
        assert!(result.total_cost() < 20.0);
    }

    #[test]
    fn stops_concatenate_pairwise_paths_without_seam_duplicates() {
        let mut raster = uniform(8, 8, 3);
        raster.set(3, 3, Some(90));
        raster.set(4, 5, None);
        let (a, b, c) = (idx(0, 0), idx(6, 6), idx(1, 7));

        let full = solve(&raster, &[a, b, c]).unwrap();
        let first = solve(&raster, &[a, b]).unwrap();
        let second = solve(&raster, &[b, c]).unwrap();

        let mut expected = first.cells.clone();
        expected.extend_from_slice(&second.cells[1..]);
        assert_eq!(full.cells, expected);
        assert_eq!(full.segment_costs.len(), 2);
        assert!((full.total_cost() - first.total_cost() - second.total_cost()).abs() < 1e-9);
        assert!(full.cells.windows(2).all(|w| w[0] != w[1]));
    }

    #[test]
    fn repeated_waypoint_is_a_zero_cost_segment() {
        let result = solve(&uniform(3, 3, 2), &[idx(1, 1), idx(1, 1)]).unwrap();
        assert_eq!(result.cells, vec![CellIndex::new(1, 1)]);
        assert_eq!(result.total_cost(), 0.0);
    }

    #[test]
    fn waypoint_outside_raster_is_out_of_bounds() {
        let err = solve(&uniform(5, 5, 1), &[idx(0, 0), idx(5, 2)]).unwrap_err();
        assert!(matches!(
            err,
            Error::Routing(RoutingError::WaypointOutOfBounds { waypoint: 1, row: 5, col: 2, .. })
        ));
    }

    #[test]
    fn excluded_waypoint_is_unreachable() {
        let mut raster = uniform(5, 5, 1);
        raster.set(4, 4, None);
        let err = solve(&raster, &[idx(0, 0), idx(2, 2), idx(4, 4)]).unwrap_err();
        assert!(matches!(
            err,
            Error::Routing(RoutingError::UnreachableWaypoint { segment: 1, .. })
        ));
    }

    #[test]
    fn walled_off_goal_is_unreachable() {
        let mut raster = uniform(5, 5, 1);
        for col in 0..5 {
            raster.set(2, col, None);
        }
        let err = solve(&raster, &[idx(0, 0), idx(4, 4)]).unwrap_err();
        assert!(matches!(
            err,
            Error::Routing(RoutingError::UnreachableWaypoint { segment: 0, from: (0, 0), to: (4, 4) })
        ));
    }

    #[test]
    fn first_failing_segment_is_reported() {
        let mut raster = uniform(5, 5, 1);
        for col in 0..5 {
            raster.set(2, col, None);
        }
        let waypoints = [idx(0, 0), idx(4, 4), idx(0, 4), idx(4, 0)];
        for _ in 0..20 {
            let err = solve(&raster, &waypoints).unwrap_err();
            assert!(matches!(
                err,
                Error::Routing(RoutingError::UnreachableWaypoint { segment: 0, .. })
            ));
        }
    }

    #[test]
    fn exhausted_budget_is_reported_per_segment() {
        let options = SolverOptions {
            segment_budget: Some(Duration::ZERO),
        };
        let err = least_cost_path(&uniform(5, 5, 1), &[idx(0, 0), idx(4, 4)], &options, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Routing(RoutingError::SegmentBudgetExceeded { segment: 0, .. })
        ));
    }

    #[test]
    fn cancelled_search_stops() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = least_cost_path(&uniform(5, 5, 1), &[idx(0, 0), idx(4, 4)], &SolverOptions::default(), &cancel)
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
