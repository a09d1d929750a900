// A* search over the path graph.
//
// Standard A* on a `BinaryHeap` (min-heap via reversed ordering, same
// pattern as `EventQueue`). Waypoints are keyed by sparse `VoxelId`s, so
// per-query scores live in `FxHashMap`s that are dropped when the query
// returns; nothing is stored on the graph between searches.
//
// The heuristic is the Manhattan distance between cells in voxel units.
// A node is re-queued only when a strictly cheaper route to it is found.
// When routing on roads, built-road edges cost `road_multiplier` times
// their weight. A built corner road then costs about 1.41 for a step the
// heuristic counts as 2, so road-aware routes are near-optimal rather than
// guaranteed cheapest. Routes that ignore roads are exact.
//
// See also: `nav.rs` for the `PathGraph` being searched, `actor.rs` where
// wandering actors request routes.
//
// **Critical constraint: determinism.** Heap ties break on `VoxelId`, and
// f32 ordering uses `total_cmp`. Hash maps are lookup-only, never iterated.

use crate::config::PathConfig;
use crate::nav::{PathGraph, RoadState};
use crate::types::VoxelId;
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A successful search.
#[derive(Clone, Debug, PartialEq)]
pub struct PathResult {
    /// Cells from start to goal, inclusive.
    pub nodes: Vec<VoxelId>,
    pub total_cost: f32,
}

struct OpenEntry {
    node: VoxelId,
    f_score: f32,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap: smallest f_score is "greatest".
        other
            .f_score
            .total_cmp(&self.f_score)
            .then_with(|| other.node.cmp(&self.node))
    }
}

fn heuristic(from: VoxelId, to: VoxelId) -> f32 {
    from.coord().manhattan_distance(to.coord()) as f32
}

/// Cheapest route from `start` to `goal`. `None` if either end is not a
/// waypoint or the goal is unreachable.
pub fn astar(
    graph: &PathGraph,
    start: VoxelId,
    goal: VoxelId,
    use_road: bool,
    paths: &PathConfig,
) -> Option<PathResult> {
    if !graph.contains(start) || !graph.contains(goal) {
        return None;
    }

    let mut g_score: FxHashMap<VoxelId, f32> = FxHashMap::default();
    let mut came_from: FxHashMap<VoxelId, VoxelId> = FxHashMap::default();
    g_score.insert(start, 0.0);

    let mut open = BinaryHeap::new();
    open.push(OpenEntry {
        node: start,
        f_score: heuristic(start, goal),
    });

    while let Some(OpenEntry { node: current, .. }) = open.pop() {
        if current == goal {
            let total_cost = g_score.get(&goal).copied().unwrap_or_default();
            return Some(PathResult {
                nodes: reconstruct_path(&came_from, start, goal),
                total_cost,
            });
        }
        let Some(waypoint) = graph.get(current) else {
            continue;
        };
        let current_g = g_score.get(&current).copied().unwrap_or(f32::INFINITY);

        for (neighbor, exit) in waypoint.links() {
            if !graph.contains(neighbor) {
                continue;
            }
            let mut weight = exit.weight;
            if use_road && exit.road == RoadState::Built {
                weight *= paths.road_multiplier;
            }
            let tentative_g = current_g + weight;
            let known = g_score.get(&neighbor).copied().unwrap_or(f32::INFINITY);
            if tentative_g < known {
                g_score.insert(neighbor, tentative_g);
                came_from.insert(neighbor, current);
                open.push(OpenEntry {
                    node: neighbor,
                    f_score: tentative_g + heuristic(neighbor, goal),
                });
            }
        }
    }

    None
}

/// Route as a list of cells; empty when there is no route.
pub fn find_path(
    graph: &PathGraph,
    start: VoxelId,
    goal: VoxelId,
    use_road: bool,
    paths: &PathConfig,
) -> Vec<VoxelId> {
    astar(graph, start, goal, use_road, paths)
        .map(|r| r.nodes)
        .unwrap_or_default()
}

impl PathGraph {
    /// Cheapest route with its total cost. See `astar`.
    pub fn find_route(
        &self,
        start: VoxelId,
        goal: VoxelId,
        use_road: bool,
        paths: &PathConfig,
    ) -> Option<PathResult> {
        astar(self, start, goal, use_road, paths)
    }

    /// Route as a list of cells; empty when there is no route.
    pub fn find_path(
        &self,
        start: VoxelId,
        goal: VoxelId,
        use_road: bool,
        paths: &PathConfig,
    ) -> Vec<VoxelId> {
        find_path(self, start, goal, use_road, paths)
    }
}

fn reconstruct_path(
    came_from: &FxHashMap<VoxelId, VoxelId>,
    start: VoxelId,
    goal: VoxelId,
) -> Vec<VoxelId> {
    let mut nodes = vec![goal];
    let mut current = goal;
    while current != start {
        match came_from.get(&current) {
            Some(&prev) => {
                nodes.push(prev);
                current = prev;
            }
            None => break,
        }
    }
    nodes.reverse();
    nodes
}
