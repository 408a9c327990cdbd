// A* route finding over the territory graph.
//
// Standard A* with a `BinaryHeap` open set (min-heap via reversed ordering).
// Scores, came-from links and the closed set are `Vec`s indexed by
// `TerritoryIndex`, so a search allocates three arrays the size of the map
// and never hashes.
//
// Edge cost is `TerritoryGraph::edge_cost` (centre-to-centre distance) and the
// heuristic is the straight-line distance to the goal. Because every edge is
// at least as long as the straight line between its endpoints, the heuristic
// never overestimates and satisfies the triangle inequality, so the first time
// the goal is popped its cost is minimal.
//
// Ties between equal f-scores break on the lower territory index, which makes
// results repeatable for a given graph, though callers must not rely on which
// of several equal-cost routes comes back.
//
// `RouteFinder` is the seam `DispatchController` calls through; `AStar` is
// the real implementation.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::graph::TerritoryGraph;
use crate::types::TerritoryIndex;

/// An ordered route from a source to a destination, both inclusive.
#[derive(Clone, Debug, PartialEq)]
pub struct Route {
    pub territories: Vec<TerritoryIndex>,
    /// Sum of edge costs along the route.
    pub total_cost: f32,
}

/// Computes least-cost routes between two territories.
pub trait RouteFinder {
    /// Returns `None` when `from == to`, when either index is unknown, or when
    /// the two territories are in disconnected parts of the map.
    fn find_route(
        &self,
        graph: &TerritoryGraph,
        from: TerritoryIndex,
        to: TerritoryIndex,
    ) -> Option<Route>;
}

/// A* search with the straight-line distance heuristic.
#[derive(Clone, Copy, Debug, Default)]
pub struct AStar;

impl RouteFinder for AStar {
    fn find_route(
        &self,
        graph: &TerritoryGraph,
        from: TerritoryIndex,
        to: TerritoryIndex,
    ) -> Option<Route> {
        astar(graph, from, to)
    }
}

/// Entry in the A* open set (min-heap via reversed ordering).
struct OpenEntry {
    node: TerritoryIndex,
    f_score: f32,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.f_score.total_cmp(&other.f_score) == Ordering::Equal && self.node == other.node
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

/// Find the least-cost route from `start` to `goal`.
pub fn astar(graph: &TerritoryGraph, start: TerritoryIndex, goal: TerritoryIndex) -> Option<Route> {
    if start == goal {
        return None;
    }
    let goal_pos = graph.territory(goal)?.position;
    graph.territory(start)?;

    let n = graph.len();
    let heuristic = |node: TerritoryIndex| {
        graph
            .territory(node)
            .map_or(0.0, |t| t.position.distance(goal_pos))
    };

    // g_score[node] = cost of cheapest known route from start to node.
    let mut g_score = vec![f32::INFINITY; n];
    let mut came_from: Vec<Option<TerritoryIndex>> = vec![None; n];
    let mut closed = vec![false; n];

    g_score[start.as_usize()] = 0.0;

    let mut open = BinaryHeap::new();
    open.push(OpenEntry {
        node: start,
        f_score: heuristic(start),
    });

    while let Some(current) = open.pop() {
        let ci = current.node.as_usize();

        if current.node == goal {
            return Some(reconstruct_route(&came_from, start, goal, g_score[ci]));
        }

        if closed[ci] {
            continue;
        }
        closed[ci] = true;

        let current_g = g_score[ci];

        for &neighbor in graph.neighbors(current.node) {
            let ni = neighbor.as_usize();
            if closed[ni] {
                continue;
            }

            let Some(step) = graph.edge_cost(current.node, neighbor) else {
                continue;
            };
            let tentative_g = current_g + step;
            if tentative_g < g_score[ni] {
                g_score[ni] = tentative_g;
                came_from[ni] = Some(current.node);
                open.push(OpenEntry {
                    node: neighbor,
                    f_score: tentative_g + heuristic(neighbor),
                });
            }
        }
    }

    None
}

/// Walk came-from links back from the goal.
fn reconstruct_route(
    came_from: &[Option<TerritoryIndex>],
    start: TerritoryIndex,
    goal: TerritoryIndex,
    total_cost: f32,
) -> Route {
    let mut territories = vec![goal];
    let mut current = goal;
    while current != start {
        match came_from[current.as_usize()] {
            Some(prev) => {
                territories.push(prev);
                current = prev;
            }
            None => break,
        }
    }
    territories.reverse();

    Route {
        territories,
        total_cost,
    }
}
