// Troop dispatch: the two-phase selection and the send orders.
//
// The host feeds selection events in; the controller decides what they mean
// and, on a send order, moves troops:
//
//   AwaitingSource --commit_sources--> AwaitingDestination
//   AwaitingDestination --commit_destination--> (destination stored)
//   AwaitingDestination --send_all / send_amount--> AwaitingSource
//   AwaitingDestination --commit_destination(the sole source)--> AwaitingSource (cancelled)
//   any --clear--> AwaitingSource
//
// A send order handles each source independently. A source is skipped if it is
// the destination, is no longer owned by the local player, or has nothing
// above the garrison floor of one troop. Otherwise the route finder is asked
// for a route; on success the amount is deducted from the source at once, the
// change is reported through the `ChangeNotifier`, and a `TravelingUnit` is
// returned for the rendering side to animate. No route means no deduction.
// Arrival at the destination is not handled here.
//
// The controller holds its notifier explicitly (normally a
// `conquest_relay::client::SyncHandle`), so there is no process-wide client.
//
// See also: `pathfinding.rs` for `RouteFinder`, `state.rs` for `MatchState`.

use log::debug;

use crate::pathfinding::{AStar, RouteFinder};
use crate::state::MatchState;
use crate::types::{Color, TerritoryIndex};

/// Troops that must stay behind in a source territory.
pub const GARRISON_FLOOR: u32 = 1;

/// Receives the index of every territory the controller changed, so the next
/// outbound sync tick can include it.
pub trait ChangeNotifier {
    fn territory_changed(&self, index: TerritoryIndex);
}

/// No network: changes go nowhere.
impl ChangeNotifier for () {
    fn territory_changed(&self, _index: TerritoryIndex) {}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionPhase {
    AwaitingSource,
    AwaitingDestination,
}

/// Pending selection. Sources are in commit order without duplicates.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    pub sources: Vec<TerritoryIndex>,
    pub destination: Option<TerritoryIndex>,
}

/// Result of a selection commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionOutcome {
    /// This many owned sources were stored.
    SourcesStored(usize),
    DestinationStored(TerritoryIndex),
    /// The destination was the sole source; the selection was dropped.
    Cancelled,
    /// The commit did not fit the current phase or named nothing usable.
    Ignored,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TroopOrder {
    /// Everything above the garrison floor.
    All,
    /// At most this many, never dipping below the garrison floor.
    UpTo(u32),
}

/// Request for the rendering side to animate troops along a route.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TravelingUnit {
    pub color: Color,
    pub path: Vec<TerritoryIndex>,
    pub quantity: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceOutcome {
    Sent(TravelingUnit),
    NoRoute,
    Skipped,
}

/// Per-source results of one send order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub destination: Option<TerritoryIndex>,
    pub sources: Vec<(TerritoryIndex, SourceOutcome)>,
}

impl DispatchReport {
    pub fn units(&self) -> impl Iterator<Item = &TravelingUnit> {
        self.sources.iter().filter_map(|(_, outcome)| match outcome {
            SourceOutcome::Sent(unit) => Some(unit),
            _ => None,
        })
    }

    pub fn into_units(self) -> Vec<TravelingUnit> {
        self.sources
            .into_iter()
            .filter_map(|(_, outcome)| match outcome {
                SourceOutcome::Sent(unit) => Some(unit),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug)]
pub struct DispatchController<N, R = AStar> {
    notifier: N,
    finder: R,
    phase: SelectionPhase,
    selection: Selection,
}

impl<N: ChangeNotifier> DispatchController<N> {
    pub fn new(notifier: N) -> Self {
        Self::with_finder(notifier, AStar)
    }
}

impl<N: ChangeNotifier, R: RouteFinder> DispatchController<N, R> {
    pub fn with_finder(notifier: N, finder: R) -> Self {
        Self {
            notifier,
            finder,
            phase: SelectionPhase::AwaitingSource,
            selection: Selection::default(),
        }
    }

    pub fn phase(&self) -> SelectionPhase {
        self.phase
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn finder(&self) -> &R {
        &self.finder
    }

    /// Drop any pending selection (e.g. a new drag gesture started).
    pub fn clear(&mut self) {
        self.selection = Selection::default();
        self.phase = SelectionPhase::AwaitingSource;
    }

    /// Store the owned territories among `sources` and wait for a destination.
    pub fn commit_sources(
        &mut self,
        state: &MatchState,
        sources: &[TerritoryIndex],
    ) -> SelectionOutcome {
        if self.phase != SelectionPhase::AwaitingSource {
            return SelectionOutcome::Ignored;
        }
        let local = state.local_id();
        let mut owned: Vec<TerritoryIndex> = Vec::with_capacity(sources.len());
        for &index in sources {
            let is_owned = state
                .graph
                .territory(index)
                .is_some_and(|t| t.is_owned_by(local));
            if is_owned && !owned.contains(&index) {
                owned.push(index);
            }
        }
        if owned.is_empty() {
            return SelectionOutcome::Ignored;
        }

        let count = owned.len();
        self.selection = Selection {
            sources: owned,
            destination: None,
        };
        self.phase = SelectionPhase::AwaitingDestination;
        SelectionOutcome::SourcesStored(count)
    }

    /// Pick the destination for the pending sources. Picking the only source
    /// again cancels the selection. A later commit replaces an earlier one.
    pub fn commit_destination(
        &mut self,
        state: &MatchState,
        destination: TerritoryIndex,
    ) -> SelectionOutcome {
        if self.phase != SelectionPhase::AwaitingDestination || !state.graph.contains(destination) {
            return SelectionOutcome::Ignored;
        }
        if self.selection.sources == [destination] {
            self.clear();
            return SelectionOutcome::Cancelled;
        }
        self.selection.destination = Some(destination);
        SelectionOutcome::DestinationStored(destination)
    }

    /// Send everything above the garrison floor from every source.
    pub fn send_all(&mut self, state: &mut MatchState) -> DispatchReport {
        self.dispatch(state, TroopOrder::All)
    }

    /// Send up to `amount` troops from every source.
    pub fn send_amount(&mut self, state: &mut MatchState, amount: u32) -> DispatchReport {
        self.dispatch(state, TroopOrder::UpTo(amount))
    }

    /// Carry out a send order against the pending selection, then reset.
    /// Without a stored destination this does nothing.
    pub fn dispatch(&mut self, state: &mut MatchState, order: TroopOrder) -> DispatchReport {
        let Some(destination) = self.selection.destination else {
            return DispatchReport::default();
        };
        let sources = std::mem::take(&mut self.selection.sources);
        self.clear();

        let mut report = DispatchReport {
            destination: Some(destination),
            sources: Vec::with_capacity(sources.len()),
        };
        for source in sources {
            let outcome = self.send_from(state, source, destination, order);
            report.sources.push((source, outcome));
        }
        report
    }

    fn send_from(
        &self,
        state: &mut MatchState,
        source: TerritoryIndex,
        destination: TerritoryIndex,
        order: TroopOrder,
    ) -> SourceOutcome {
        if source == destination {
            return SourceOutcome::Skipped;
        }
        let local = state.local_id();
        let Some(territory) = state.graph.territory(source) else {
            return SourceOutcome::Skipped;
        };
        if !territory.is_owned_by(local) {
            return SourceOutcome::Skipped;
        }
        let available = territory.troop_count.saturating_sub(GARRISON_FLOOR);
        let amount = match order {
            TroopOrder::All => available,
            TroopOrder::UpTo(n) => available.min(n),
        };
        if amount == 0 {
            return SourceOutcome::Skipped;
        }

        let Some(route) = self.finder.find_route(&state.graph, source, destination) else {
            debug!("no route from {source} to {destination}");
            return SourceOutcome::NoRoute;
        };

        let color = territory
            .owner
            .and_then(|owner| state.player(owner))
            .map_or(state.local.color, |p| p.color);
        if let Some(territory) = state.graph.territory_mut(source) {
            territory.troop_count -= amount;
        }
        self.notifier.territory_changed(source);
        debug!(
            "sent {amount} troops {source} -> {destination} over {} territories",
            route.territories.len()
        );

        SourceOutcome::Sent(TravelingUnit {
            color,
            path: route.territories,
            quantity: amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;
    use crate::graph::TerritoryGraph;
    use crate::pathfinding::Route;
    use crate::player::Player;
    use crate::types::{PlayerId, Position};
    use proptest::prelude::*;

    const ME: PlayerId = PlayerId(1);
    const GREEN: Color = Color::rgb(0, 0xFF, 0);

    #[derive(Default)]
    struct Recorder(RefCell<Vec<TerritoryIndex>>);

    impl ChangeNotifier for Recorder {
        fn territory_changed(&self, index: TerritoryIndex) {
            self.0.borrow_mut().push(index);
        }
    }

    /// A* that counts how often it is asked.
    #[derive(Default)]
    struct CountingFinder(Cell<usize>);

    impl RouteFinder for CountingFinder {
        fn find_route(
            &self,
            graph: &TerritoryGraph,
            from: TerritoryIndex,
            to: TerritoryIndex,
        ) -> Option<Route> {
            self.0.set(self.0.get() + 1);
            AStar.find_route(graph, from, to)
        }
    }

    const A: TerritoryIndex = TerritoryIndex(0);
    const B: TerritoryIndex = TerritoryIndex(1);
    const C: TerritoryIndex = TerritoryIndex(2);
    const D: TerritoryIndex = TerritoryIndex(3);
    const ISLAND: TerritoryIndex = TerritoryIndex(4);

    /// A - B - C - D in a row plus an unconnected island. The local player
    /// owns A (10 troops), C (5) and the island (8).
    fn state() -> MatchState {
        let mut graph = TerritoryGraph::new();
        for x in 0..5 {
            graph.add_territory(Position::new(x as f32 * 10.0, 0.0), x == 0);
        }
        graph.connect(A, B).unwrap();
        graph.connect(B, C).unwrap();
        graph.connect(C, D).unwrap();
        graph.apply_delta(A, Some(ME), 10);
        graph.apply_delta(C, Some(ME), 5);
        graph.apply_delta(ISLAND, Some(ME), 8);
        MatchState::new(graph, Player::with_id(ME, GREEN, A))
    }

    fn troops(state: &MatchState, index: TerritoryIndex) -> u32 {
        state.graph.territory(index).unwrap().troop_count
    }

    #[test]
    fn send_all_from_single_source() {
        // Two territories, A (10 troops, mine) next to unclaimed B.
        let mut graph = TerritoryGraph::new();
        let a = graph.add_territory(Position::new(0.0, 0.0), true);
        let b = graph.add_territory(Position::new(10.0, 0.0), false);
        graph.connect(a, b).unwrap();
        graph.apply_delta(a, Some(ME), 10);
        let mut state = MatchState::new(graph, Player::with_id(ME, GREEN, a));

        let mut dc = DispatchController::new(Recorder::default());
        assert_eq!(dc.commit_sources(&state, &[a]), SelectionOutcome::SourcesStored(1));
        assert_eq!(dc.commit_destination(&state, b), SelectionOutcome::DestinationStored(b));
        let report = dc.send_all(&mut state);

        let units = report.into_units();
        assert_eq!(
            units,
            vec![TravelingUnit {
                color: GREEN,
                path: vec![a, b],
                quantity: 9,
            }]
        );
        assert_eq!(troops(&state, a), 1);
        let dest = state.graph.territory(b).unwrap();
        assert_eq!((dest.owner, dest.troop_count), (None, 0));
        assert_eq!(*dc.notifier().0.borrow(), vec![a]);
        assert_eq!(dc.phase(), SelectionPhase::AwaitingSource);
        assert_eq!(dc.selection(), &Selection::default());
    }

    #[test]
    fn send_amount_caps_at_garrison_floor() {
        let mut state = state();
        let mut dc = DispatchController::new(());
        dc.commit_sources(&state, &[A, C]);
        dc.commit_destination(&state, D);
        let report = dc.send_amount(&mut state, 6);

        let quantities: Vec<u32> = report.units().map(|u| u.quantity).collect();
        assert_eq!(quantities, vec![6, 4]);
        assert_eq!(troops(&state, A), 4);
        assert_eq!(troops(&state, C), 1);
    }

    #[test]
    fn sources_are_filtered_to_owned_and_deduplicated() {
        let state = state();
        let mut dc = DispatchController::new(());
        assert_eq!(
            dc.commit_sources(&state, &[B, A, A, TerritoryIndex(99), C]),
            SelectionOutcome::SourcesStored(2)
        );
        assert_eq!(dc.selection().sources, vec![A, C]);

        let mut dc = DispatchController::new(());
        assert_eq!(dc.commit_sources(&state, &[B, D]), SelectionOutcome::Ignored);
        assert_eq!(dc.phase(), SelectionPhase::AwaitingSource);
    }

    #[test]
    fn reselecting_sole_source_cancels() {
        let mut state = state();
        let mut dc = DispatchController::with_finder(Recorder::default(), CountingFinder::default());
        dc.commit_sources(&state, &[A]);
        assert_eq!(dc.commit_destination(&state, A), SelectionOutcome::Cancelled);
        assert_eq!(dc.phase(), SelectionPhase::AwaitingSource);
        assert!(dc.selection().sources.is_empty());

        // Nothing left to send.
        assert_eq!(dc.send_all(&mut state), DispatchReport::default());
        assert_eq!(dc.finder().0.get(), 0);
        assert_eq!(troops(&state, A), 10);
        assert!(dc.notifier().0.borrow().is_empty());
    }

    #[test]
    fn destination_among_several_sources_is_skipped() {
        let mut state = state();
        let mut dc = DispatchController::with_finder((), CountingFinder::default());
        dc.commit_sources(&state, &[A, C]);
        assert_eq!(dc.commit_destination(&state, C), SelectionOutcome::DestinationStored(C));
        let report = dc.send_all(&mut state);

        assert_eq!(report.sources[1], (C, SourceOutcome::Skipped));
        assert_eq!(dc.finder().0.get(), 1);
        assert_eq!(troops(&state, A), 1);
        assert_eq!(troops(&state, C), 5);
    }

    #[test]
    fn one_route_query_per_eligible_source() {
        let mut state = state();
        state.graph.apply_delta(B, Some(ME), 1);
        let mut dc = DispatchController::with_finder((), CountingFinder::default());
        dc.commit_sources(&state, &[A, B, C]);
        dc.commit_destination(&state, D);
        let report = dc.send_all(&mut state);

        // B sits on the floor and is skipped without a query.
        assert_eq!(dc.finder().0.get(), 2);
        assert_eq!(report.sources[1], (B, SourceOutcome::Skipped));
        assert_eq!(report.units().count(), 2);
    }

    #[test]
    fn no_route_leaves_source_untouched() {
        let mut state = state();
        let mut dc = DispatchController::new(Recorder::default());
        dc.commit_sources(&state, &[ISLAND, A]);
        dc.commit_destination(&state, D);
        let report = dc.send_all(&mut state);

        assert_eq!(report.sources[0], (ISLAND, SourceOutcome::NoRoute));
        let island = state.graph.territory(ISLAND).unwrap();
        assert_eq!((island.owner, island.troop_count), (Some(ME), 8));
        assert_eq!(*dc.notifier().0.borrow(), vec![A]);
    }

    #[test]
    fn lost_source_is_skipped() {
        let mut state = state();
        let mut dc = DispatchController::new(());
        dc.commit_sources(&state, &[A]);
        dc.commit_destination(&state, D);
        // A remote peer captures A before the order is given.
        state.graph.apply_delta(A, Some(PlayerId(2)), 30);
        let report = dc.send_all(&mut state);
        assert_eq!(report.sources, vec![(A, SourceOutcome::Skipped)]);
        assert_eq!(troops(&state, A), 30);
    }

    #[test]
    fn commits_out_of_phase_are_ignored() {
        let mut state = state();
        let mut dc = DispatchController::new(());
        assert_eq!(dc.commit_destination(&state, B), SelectionOutcome::Ignored);
        dc.commit_sources(&state, &[A]);
        assert_eq!(dc.commit_sources(&state, &[C]), SelectionOutcome::Ignored);
        assert_eq!(dc.commit_destination(&state, TerritoryIndex(42)), SelectionOutcome::Ignored);

        // Sending without a destination does nothing and keeps the sources.
        assert_eq!(dc.send_all(&mut state), DispatchReport::default());
        assert_eq!(dc.selection().sources, vec![A]);
    }

    #[test]
    fn clear_discards_pending_selection() {
        let state = state();
        let mut dc = DispatchController::new(());
        dc.commit_sources(&state, &[A]);
        dc.commit_destination(&state, B);
        dc.clear();
        assert_eq!(dc.phase(), SelectionPhase::AwaitingSource);
        assert_eq!(dc.selection(), &Selection::default());
    }

    proptest! {
        /// A source never drops below the floor, and one at 0 or 1 troops
        /// is never touched.
        #[test]
        fn prop_garrison_floor(start in 0u32..40, amount in 0u32..60, all in any::<bool>()) {
            let mut state = state();
            state.graph.apply_delta(A, Some(ME), start);
            let mut dc = DispatchController::new(());
            dc.commit_sources(&state, &[A]);
            dc.commit_destination(&state, B);
            let order = if all { TroopOrder::All } else { TroopOrder::UpTo(amount) };
            let report = dc.dispatch(&mut state, order);

            let after = troops(&state, A);
            if start <= GARRISON_FLOOR {
                prop_assert_eq!(after, start);
                prop_assert_eq!(report.units().count(), 0);
            } else {
                prop_assert!(after >= GARRISON_FLOOR);
                let sent: u32 = report.units().map(|u| u.quantity).sum();
                prop_assert_eq!(after + sent, start);
            }
        }
    }
}
