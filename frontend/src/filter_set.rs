//! Selected-keys filters over a data-derived universe
//!
//! `Selection::All` is the one sentinel for "no filter active". An explicit
//! subset that happens to cover the whole universe stays `Only`, so the view
//! can tell "user picked everything" apart from "never filtered".

use crate::dataflow::{Atom, Derived, Effect, ReadOnly, Runtime};
use indexmap::IndexSet;
use std::fmt::Debug;
use std::hash::Hash;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection<K: Hash + Eq> {
    All,
    Only(IndexSet<K>),
}

/// Universe of available keys plus the selected subset.
///
/// Every mutation re-intersects the selection with the universe, so a key
/// that disappeared from the data can never stay selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSet<K: Hash + Eq> {
    universe: IndexSet<K>,
    selection: Selection<K>,
}

impl<K: Clone + Hash + Eq> FilterSet<K> {
    pub fn new() -> Self {
        Self {
            universe: IndexSet::new(),
            selection: Selection::All,
        }
    }

    /// Replaces the universe. Going from empty to non-empty selects all, and
    /// so does a data change that leaves none of the picked keys.
    pub fn init_universe(&mut self, keys: impl IntoIterator<Item = K>) {
        let was_empty = self.universe.is_empty();
        let had_picks = matches!(&self.selection, Selection::Only(picked) if !picked.is_empty());
        self.universe = keys.into_iter().collect();
        if was_empty && !self.universe.is_empty() {
            self.selection = Selection::All;
        }
        self.reconcile();
        if had_picks && matches!(&self.selection, Selection::Only(picked) if picked.is_empty()) {
            self.selection = Selection::All;
        }
    }

    /// Selects or deselects `key`. Keys outside the universe are ignored.
    ///
    /// Returns whether the key was known.
    pub fn toggle(&mut self, key: &K, on: bool) -> bool {
        if !self.universe.contains(key) {
            return false;
        }
        let mut selected = self.selected();
        if on {
            selected.insert(key.clone());
        } else {
            selected.shift_remove(key);
        }
        self.selection = Selection::Only(selected);
        self.reconcile();
        true
    }

    pub fn select_all(&mut self) {
        self.selection = Selection::All;
    }

    /// Deselects everything.
    pub fn clear(&mut self) {
        self.selection = Selection::Only(IndexSet::new());
    }

    /// True iff the selection is a strict, non-empty subset of the universe.
    pub fn is_active(&self) -> bool {
        match &self.selection {
            Selection::All => false,
            Selection::Only(keys) => !keys.is_empty() && keys.len() < self.universe.len(),
        }
    }

    /// Selected keys, in universe order.
    pub fn selected(&self) -> IndexSet<K> {
        match &self.selection {
            Selection::All => self.universe.clone(),
            Selection::Only(keys) => keys.clone(),
        }
    }

    pub fn is_selected(&self, key: &K) -> bool {
        match &self.selection {
            Selection::All => self.universe.contains(key),
            Selection::Only(keys) => keys.contains(key),
        }
    }

    /// Whether a data row tagged with `key` passes the filter.
    ///
    /// With no filter active everything passes, including keys the universe
    /// has not caught up with yet.
    pub fn matches(&self, key: &K) -> bool {
        match &self.selection {
            Selection::All => true,
            Selection::Only(keys) => keys.contains(key),
        }
    }

    pub fn universe(&self) -> &IndexSet<K> {
        &self.universe
    }

    pub fn selection(&self) -> &Selection<K> {
        &self.selection
    }

    fn reconcile(&mut self) {
        if let Selection::Only(keys) = &self.selection {
            let kept = self
                .universe
                .iter()
                .filter(|key| keys.contains(*key))
                .cloned()
                .collect();
            self.selection = Selection::Only(kept);
        }
    }
}

impl<K: Clone + Hash + Eq> Default for FilterSet<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// A `FilterSet` held in an atom.
///
/// # Examples
///
/// ```rust
/// use dashboard_frontend::dataflow::Runtime;
/// use dashboard_frontend::filter_set::FilterController;
///
/// let rt = Runtime::new();
/// let zones = rt.atom(vec!["north", "south"]);
/// let filter = FilterController::new(&rt);
/// let _binding = filter.bind_universe(&rt, rt.derive({
///     let zones = zones.clone();
///     move || zones.get()
/// }));
///
/// filter.toggle(&"north", false);
/// assert!(filter.state().get().is_active());
///
/// // "south" left the data, so the filter falls back to everything
/// zones.set(vec!["north", "east"]);
/// assert!(!filter.state().get().is_active());
/// assert!(filter.state().get().matches(&"east"));
/// ```
pub struct FilterController<K: Hash + Eq> {
    state: Atom<FilterSet<K>>,
}

impl<K> FilterController<K>
where
    K: Clone + Hash + Eq + Debug + 'static,
{
    pub fn new(runtime: &Runtime) -> Self {
        Self {
            state: runtime.atom(FilterSet::new()),
        }
    }

    pub fn state(&self) -> ReadOnly<FilterSet<K>> {
        self.state.read_only()
    }

    fn mutate(&self, f: impl FnOnce(&mut FilterSet<K>)) {
        let mut next = self.state.get_untracked();
        f(&mut next);
        self.state.set_neq(next);
    }

    pub fn init_universe(&self, keys: impl IntoIterator<Item = K>) {
        self.mutate(|filter| filter.init_universe(keys));
    }

    pub fn toggle(&self, key: &K, on: bool) {
        self.mutate(|filter| {
            if !filter.toggle(key, on) {
                log::debug!("Ignoring toggle of unknown filter key {key:?}");
            }
        });
    }

    pub fn select_all(&self) {
        self.mutate(FilterSet::select_all);
    }

    pub fn clear(&self) {
        self.mutate(FilterSet::clear);
    }

    /// Keeps the universe in sync with `keys`. The binding lives as long as
    /// the returned effect.
    pub fn bind_universe(&self, runtime: &Runtime, keys: Derived<Vec<K>>) -> Effect {
        let state = self.state.clone();
        runtime.watch(
            move || Some(keys.get()),
            move |keys| {
                let mut next = state.get_untracked();
                next.init_universe(keys);
                state.set_neq(next);
            },
        )
    }
}

impl<K: Hash + Eq> Clone for FilterController<K> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn keys(items: &[&'static str]) -> IndexSet<&'static str> {
        items.iter().copied().collect()
    }

    #[test]
    fn test_universe_scenario() {
        let mut filter = FilterSet::new();

        filter.init_universe(["a", "b", "c"]);
        assert!(!filter.is_active());
        assert_eq!(filter.selection(), &Selection::All);

        filter.toggle(&"a", false);
        assert!(filter.is_active());
        assert_eq!(filter.selected(), keys(&["b", "c"]));

        filter.init_universe(["b", "c"]);
        assert_eq!(filter.selected(), keys(&["b", "c"]));
        // Explicitly picked, even though it now covers everything
        assert_eq!(filter.selection(), &Selection::Only(keys(&["b", "c"])));
        assert!(!filter.is_active());
    }

    #[test]
    fn test_shrinking_universe_drops_vanished_keys() {
        let mut filter = FilterSet::new();
        filter.init_universe(["a", "b", "c", "d"]);
        filter.toggle(&"a", false);
        filter.toggle(&"b", false);

        filter.init_universe(["a", "c", "e"]);
        assert_eq!(filter.selected(), keys(&["c"]));
        assert!(filter.is_active());
        assert!(!filter.matches(&"d"));
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let mut filter = FilterSet::new();
        filter.init_universe(["a", "b"]);

        assert!(!filter.toggle(&"z", true));
        assert_eq!(filter.selection(), &Selection::All);
    }

    #[test]
    fn test_empty_universe_resets_to_all_when_data_returns() {
        let mut filter = FilterSet::new();
        filter.init_universe(["a", "b"]);
        filter.clear();
        assert!(!filter.is_active());
        assert!(!filter.matches(&"a"));

        filter.init_universe(Vec::<&str>::new());
        filter.init_universe(["a", "b"]);
        assert_eq!(filter.selection(), &Selection::All);
        assert!(filter.matches(&"a"));
    }

    #[test]
    fn test_select_all_is_idempotent() {
        let mut filter = FilterSet::new();
        filter.init_universe(["a", "b", "c"]);
        filter.toggle(&"b", false);

        filter.select_all();
        let once = filter.clone();
        filter.select_all();
        assert_eq!(filter, once);
    }

    #[test]
    fn test_controller_skips_no_op_commits() {
        let rt = Runtime::new();
        let filter = FilterController::new(&rt);
        filter.init_universe(["a", "b"]);
        let version = filter.state().version();

        filter.select_all();
        filter.toggle(&"missing", false);
        assert_eq!(filter.state().version(), version);

        filter.toggle(&"a", false);
        assert_eq!(filter.state().version(), version + 1);
    }

    #[test]
    fn test_bound_universe_follows_data() {
        let rt = Runtime::new();
        let zones = rt.atom(Vec::<String>::new());
        let filter = FilterController::new(&rt);
        let binding = filter.bind_universe(
            &rt,
            rt.derive({
                let zones = zones.clone();
                move || zones.get()
            }),
        );
        assert!(filter.state().get().universe().is_empty());

        zones.set(vec!["north".into(), "south".into()]);
        filter.toggle(&"north".to_string(), false);
        assert!(filter.state().get().is_active());

        // "south" survives, so the pick holds and new keys stay unpicked
        zones.set(vec!["north".into(), "south".into(), "east".into()]);
        let state = filter.state().get();
        assert!(state.is_active());
        assert!(state.is_selected(&"south".to_string()));
        assert!(!state.is_selected(&"north".to_string()));
        assert!(!state.is_selected(&"east".to_string()));

        // The only picked key vanished
        zones.set(vec!["north".into(), "east".into()]);
        let state = filter.state().get();
        assert_eq!(state.selection(), &Selection::All);
        assert!(state.is_selected(&"north".to_string()));
        assert!(state.is_selected(&"east".to_string()));

        drop(binding);
        zones.set(vec!["west".into()]);
        assert_eq!(filter.state().get().universe().len(), 2);
        assert!(filter.state().get().universe().contains("north"));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Init(Vec<u8>),
        Toggle(u8, bool),
        SelectAll,
        Clear,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            prop::collection::vec(0u8..8, 0..6).prop_map(Op::Init),
            (0u8..10, any::<bool>()).prop_map(|(key, on)| Op::Toggle(key, on)),
            Just(Op::SelectAll),
            Just(Op::Clear),
        ]
    }

    proptest! {
        #[test]
        fn prop_selected_stays_within_universe(ops in prop::collection::vec(op(), 1..50)) {
            let mut filter = FilterSet::new();
            for op in ops {
                match op {
                    Op::Init(keys) => filter.init_universe(keys),
                    Op::Toggle(key, on) => {
                        filter.toggle(&key, on);
                    }
                    Op::SelectAll => filter.select_all(),
                    Op::Clear => filter.clear(),
                }
                prop_assert!(filter.selected().iter().all(|key| filter.universe().contains(key)));
            }
        }
    }
}
