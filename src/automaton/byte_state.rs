//! Nodes of the byte automaton.
//!
//! A [`ByteState`] owns nothing but its outgoing edges. The edge table lives
//! behind an `ArcSwapOption` and is replaced wholesale on every change, so a
//! concurrent reader always sees either the old table or the new one. All
//! mutating methods are meant to be called by the single writer.

use std::sync::Arc;

use arc_swap::ArcSwapOption;

use super::byte_map::ByteMap;
use super::transition::{Atom, ByteTransition};

/// The edge table of a state. Most states have exactly one outgoing byte.
pub(crate) enum TransitionStore<X> {
    Single {
        byte: u8,
        transition: ByteTransition<X>,
    },
    Map(ByteMap<X>),
}

pub(crate) struct ByteState<X> {
    transitions: ArcSwapOption<TransitionStore<X>>,
    /// Set when the state can be reached by more than one byte sequence.
    /// Such states are never reused for a new literal path.
    indeterminate_prefix: bool,
}

impl<X> ByteState<X> {
    pub(crate) fn new(indeterminate_prefix: bool) -> Self {
        Self {
            transitions: ArcSwapOption::empty(),
            indeterminate_prefix,
        }
    }

    #[inline]
    pub(crate) fn is_indeterminate(&self) -> bool {
        self.indeterminate_prefix
    }

    #[inline]
    pub(crate) fn transition(&self, byte: u8) -> Option<ByteTransition<X>> {
        let guard = self.transitions.load();
        match guard.as_deref()? {
            TransitionStore::Single {
                byte: only,
                transition,
            } => (*only == byte).then(|| transition.clone()),
            TransitionStore::Map(map) => map.get(byte).cloned(),
        }
    }

    /// The transition every byte leads to, or `None` if bytes disagree or
    /// some byte has no transition.
    pub(crate) fn transition_for_all_bytes(&self) -> Option<ByteTransition<X>> {
        let guard = self.transitions.load();
        match guard.as_deref()? {
            TransitionStore::Single { .. } => None,
            TransitionStore::Map(map) => map.all_bytes().cloned(),
        }
    }

    /// Snapshot of the non-empty byte ranges, as inclusive bounds.
    pub(crate) fn ranges(&self) -> Vec<(u8, u8, ByteTransition<X>)> {
        let guard = self.transitions.load();
        match guard.as_deref() {
            None => Vec::new(),
            Some(TransitionStore::Single { byte, transition }) => {
                vec![(*byte, *byte, transition.clone())]
            }
            Some(TransitionStore::Map(map)) => map
                .ranges()
                .map(|(low, high, t)| (low, high, t.clone()))
                .collect(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.transitions.load().is_none()
    }

    /// The only outgoing edge, when exactly one byte has a transition.
    pub(crate) fn single_transition(&self) -> Option<(u8, ByteTransition<X>)> {
        let guard = self.transitions.load();
        match guard.as_deref()? {
            TransitionStore::Single { byte, transition } => Some((*byte, transition.clone())),
            TransitionStore::Map(map) => map.single_byte().map(|(b, t)| (b, t.clone())),
        }
    }

    /// True when the state's only edge is a loop back to itself on every byte.
    pub(crate) fn has_only_self_referential_transition(&self) -> bool {
        match self.transition_for_all_bytes() {
            Some(ByteTransition::State(s)) => std::ptr::eq(Arc::as_ptr(&s), self),
            _ => false,
        }
    }

    /// True when every byte has an edge to `target`, possibly alongside
    /// other edges.
    pub(crate) fn reaches_on_every_byte(&self, target: &ByteState<X>) -> bool {
        let mut covered = 0usize;
        for (low, high, transition) in self.ranges() {
            if low as usize != covered {
                return false;
            }
            if !transition
                .states()
                .iter()
                .any(|s| std::ptr::eq(Arc::as_ptr(s), target))
            {
                return false;
            }
            covered = high as usize + 1;
        }
        covered == 256
    }

    /// Merge `atom` into the edge on `byte`.
    pub(crate) fn add_transition(&self, byte: u8, atom: Atom<X>) {
        self.add_transition_range(byte, byte, atom);
    }

    pub(crate) fn add_transition_range(&self, low: u8, high: u8, atom: Atom<X>) {
        self.update(low, high, |current| match current {
            Some(t) => t.adding(atom.clone()),
            None => Some(ByteTransition::from_atom(atom.clone())),
        });
    }

    pub(crate) fn add_transition_for_all_bytes(&self, atom: Atom<X>) {
        self.add_transition_range(0, u8::MAX, atom);
    }

    /// Drop `atom` from the edge on `byte`.
    pub(crate) fn remove_transition(&self, byte: u8, atom: &Atom<X>) {
        self.remove_transition_range(byte, byte, atom);
    }

    pub(crate) fn remove_transition_range(&self, low: u8, high: u8, atom: &Atom<X>) {
        self.update(low, high, |current| current.and_then(|t| t.removing(atom)));
    }

    pub(crate) fn remove_transition_for_all_bytes(&self, atom: &Atom<X>) {
        self.remove_transition_range(0, u8::MAX, atom);
    }

    /// Swap one member of the edge on `byte` for another in a single update.
    pub(crate) fn replace_transition(&self, byte: u8, old: &Atom<X>, new: Atom<X>) {
        self.update(byte, byte, |current| match current {
            Some(t) => t.replacing(old, new.clone()),
            None => Some(ByteTransition::from_atom(new.clone())),
        });
    }

    /// Drop every edge.
    pub(crate) fn clear(&self) {
        self.transitions.store(None);
    }

    fn update<F>(&self, low: u8, high: u8, f: F)
    where
        F: FnMut(Option<&ByteTransition<X>>) -> Option<ByteTransition<X>>,
    {
        let current = self.transitions.load_full();
        let single;
        let map = match current.as_deref() {
            Some(TransitionStore::Map(map)) => map,
            Some(TransitionStore::Single { byte, transition }) => {
                single = ByteMap::single(*byte, transition.clone());
                &single
            }
            None => {
                single = ByteMap::new();
                &single
            }
        };
        if let Some(updated) = map.update(low, high, f) {
            self.transitions.store(Self::compact(updated));
        }
    }

    fn compact(map: ByteMap<X>) -> Option<Arc<TransitionStore<X>>> {
        if map.is_empty() {
            return None;
        }
        if let Some((byte, transition)) = map.single_byte() {
            return Some(Arc::new(TransitionStore::Single {
                byte,
                transition: transition.clone(),
            }));
        }
        Some(Arc::new(TransitionStore::Map(map)))
    }
}
