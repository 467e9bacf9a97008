//! Edges of the byte automaton.
//!
//! An edge out of a [`ByteState`] on some byte is a [`ByteTransition`]. It is
//! built from *atoms*: a continuation state, a match (the value may end here
//! and satisfy a pattern) or a shortcut (an exact pattern whose remaining
//! bytes are checked directly instead of being spelled out as states).
//!
//! The canonical encoding of a set of atoms is:
//! - one atom: `State`, `Match` or `Shortcut`
//! - one state plus one match: `Composite`
//! - anything else: `Compound`, an immutable deduplicated member list with
//!   its derived views computed up front
//!
//! Transitions are never edited in place. Adding or removing an atom builds a
//! new transition, so a reader holding the old one is unaffected.

use std::sync::Arc;

use smallvec::SmallVec;

use super::byte_state::ByteState;
use super::name_state::NameState;
use crate::pattern::Pattern;

/// A pattern satisfied by the bytes consumed so far, and where to go next.
pub(crate) struct ByteMatch<X> {
    pub(crate) pattern: Pattern,
    pub(crate) next_name_state: Arc<NameState<X>>,
}

impl<X> ByteMatch<X> {
    pub(crate) fn new(pattern: Pattern, next_name_state: Arc<NameState<X>>) -> Self {
        Self {
            pattern,
            next_name_state,
        }
    }
}

impl<X> PartialEq for ByteMatch<X> {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern && Arc::ptr_eq(&self.next_name_state, &other.next_name_state)
    }
}

/// A single member of a transition.
pub(crate) enum Atom<X> {
    State(Arc<ByteState<X>>),
    Match(Arc<ByteMatch<X>>),
    Shortcut(Arc<ByteMatch<X>>),
}

impl<X> Clone for Atom<X> {
    fn clone(&self) -> Self {
        match self {
            Atom::State(s) => Atom::State(s.clone()),
            Atom::Match(m) => Atom::Match(m.clone()),
            Atom::Shortcut(m) => Atom::Shortcut(m.clone()),
        }
    }
}

impl<X> PartialEq for Atom<X> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Atom::State(a), Atom::State(b)) => Arc::ptr_eq(a, b),
            (Atom::Match(a), Atom::Match(b)) | (Atom::Shortcut(a), Atom::Shortcut(b)) => {
                Arc::ptr_eq(a, b) || a == b
            }
            _ => false,
        }
    }
}

pub(crate) enum ByteTransition<X> {
    State(Arc<ByteState<X>>),
    Match(Arc<ByteMatch<X>>),
    Composite {
        state: Arc<ByteState<X>>,
        byte_match: Arc<ByteMatch<X>>,
    },
    Shortcut(Arc<ByteMatch<X>>),
    Compound(Arc<CompoundTransition<X>>),
}

impl<X> Clone for ByteTransition<X> {
    fn clone(&self) -> Self {
        match self {
            ByteTransition::State(s) => ByteTransition::State(s.clone()),
            ByteTransition::Match(m) => ByteTransition::Match(m.clone()),
            ByteTransition::Composite { state, byte_match } => ByteTransition::Composite {
                state: state.clone(),
                byte_match: byte_match.clone(),
            },
            ByteTransition::Shortcut(m) => ByteTransition::Shortcut(m.clone()),
            ByteTransition::Compound(c) => ByteTransition::Compound(c.clone()),
        }
    }
}

/// A union of atoms that are simultaneously viable on one byte.
pub(crate) struct CompoundTransition<X> {
    members: SmallVec<[Atom<X>; 4]>,
    states: SmallVec<[Arc<ByteState<X>>; 2]>,
    matches: SmallVec<[Arc<ByteMatch<X>>; 2]>,
    shortcuts: SmallVec<[Arc<ByteMatch<X>>; 2]>,
}

impl<X> CompoundTransition<X> {
    fn new(members: SmallVec<[Atom<X>; 4]>) -> Self {
        let mut states = SmallVec::new();
        let mut matches = SmallVec::new();
        let mut shortcuts = SmallVec::new();
        for member in &members {
            match member {
                Atom::State(s) => states.push(s.clone()),
                Atom::Match(m) => matches.push(m.clone()),
                Atom::Shortcut(m) => shortcuts.push(m.clone()),
            }
        }
        Self {
            members,
            states,
            matches,
            shortcuts,
        }
    }

    pub(crate) fn members(&self) -> &[Atom<X>] {
        &self.members
    }
}

impl<X> ByteTransition<X> {
    pub(crate) fn from_atom(atom: Atom<X>) -> Self {
        match atom {
            Atom::State(s) => ByteTransition::State(s),
            Atom::Match(m) => ByteTransition::Match(m),
            Atom::Shortcut(m) => ByteTransition::Shortcut(m),
        }
    }

    /// Canonical transition for a set of atoms. Duplicates are dropped and an
    /// empty set yields `None`.
    pub(crate) fn coalesce<I>(atoms: I) -> Option<Self>
    where
        I: IntoIterator<Item = Atom<X>>,
    {
        let mut unique: SmallVec<[Atom<X>; 4]> = SmallVec::new();
        for atom in atoms {
            if !unique.contains(&atom) {
                unique.push(atom);
            }
        }
        Self::from_unique(unique)
    }

    fn from_unique(atoms: SmallVec<[Atom<X>; 4]>) -> Option<Self> {
        match atoms.as_slice() {
            [] => None,
            [atom] => Some(Self::from_atom(atom.clone())),
            [Atom::State(state), Atom::Match(byte_match)]
            | [Atom::Match(byte_match), Atom::State(state)] => Some(ByteTransition::Composite {
                state: state.clone(),
                byte_match: byte_match.clone(),
            }),
            _ => Some(ByteTransition::Compound(Arc::new(CompoundTransition::new(
                atoms,
            )))),
        }
    }

    /// The members of this transition as atoms.
    pub(crate) fn atoms(&self) -> SmallVec<[Atom<X>; 4]> {
        let mut atoms = SmallVec::new();
        match self {
            ByteTransition::State(s) => atoms.push(Atom::State(s.clone())),
            ByteTransition::Match(m) => atoms.push(Atom::Match(m.clone())),
            ByteTransition::Composite { state, byte_match } => {
                atoms.push(Atom::State(state.clone()));
                atoms.push(Atom::Match(byte_match.clone()));
            }
            ByteTransition::Shortcut(m) => atoms.push(Atom::Shortcut(m.clone())),
            ByteTransition::Compound(c) => atoms.extend(c.members.iter().cloned()),
        }
        atoms
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            ByteTransition::Composite { .. } => 2,
            ByteTransition::Compound(c) => c.members.len(),
            _ => 1,
        }
    }

    pub(crate) fn contains(&self, atom: &Atom<X>) -> bool {
        match atom {
            Atom::State(s) => self.states().iter().any(|t| Arc::ptr_eq(s, t)),
            Atom::Match(m) => self.matches().iter().any(|t| Arc::ptr_eq(m, t) || m == t),
            Atom::Shortcut(m) => self.shortcuts().iter().any(|t| Arc::ptr_eq(m, t) || m == t),
        }
    }

    /// This transition merged with `atom`.
    pub(crate) fn adding(&self, atom: Atom<X>) -> Option<Self> {
        if self.contains(&atom) {
            return Some(self.clone());
        }
        Self::coalesce(self.atoms().into_iter().chain(std::iter::once(atom)))
    }

    /// This transition without `atom`, or `None` if nothing is left.
    pub(crate) fn removing(&self, atom: &Atom<X>) -> Option<Self> {
        if !self.contains(atom) {
            return Some(self.clone());
        }
        Self::coalesce(self.atoms().into_iter().filter(|a| a != atom))
    }

    /// Swap `old` for `new`, keeping every other member.
    pub(crate) fn replacing(&self, old: &Atom<X>, new: Atom<X>) -> Option<Self> {
        Self::coalesce(
            self.atoms()
                .into_iter()
                .filter(|a| a != old)
                .chain(std::iter::once(new)),
        )
    }

    pub(crate) fn states(&self) -> &[Arc<ByteState<X>>] {
        match self {
            ByteTransition::State(s) | ByteTransition::Composite { state: s, .. } => {
                std::slice::from_ref(s)
            }
            ByteTransition::Compound(c) => &c.states,
            ByteTransition::Match(_) | ByteTransition::Shortcut(_) => &[],
        }
    }

    pub(crate) fn matches(&self) -> &[Arc<ByteMatch<X>>] {
        match self {
            ByteTransition::Match(m) | ByteTransition::Composite { byte_match: m, .. } => {
                std::slice::from_ref(m)
            }
            ByteTransition::Compound(c) => &c.matches,
            ByteTransition::State(_) | ByteTransition::Shortcut(_) => &[],
        }
    }

    pub(crate) fn shortcuts(&self) -> &[Arc<ByteMatch<X>>] {
        match self {
            ByteTransition::Shortcut(m) => std::slice::from_ref(m),
            ByteTransition::Compound(c) => &c.shortcuts,
            _ => &[],
        }
    }

    /// The unique continuation that is not an indeterminate prefix, if any.
    pub(crate) fn determinate_state(&self) -> Option<&Arc<ByteState<X>>> {
        self.states().iter().find(|s| !s.is_indeterminate())
    }

    /// Identity comparison, cheaper than [`PartialEq`] and used to share work
    /// across bytes that point at the same transition.
    pub(crate) fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ByteTransition::State(a), ByteTransition::State(b)) => Arc::ptr_eq(a, b),
            (ByteTransition::Match(a), ByteTransition::Match(b))
            | (ByteTransition::Shortcut(a), ByteTransition::Shortcut(b)) => Arc::ptr_eq(a, b),
            (
                ByteTransition::Composite {
                    state: sa,
                    byte_match: ma,
                },
                ByteTransition::Composite {
                    state: sb,
                    byte_match: mb,
                },
            ) => Arc::ptr_eq(sa, sb) && Arc::ptr_eq(ma, mb),
            (ByteTransition::Compound(a), ByteTransition::Compound(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Set equality over members.
impl<X> PartialEq for ByteTransition<X> {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        if self.len() != other.len() {
            return false;
        }
        self.atoms().iter().all(|atom| other.contains(atom))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(indeterminate: bool) -> Arc<ByteState<String>> {
        Arc::new(ByteState::new(indeterminate))
    }

    fn byte_match(value: &str) -> Arc<ByteMatch<String>> {
        Arc::new(ByteMatch::new(
            Pattern::exact(value),
            Arc::new(NameState::new()),
        ))
    }

    #[test]
    fn test_single_atoms_collapse() {
        let s = state(false);
        let t = ByteTransition::coalesce([Atom::State(s.clone()), Atom::State(s.clone())]).unwrap();
        assert!(matches!(t, ByteTransition::State(_)));
        assert!(ByteTransition::<String>::coalesce([]).is_none());
    }

    #[test]
    fn test_state_plus_match_is_composite() {
        let s = state(false);
        let m = byte_match("\"a\"");
        let t = ByteTransition::coalesce([Atom::Match(m.clone()), Atom::State(s.clone())]).unwrap();
        assert!(matches!(t, ByteTransition::Composite { .. }));
        assert_eq!(t.states().len(), 1);
        assert_eq!(t.matches().len(), 1);
    }

    #[test]
    fn test_compound_views_and_removal() {
        let s1 = state(true);
        let s2 = state(false);
        let m = byte_match("\"a\"");
        let sc = byte_match("\"b\"");
        let t = ByteTransition::coalesce([
            Atom::State(s1.clone()),
            Atom::State(s2.clone()),
            Atom::Match(m.clone()),
            Atom::Shortcut(sc.clone()),
        ])
        .unwrap();
        assert!(matches!(t, ByteTransition::Compound(_)));
        assert_eq!(t.states().len(), 2);
        assert_eq!(t.shortcuts().len(), 1);
        assert!(Arc::ptr_eq(t.determinate_state().unwrap(), &s2));

        let t = t.removing(&Atom::Shortcut(sc)).unwrap();
        let t = t.removing(&Atom::State(s1)).unwrap();
        assert!(matches!(t, ByteTransition::Composite { .. }));
        let t = t.removing(&Atom::State(s2)).unwrap();
        assert!(matches!(t, ByteTransition::Match(_)));
        assert!(t.removing(&Atom::Match(m)).is_none());
    }

    #[test]
    fn test_merge_is_order_independent() {
        let s = state(false);
        let m1 = byte_match("\"a\"");
        let m2 = byte_match("\"b\"");
        let a = ByteTransition::from_atom(Atom::State(s.clone()))
            .adding(Atom::Match(m1.clone()))
            .and_then(|t| t.adding(Atom::Match(m2.clone())))
            .unwrap();
        let b = ByteTransition::from_atom(Atom::Match(m2.clone()))
            .adding(Atom::State(s.clone()))
            .and_then(|t| t.adding(Atom::Match(m1.clone())))
            .and_then(|t| t.adding(Atom::Match(m1.clone())))
            .unwrap();
        assert!(a == b);
        assert_eq!(b.len(), 3);
    }

    #[test]
    fn test_replacing_never_duplicates_members() {
        let s1 = state(false);
        let s2 = state(true);
        let m = byte_match("\"a\"");
        let t = ByteTransition::coalesce([Atom::State(s1.clone()), Atom::State(s2.clone())]).unwrap();
        // s2 is already a member, so swapping s1 for it leaves one state.
        let t = t.replacing(&Atom::State(s1), Atom::State(s2.clone())).unwrap();
        assert!(matches!(t, ByteTransition::State(_)));
        assert!(t.determinate_state().is_none());

        let t = t.replacing(&Atom::State(s2), Atom::Shortcut(m.clone())).unwrap();
        assert!(matches!(t, ByteTransition::Shortcut(_)));
        let t = t.adding(Atom::Shortcut(m)).unwrap();
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn test_match_equality_is_structural() {
        let next = Arc::new(NameState::<String>::new());
        let a = Arc::new(ByteMatch::new(Pattern::exact("\"x\""), next.clone()));
        let b = Arc::new(ByteMatch::new(Pattern::exact("\"x\""), next));
        assert!(Atom::Match(a.clone()) == Atom::Match(b));
        assert!(Atom::Match(a.clone()) != Atom::Shortcut(a));
    }
}
