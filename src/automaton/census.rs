//! Approximate object counting over the whole graph.
//!
//! Objects are counted once each by identity: name states, byte machines,
//! byte states, byte matches (a shortcut is its byte match) and compound
//! transitions. Compound transitions are rebuilt on every edit, so two with the
//! same members count once.

use std::sync::Arc;

use rustc_hash::FxHashSet;

use super::byte_machine::ByteMachine;
use super::name_state::NameState;
use super::transition::{Atom, ByteMatch, ByteTransition};

struct Census {
    seen: FxHashSet<usize>,
    compounds: FxHashSet<Vec<usize>>,
    count: usize,
    max: usize,
}

fn address<T>(ptr: *const T) -> usize {
    ptr as *const () as usize
}

impl Census {
    fn full(&self) -> bool {
        self.count >= self.max
    }

    fn first_sighting(&mut self, addr: usize) -> bool {
        let new = self.seen.insert(addr);
        if new {
            self.count += 1;
        }
        new
    }

    fn name_state<X>(&mut self, state: &Arc<NameState<X>>) {
        if self.full() || !self.first_sighting(address(Arc::as_ptr(state))) {
            return;
        }
        for machine in state.byte_machines() {
            self.byte_machine(&machine);
        }
        for next in state.linked_name_states() {
            self.name_state(&next);
        }
    }

    fn byte_machine<X>(&mut self, machine: &Arc<ByteMachine<X>>) {
        if self.full() || !self.first_sighting(address(Arc::as_ptr(machine))) {
            return;
        }
        for byte_match in machine.start_state_matches().iter() {
            self.byte_match(byte_match);
        }

        let mut stack = vec![machine.start().clone()];
        while let Some(state) = stack.pop() {
            if self.full() {
                return;
            }
            if !self.first_sighting(address(Arc::as_ptr(&state))) {
                continue;
            }
            for (_, _, transition) in state.ranges() {
                if let ByteTransition::Compound(compound) = &transition {
                    let mut key: Vec<usize> = compound.members().iter().map(atom_address).collect();
                    key.sort_unstable();
                    if self.compounds.insert(key) {
                        self.count += 1;
                    }
                }
                for byte_match in transition.matches().iter().chain(transition.shortcuts()) {
                    self.byte_match(byte_match);
                }
                stack.extend(transition.states().iter().cloned());
            }
        }

        for byte_match in machine.byte_matches() {
            self.name_state(&byte_match.next_name_state);
        }
    }

    fn byte_match<X>(&mut self, byte_match: &Arc<ByteMatch<X>>) {
        self.first_sighting(address(Arc::as_ptr(byte_match)));
    }
}

fn atom_address<X>(atom: &Atom<X>) -> usize {
    match atom {
        Atom::State(s) => address(Arc::as_ptr(s)),
        Atom::Match(m) | Atom::Shortcut(m) => address(Arc::as_ptr(m)),
    }
}

/// Count the objects reachable from `root`, stopping once `max` is reached.
pub(crate) fn approximate_object_count<X>(root: &Arc<NameState<X>>, max: usize) -> usize {
    let mut census = Census {
        seen: FxHashSet::default(),
        compounds: FxHashSet::default(),
        count: 0,
        max,
    };
    census.name_state(root);
    census.count.min(max)
}
