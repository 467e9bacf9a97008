//! Worst-case matching cost of wildcard-bearing machines.
//!
//! Reading a value keeps a set of active byte states. For literal patterns the
//! set never grows beyond one, but every wildcard adds a state that stays
//! active for the rest of the value. The evaluator explores the reachable
//! sets breadth first and reports the largest one it finds.

use std::collections::VecDeque;
use std::sync::Arc;

use rustc_hash::FxHashSet;

use super::byte_machine::ByteMachine;
use super::byte_state::ByteState;
use super::name_state::NameState;

/// Bounds the work done when evaluating a machine's complexity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineComplexityEvaluator {
    max_complexity: usize,
}

type StateSet<X> = Vec<Arc<ByteState<X>>>;

fn key<X>(states: &StateSet<X>) -> Vec<usize> {
    let mut key: Vec<usize> = states.iter().map(|s| Arc::as_ptr(s) as usize).collect();
    key.sort_unstable();
    key
}

impl MachineComplexityEvaluator {
    pub fn new(max_complexity: usize) -> Self {
        Self { max_complexity }
    }

    pub fn max_complexity(&self) -> usize {
        self.max_complexity
    }

    /// The largest active-state set of any machine reachable from `root`,
    /// capped at the maximum.
    pub(crate) fn evaluate<X>(&self, root: &Arc<NameState<X>>) -> usize {
        let mut visited = FxHashSet::default();
        self.evaluate_name_state(root, &mut visited)
    }

    fn evaluate_name_state<X>(&self, state: &Arc<NameState<X>>, visited: &mut FxHashSet<usize>) -> usize {
        if !visited.insert(Arc::as_ptr(state) as usize) {
            return 0;
        }
        let mut worst = 0;
        for machine in state.byte_machines() {
            worst = worst.max(self.evaluate_byte_machine(&machine));
            for byte_match in machine.byte_matches() {
                if worst >= self.max_complexity {
                    return self.max_complexity;
                }
                worst = worst.max(self.evaluate_name_state(&byte_match.next_name_state, visited));
            }
        }
        for next in state.linked_name_states() {
            if worst >= self.max_complexity {
                break;
            }
            worst = worst.max(self.evaluate_name_state(&next, visited));
        }
        worst.min(self.max_complexity)
    }

    fn evaluate_byte_machine<X>(&self, machine: &ByteMachine<X>) -> usize {
        if !machine.has_complexity() {
            return usize::from(!machine.is_empty());
        }

        let start: StateSet<X> = vec![machine.start().clone()];
        let mut seen: FxHashSet<Vec<usize>> = FxHashSet::default();
        seen.insert(key(&start));
        let mut queue = VecDeque::from([start]);
        let mut worst = 1;

        while let Some(states) = queue.pop_front() {
            worst = worst.max(states.len());
            if worst >= self.max_complexity {
                return self.max_complexity;
            }

            // Bytes between consecutive boundaries behave identically.
            let mut boundaries: Vec<usize> = vec![0, 256];
            for state in &states {
                for (low, high, _) in state.ranges() {
                    boundaries.push(low as usize);
                    boundaries.push(high as usize + 1);
                }
            }
            boundaries.sort_unstable();
            boundaries.dedup();

            for window in boundaries.windows(2) {
                let byte = window[0] as u8;
                let mut next: StateSet<X> = Vec::new();
                for state in &states {
                    if let Some(transition) = state.transition(byte) {
                        for s in transition.states() {
                            if !next.iter().any(|n| Arc::ptr_eq(n, s)) {
                                next.push(s.clone());
                            }
                        }
                    }
                }
                if next.is_empty() {
                    continue;
                }
                if seen.insert(key(&next)) {
                    queue.push_back(next);
                }
            }
        }
        worst
    }
}
