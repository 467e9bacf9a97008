//! Walking an event's fields through the name-state graph.
//!
//! A step pairs a name state with the index of the next field to try, the
//! array membership accumulated so far and the sub-rule ids still viable on
//! this path (`None` at the root, meaning "any"). Steps are processed from a
//! queue; the walk holds no locks and only reads immutable snapshots.

use std::collections::VecDeque;
use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::array_membership::ArrayMembership;
use crate::automaton::NameState;
use crate::event::Field;
use crate::pattern::Pattern;
use crate::sub_rule::RuleName;

type Candidates = Option<Arc<FxHashSet<u64>>>;

struct Step<X> {
    field_index: usize,
    state: Arc<NameState<X>>,
    candidates: Candidates,
    membership: ArrayMembership,
}

struct Task<'a, X> {
    fields: &'a [Field],
    queue: VecDeque<Step<X>>,
    seen: FxHashSet<X>,
    matched: Vec<X>,
}

impl<'a, X: RuleName> Task<'a, X> {
    fn record(&mut self, rule: &X) {
        if self.seen.insert(rule.clone()) {
            self.matched.push(rule.clone());
        }
    }

    /// Queue every field at or after `start_index` that `state` has a machine
    /// for, after following the absence transitions that hold.
    fn move_from(
        &mut self,
        candidates: &Candidates,
        state: &Arc<NameState<X>>,
        start_index: usize,
        membership: &ArrayMembership,
    ) {
        for (field, target) in state.must_not_exist_transitions().iter() {
            let present = self.fields.iter().any(|f| {
                f.name == *field && membership.is_consistent_with(&f.array_membership)
            });
            if !present {
                self.on_match(candidates, &Pattern::Absent, target, start_index, membership);
            }
        }

        for index in start_index..self.fields.len() {
            if state.has_value_transition(&self.fields[index].name) {
                self.queue.push_back(Step {
                    field_index: index,
                    state: state.clone(),
                    candidates: candidates.clone(),
                    membership: membership.clone(),
                });
            }
        }
    }

    fn process(&mut self, step: Step<X>) {
        let fields = self.fields;
        let field = &fields[step.field_index];
        let Some(membership) = step.membership.check_consistency(&field.array_membership) else {
            return;
        };
        let Some(machine) = step.state.byte_machine(&field.name) else {
            return;
        };
        for byte_match in machine.transition_on(&field.value) {
            self.on_match(
                &step.candidates,
                &byte_match.pattern,
                &byte_match.next_name_state,
                step.field_index + 1,
                &membership,
            );
        }
    }

    /// `pattern` led to `next`: report the sub-rules it completes and carry
    /// on with those it advances.
    fn on_match(
        &mut self,
        candidates: &Candidates,
        pattern: &Pattern,
        next: &Arc<NameState<X>>,
        next_index: usize,
        membership: &ArrayMembership,
    ) {
        if let Some(terminal) = next.terminal_sub_rules(pattern) {
            for (id, context) in terminal.iter() {
                if candidates.as_ref().map_or(true, |c| c.contains(id)) {
                    self.record(context.rule());
                }
            }
        }

        let Some(non_terminal) = next.non_terminal_sub_rules(pattern) else {
            return;
        };
        let remaining: FxHashSet<u64> = match candidates {
            None => non_terminal.keys().copied().collect(),
            Some(c) => non_terminal.keys().filter(|id| c.contains(id)).copied().collect(),
        };
        if remaining.is_empty() {
            return;
        }
        self.move_from(&Some(Arc::new(remaining)), next, next_index, membership);
    }
}

/// Names of every rule with a sub-rule fully satisfied by `fields`, which
/// must be sorted by name. Each name is reported once.
pub(crate) fn find<X: RuleName>(root: &Arc<NameState<X>>, fields: &[Field]) -> Vec<X> {
    let mut task = Task {
        fields,
        queue: VecDeque::new(),
        seen: FxHashSet::default(),
        matched: Vec::new(),
    };
    task.move_from(&None, root, 0, &ArrayMembership::new());
    while let Some(step) = task.queue.pop_front() {
        task.process(step);
    }
    task.matched
}
