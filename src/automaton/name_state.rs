//! Nodes of the field-name graph.
//!
//! A rule with fields `a`, `b`, `c` is threaded through three byte machines:
//! the machine for `a` at the start state leads, through a match, to a name
//! state holding the machine for `b`, and so on. Each name state also records
//! which sub-rules the pattern that led into it belongs to, split into
//! *terminal* (the sub-rule is complete here) and *non-terminal* (more fields
//! are required).
//!
//! Every table is an immutable map behind an `ArcSwap`; the writer clones,
//! edits and swaps it, so readers never observe a half-applied change.

use std::hash::Hash;
use std::sync::Arc;

use arc_swap::ArcSwap;
use rustc_hash::FxHashMap;

use super::byte_machine::ByteMachine;
use crate::pattern::Pattern;
use crate::sub_rule::SubRuleContext;

/// Sub-rules keyed by id.
pub(crate) type SubRuleSet<X> = FxHashMap<u64, Arc<SubRuleContext<X>>>;

struct SubRuleTable<X> {
    terminal: FxHashMap<Pattern, Arc<SubRuleSet<X>>>,
    non_terminal: FxHashMap<Pattern, Arc<SubRuleSet<X>>>,
}

impl<X> SubRuleTable<X> {
    fn new() -> Self {
        Self {
            terminal: FxHashMap::default(),
            non_terminal: FxHashMap::default(),
        }
    }

    fn side(&self, terminal: bool) -> &FxHashMap<Pattern, Arc<SubRuleSet<X>>> {
        if terminal {
            &self.terminal
        } else {
            &self.non_terminal
        }
    }

    fn side_mut(&mut self, terminal: bool) -> &mut FxHashMap<Pattern, Arc<SubRuleSet<X>>> {
        if terminal {
            &mut self.terminal
        } else {
            &mut self.non_terminal
        }
    }
}

impl<X> Clone for SubRuleTable<X> {
    fn clone(&self) -> Self {
        Self {
            terminal: self.terminal.clone(),
            non_terminal: self.non_terminal.clone(),
        }
    }
}

pub(crate) struct NameState<X> {
    /// Field name to the byte machine matching that field's values.
    value_transitions: ArcSwap<FxHashMap<String, Arc<ByteMachine<X>>>>,
    /// Field name to the state reached when that field is absent.
    must_not_exist: ArcSwap<FxHashMap<String, Arc<NameState<X>>>>,
    /// Canonical next state per field, when name-state reuse is enabled.
    key_to_next: ArcSwap<FxHashMap<String, Arc<NameState<X>>>>,
    sub_rules: ArcSwap<SubRuleTable<X>>,
}

/// Clone-edit-swap for the writer.
fn update_map<K, V, F>(map: &ArcSwap<FxHashMap<K, V>>, f: F)
where
    K: Clone + Eq + Hash,
    V: Clone,
    F: FnOnce(&mut FxHashMap<K, V>),
{
    let mut updated = (**map.load()).clone();
    f(&mut updated);
    map.store(Arc::new(updated));
}

impl<X> NameState<X> {
    pub(crate) fn new() -> Self {
        Self {
            value_transitions: ArcSwap::from_pointee(FxHashMap::default()),
            must_not_exist: ArcSwap::from_pointee(FxHashMap::default()),
            key_to_next: ArcSwap::from_pointee(FxHashMap::default()),
            sub_rules: ArcSwap::from_pointee(SubRuleTable::new()),
        }
    }

    #[inline]
    pub(crate) fn byte_machine(&self, field: &str) -> Option<Arc<ByteMachine<X>>> {
        self.value_transitions.load().get(field).cloned()
    }

    #[inline]
    pub(crate) fn has_value_transition(&self, field: &str) -> bool {
        self.value_transitions.load().contains_key(field)
    }

    pub(crate) fn byte_machines(&self) -> Vec<Arc<ByteMachine<X>>> {
        self.value_transitions.load().values().cloned().collect()
    }

    pub(crate) fn get_or_create_byte_machine(&self, field: &str) -> Arc<ByteMachine<X>> {
        if let Some(machine) = self.byte_machine(field) {
            return machine;
        }
        let machine = Arc::new(ByteMachine::new());
        let inserted = machine.clone();
        update_map(&self.value_transitions, |map| {
            map.insert(field.to_string(), inserted);
        });
        machine
    }

    pub(crate) fn remove_byte_machine(&self, field: &str) {
        if self.has_value_transition(field) {
            update_map(&self.value_transitions, |map| {
                map.remove(field);
            });
        }
    }

    pub(crate) fn must_not_exist(&self, field: &str) -> Option<Arc<NameState<X>>> {
        self.must_not_exist.load().get(field).cloned()
    }

    /// Snapshot of the absence table, for traversal.
    pub(crate) fn must_not_exist_transitions(&self) -> Arc<FxHashMap<String, Arc<NameState<X>>>> {
        self.must_not_exist.load_full()
    }

    pub(crate) fn add_must_not_exist(&self, field: &str, next: Arc<NameState<X>>) {
        update_map(&self.must_not_exist, |map| {
            map.insert(field.to_string(), next);
        });
    }

    pub(crate) fn remove_must_not_exist(&self, field: &str) {
        if self.must_not_exist.load().contains_key(field) {
            update_map(&self.must_not_exist, |map| {
                map.remove(field);
            });
        }
    }

    pub(crate) fn next_name_state_for_key(&self, field: &str) -> Option<Arc<NameState<X>>> {
        self.key_to_next.load().get(field).cloned()
    }

    pub(crate) fn set_next_name_state_for_key(&self, field: &str, next: Arc<NameState<X>>) {
        update_map(&self.key_to_next, |map| {
            map.insert(field.to_string(), next);
        });
    }

    pub(crate) fn remove_next_name_state_for_key(&self, field: &str) {
        if self.key_to_next.load().contains_key(field) {
            update_map(&self.key_to_next, |map| {
                map.remove(field);
            });
        }
    }

    /// Every name state directly reachable without consuming a value: the
    /// absence targets and the reused per-key states.
    pub(crate) fn linked_name_states(&self) -> Vec<Arc<NameState<X>>> {
        let mut linked: Vec<Arc<NameState<X>>> =
            self.must_not_exist.load().values().cloned().collect();
        linked.extend(self.key_to_next.load().values().cloned());
        linked
    }

    /// Record that reaching this state through `pattern` advances `context`.
    /// Returns false when it was already recorded.
    pub(crate) fn add_sub_rule(
        &self,
        pattern: &Pattern,
        context: Arc<SubRuleContext<X>>,
        terminal: bool,
    ) -> bool {
        let id = context.id();
        let mut table = (**self.sub_rules.load()).clone();
        let set = table.side_mut(terminal).entry(pattern.clone()).or_default();
        if set.contains_key(&id) {
            return false;
        }
        Arc::make_mut(set).insert(id, context);
        self.sub_rules.store(Arc::new(table));
        true
    }

    /// Undo [`NameState::add_sub_rule`]. Returns false when nothing was recorded.
    pub(crate) fn remove_sub_rule(&self, pattern: &Pattern, id: u64, terminal: bool) -> bool {
        let current = self.sub_rules.load_full();
        let present = current
            .side(terminal)
            .get(pattern)
            .is_some_and(|set| set.contains_key(&id));
        if !present {
            return false;
        }

        let mut table = (*current).clone();
        let sets = table.side_mut(terminal);
        let now_empty = match sets.get_mut(pattern) {
            Some(set) => {
                Arc::make_mut(set).remove(&id);
                set.is_empty()
            }
            None => false,
        };
        if now_empty {
            sets.remove(pattern);
        }
        self.sub_rules.store(Arc::new(table));
        true
    }

    #[inline]
    pub(crate) fn terminal_sub_rules(&self, pattern: &Pattern) -> Option<Arc<SubRuleSet<X>>> {
        self.sub_rules.load().terminal.get(pattern).cloned()
    }

    #[inline]
    pub(crate) fn non_terminal_sub_rules(&self, pattern: &Pattern) -> Option<Arc<SubRuleSet<X>>> {
        self.sub_rules.load().non_terminal.get(pattern).cloned()
    }

    /// True while any sub-rule still arrives here through `pattern`.
    pub(crate) fn has_sub_rules_for(&self, pattern: &Pattern) -> bool {
        let table = self.sub_rules.load();
        table.terminal.contains_key(pattern) || table.non_terminal.contains_key(pattern)
    }

    pub(crate) fn is_empty(&self) -> bool {
        let table = self.sub_rules.load();
        self.value_transitions.load().is_empty()
            && self.must_not_exist.load().is_empty()
            && self.key_to_next.load().is_empty()
            && table.terminal.is_empty()
            && table.non_terminal.is_empty()
    }
}
