//! The public rule matcher.
//!
//! A [`Machine`] stores named rules and reports which of them an event
//! satisfies. Adding and deleting rules is serialized through one writer
//! lock; matching never locks and may run on any number of threads while the
//! machine is being changed.

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use tracing::debug;

use crate::automaton::{self, ByteMachine, MachineComplexityEvaluator, NameState};
use crate::error::{Result, RulerError};
use crate::event::{self, Event, Field};
use crate::finder;
use crate::pattern::Pattern;
use crate::rule_compiler;
use crate::sub_rule::{Generator, RuleName, SubRule, SubRuleContext};

/// Most fields a single sub-rule may name.
pub const MAX_RULE_FIELDS: usize = 256;

/// Tuning knobs for a [`Machine`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// Give every (name state, field) pair one canonical next name state
    /// that all new patterns of that field share, across rules.
    pub additional_name_state_reuse: bool,
}

/// Builder for [`Machine`].
#[derive(Debug, Clone, Default)]
pub struct MachineBuilder {
    config: MachineConfig,
}

impl MachineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_additional_name_state_reuse(mut self, enabled: bool) -> Self {
        self.config.additional_name_state_reuse = enabled;
        self
    }

    pub fn build<X: RuleName>(self) -> Machine<X> {
        Machine::with_config(self.config)
    }
}

type FieldPatterns<'a> = (&'a String, &'a Vec<Pattern>);

/// Matches events against a set of named rules.
///
/// Share it between threads with an `Arc`:
/// ```
/// use std::sync::Arc;
/// use ruler::Machine;
///
/// let machine = Arc::new(Machine::<String>::new());
/// machine
///     .add_json_rule("active".to_string(), r#"{"status": ["active"]}"#)
///     .unwrap();
///
/// let reader = Arc::clone(&machine);
/// let matched = std::thread::spawn(move || {
///     reader.rules_for_json_event(r#"{"status": "active"}"#).unwrap()
/// })
/// .join()
/// .unwrap();
/// assert_eq!(matched, vec!["active".to_string()]);
/// ```
pub struct Machine<X = String> {
    start: Arc<NameState<X>>,
    writer: Mutex<Generator<X>>,
    /// How many stored sub-rules name each field, absence included.
    used_fields: ArcSwap<FxHashMap<String, usize>>,
    config: MachineConfig,
}

impl<X: RuleName> Default for Machine<X> {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine {
    /// Start configuring a machine. The rule name type is picked by
    /// [`MachineBuilder::build`].
    pub fn builder() -> MachineBuilder {
        MachineBuilder::new()
    }
}

impl<X: RuleName> Machine<X> {
    pub fn new() -> Self {
        Self::with_config(MachineConfig::default())
    }

    pub fn with_config(config: MachineConfig) -> Self {
        Self {
            start: Arc::new(NameState::new()),
            writer: Mutex::new(Generator::new()),
            used_fields: ArcSwap::from_pointee(FxHashMap::default()),
            config,
        }
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// Add one sub-rule under `name`. Adding the same sub-rule twice is a
    /// no-op.
    pub fn add_rule(&self, name: X, sub_rule: &SubRule) -> Result<()> {
        validate(sub_rule)?;
        let mut generator = self.writer.lock();
        self.add_locked(&mut generator, name, sub_rule)
    }

    /// Add several alternative sub-rules under `name`; the rule matches when
    /// any one of them does.
    pub fn add_rules(&self, name: X, sub_rules: &[SubRule]) -> Result<()> {
        for sub_rule in sub_rules {
            validate(sub_rule)?;
        }
        let mut generator = self.writer.lock();
        for sub_rule in sub_rules {
            self.add_locked(&mut generator, name.clone(), sub_rule)?;
        }
        Ok(())
    }

    /// Compile a JSON rule document and add it under `name`.
    pub fn add_json_rule(&self, name: X, json: &str) -> Result<()> {
        let sub_rules = rule_compiler::compile(json)?;
        self.add_rules(name, &sub_rules)
    }

    /// Remove one sub-rule of `name`. Unknown sub-rules are ignored.
    pub fn delete_rule(&self, name: &X, sub_rule: &SubRule) -> Result<()> {
        let mut generator = self.writer.lock();
        self.delete_locked(&mut generator, name, sub_rule)
    }

    pub fn delete_rules(&self, name: &X, sub_rules: &[SubRule]) -> Result<()> {
        let mut generator = self.writer.lock();
        for sub_rule in sub_rules {
            self.delete_locked(&mut generator, name, sub_rule)?;
        }
        Ok(())
    }

    /// Remove the sub-rules a JSON rule document compiles into.
    pub fn delete_json_rule(&self, name: &X, json: &str) -> Result<()> {
        let sub_rules = rule_compiler::compile(json)?;
        self.delete_rules(name, &sub_rules)
    }

    /// Names of the rules matched by already-flattened fields.
    pub fn rules_for_event(&self, fields: &[Field]) -> Vec<X> {
        if event::is_sorted(fields) {
            finder::find(&self.start, fields)
        } else {
            let mut sorted = fields.to_vec();
            event::sort_fields(&mut sorted);
            finder::find(&self.start, &sorted)
        }
    }

    /// Flatten a JSON event and return the names of the rules it matches.
    /// Fields no rule mentions are skipped while flattening.
    pub fn rules_for_json_event(&self, json: &str) -> Result<Vec<X>> {
        let used = self.used_fields.load();
        let keep = |name: &str| used.contains_key(name);
        let event = Event::flatten_json(json, Some(&keep))?;
        Ok(finder::find(&self.start, event.fields()))
    }

    /// True when no rule is stored.
    pub fn is_empty(&self) -> bool {
        self.start.is_empty()
    }

    /// True when some stored rule names `field`.
    pub fn is_field_used(&self, field: &str) -> bool {
        self.used_fields.load().contains_key(field)
    }

    /// Number of automaton objects, counted up to `max`.
    pub fn approximate_object_count(&self, max: usize) -> usize {
        automaton::approximate_object_count(&self.start, max)
    }

    /// The largest number of byte states a single value can keep active,
    /// up to the evaluator's maximum.
    pub fn evaluate_complexity(&self, evaluator: &MachineComplexityEvaluator) -> usize {
        evaluator.evaluate(&self.start)
    }

    fn add_locked(&self, generator: &mut Generator<X>, name: X, sub_rule: &SubRule) -> Result<()> {
        if generator.find(&name, sub_rule).is_some() {
            debug!(rule = ?name, "sub-rule already present");
            return Ok(());
        }
        let context = generator.generate(name.clone(), sub_rule.clone());
        let fields: Vec<FieldPatterns<'_>> = sub_rule.iter().collect();
        self.add_step(&self.start, &fields, &context)?;
        self.adjust_used_fields(sub_rule, true);
        debug!(
            rule = ?name,
            id = context.id(),
            fields = fields.len(),
            sub_rules = generator.len(),
            "added sub-rule"
        );
        Ok(())
    }

    fn delete_locked(&self, generator: &mut Generator<X>, name: &X, sub_rule: &SubRule) -> Result<()> {
        let Some(context) = generator.remove(name, sub_rule) else {
            debug!(rule = ?name, "no such sub-rule to delete");
            return Ok(());
        };
        let fields: Vec<FieldPatterns<'_>> = sub_rule.iter().collect();
        self.delete_step(&self.start, &fields, context.id())?;
        self.adjust_used_fields(sub_rule, false);
        debug!(
            rule = ?name,
            id = context.id(),
            sub_rules = generator.len(),
            "deleted sub-rule"
        );
        Ok(())
    }

    /// Thread the first field's patterns out of `state`, then the rest of the
    /// fields out of every state those patterns lead to.
    fn add_step(
        &self,
        state: &Arc<NameState<X>>,
        fields: &[FieldPatterns<'_>],
        context: &Arc<SubRuleContext<X>>,
    ) -> Result<()> {
        let Some(((field, patterns), rest)) = fields.split_first() else {
            return Ok(());
        };
        let terminal = rest.is_empty();
        let mut fresh = None;
        let mut next_states: Vec<Arc<NameState<X>>> = Vec::new();

        for pattern in patterns.iter() {
            let next = if matches!(pattern, Pattern::Absent) {
                match state.must_not_exist(field) {
                    Some(existing) => existing,
                    None => {
                        let next = self.next_name_state(state, field, &mut fresh);
                        state.add_must_not_exist(field, next.clone());
                        next
                    }
                }
            } else {
                let machine: Arc<ByteMachine<X>> = state.get_or_create_byte_machine(field);
                match machine.find_pattern(pattern) {
                    Some(existing) => existing,
                    None => {
                        let next = self.next_name_state(state, field, &mut fresh);
                        machine.add_pattern(pattern, next)?
                    }
                }
            };
            next.add_sub_rule(pattern, context.clone(), terminal);
            if !next_states.iter().any(|s| Arc::ptr_eq(s, &next)) {
                next_states.push(next);
            }
        }

        if !terminal {
            for next in &next_states {
                self.add_step(next, rest, context)?;
            }
        }
        Ok(())
    }

    fn next_name_state(
        &self,
        state: &Arc<NameState<X>>,
        field: &str,
        fresh: &mut Option<Arc<NameState<X>>>,
    ) -> Arc<NameState<X>> {
        if self.config.additional_name_state_reuse {
            if let Some(existing) = state.next_name_state_for_key(field) {
                return existing;
            }
            let next = Arc::new(NameState::new());
            state.set_next_name_state_for_key(field, next.clone());
            return next;
        }
        fresh.get_or_insert_with(|| Arc::new(NameState::new())).clone()
    }

    fn delete_step(&self, state: &Arc<NameState<X>>, fields: &[FieldPatterns<'_>], id: u64) -> Result<()> {
        let Some(((field, patterns), rest)) = fields.split_first() else {
            return Ok(());
        };
        let terminal = rest.is_empty();

        for pattern in patterns.iter() {
            let absent = matches!(pattern, Pattern::Absent);
            let next = if absent {
                state.must_not_exist(field)
            } else {
                state
                    .byte_machine(field)
                    .and_then(|machine| machine.find_pattern(pattern))
            };
            let Some(next) = next else {
                continue;
            };

            if !terminal {
                self.delete_step(&next, rest, id)?;
            }
            next.remove_sub_rule(pattern, id, terminal);
            if next.has_sub_rules_for(pattern) {
                continue;
            }

            if absent {
                state.remove_must_not_exist(field);
            } else if let Some(machine) = state.byte_machine(field) {
                machine.delete_pattern(pattern)?;
                if machine.is_empty() {
                    state.remove_byte_machine(field);
                }
            }
            if next.is_empty()
                && state
                    .next_name_state_for_key(field)
                    .is_some_and(|reused| Arc::ptr_eq(&reused, &next))
            {
                state.remove_next_name_state_for_key(field);
            }
        }
        Ok(())
    }

    fn adjust_used_fields(&self, sub_rule: &SubRule, added: bool) {
        let mut used = (**self.used_fields.load()).clone();
        for field in sub_rule.keys() {
            if added {
                *used.entry(field.clone()).or_insert(0) += 1;
            } else if let Some(count) = used.get_mut(field) {
                *count -= 1;
                if *count == 0 {
                    used.remove(field);
                }
            }
        }
        self.used_fields.store(Arc::new(used));
    }
}

fn validate(sub_rule: &SubRule) -> Result<()> {
    if sub_rule.is_empty() {
        return Err(RulerError::InvalidRule(
            "a rule must name at least one field".to_string(),
        ));
    }
    if sub_rule.len() > MAX_RULE_FIELDS {
        return Err(RulerError::RuleTooLarge {
            fields: sub_rule.len(),
            max: MAX_RULE_FIELDS,
        });
    }
    for (field, patterns) in sub_rule {
        if patterns.is_empty() {
            return Err(RulerError::InvalidRule(format!(
                "field {} has no patterns",
                field
            )));
        }
        for pattern in patterns {
            automaton::check_pattern(pattern)?;
        }
    }
    Ok(())
}
