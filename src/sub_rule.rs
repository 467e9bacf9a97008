//! Sub-rules and their identities.
//!
//! A rule document can describe several alternative field sets (through
//! `$or`), and each alternative is compiled into its own [`SubRule`]. Every
//! sub-rule added to a machine gets a [`SubRuleContext`]: a numeric id used by
//! the automaton to track partial matches, plus the name of the rule it
//! belongs to.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::pattern::Pattern;

/// One AND-combination of field requirements.
///
/// Keys are flattened field names; each value lists the patterns of which any
/// one must match. The map is ordered, which is the order fields are threaded
/// through the name-state graph.
pub type SubRule = BTreeMap<String, Vec<Pattern>>;

/// Requirements on a type used to name rules.
pub trait RuleName: Clone + Eq + Hash + Debug + Send + Sync {}

impl<T: Clone + Eq + Hash + Debug + Send + Sync> RuleName for T {}

/// Identity of one sub-rule. Equality and hashing use only the id.
#[derive(Debug, Clone)]
pub struct SubRuleContext<X> {
    id: u64,
    rule: X,
}

impl<X> SubRuleContext<X> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn rule(&self) -> &X {
        &self.rule
    }
}

impl<X> PartialEq for SubRuleContext<X> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<X> Eq for SubRuleContext<X> {}

impl<X> Hash for SubRuleContext<X> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Hands out sub-rule ids and remembers which sub-rules each rule owns.
///
/// Only the writer touches the generator.
pub(crate) struct Generator<X> {
    next_id: u64,
    by_rule: FxHashMap<X, Vec<(Arc<SubRuleContext<X>>, SubRule)>>,
}

impl<X: RuleName> Generator<X> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 0,
            by_rule: FxHashMap::default(),
        }
    }

    /// Look up an already-registered sub-rule of `rule` with this exact shape.
    pub(crate) fn find(&self, rule: &X, sub_rule: &SubRule) -> Option<Arc<SubRuleContext<X>>> {
        self.by_rule
            .get(rule)?
            .iter()
            .find(|(_, existing)| existing == sub_rule)
            .map(|(context, _)| context.clone())
    }

    pub(crate) fn generate(&mut self, rule: X, sub_rule: SubRule) -> Arc<SubRuleContext<X>> {
        let context = Arc::new(SubRuleContext {
            id: self.next_id,
            rule: rule.clone(),
        });
        self.next_id += 1;
        self.by_rule
            .entry(rule)
            .or_default()
            .push((context.clone(), sub_rule));
        context
    }

    /// Forget the sub-rule of `rule` with this exact shape, returning its context.
    pub(crate) fn remove(&mut self, rule: &X, sub_rule: &SubRule) -> Option<Arc<SubRuleContext<X>>> {
        let entries = self.by_rule.get_mut(rule)?;
        let position = entries.iter().position(|(_, existing)| existing == sub_rule)?;
        let (context, _) = entries.swap_remove(position);
        if entries.is_empty() {
            self.by_rule.remove(rule);
        }
        Some(context)
    }

    /// Number of live sub-rules.
    pub(crate) fn len(&self) -> usize {
        self.by_rule.values().map(Vec::len).sum()
    }
}
