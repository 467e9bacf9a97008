//! The value automaton for one field name.
//!
//! A [`ByteMachine`] receives a field's raw (flattened) value and returns every
//! [`ByteMatch`] the value satisfies. All patterns of one field share a single
//! automaton rooted at `start`:
//!
//! - Literal prefixes are spelled out as *determinate* states, each reached by
//!   exactly one byte sequence, so that literal patterns share their common
//!   prefix.
//! - Wildcards, case-fold variants and digit ranges build *indeterminate*
//!   structure that is private to the pattern (apart from the wildcard loop
//!   state, which is shared per origin state).
//! - An exact pattern only spells out bytes up to the point where it leaves
//!   the existing structure; the remaining bytes sit behind a shortcut.
//!
//! Values are read three ways. If the machine holds CIDR patterns the value is
//! tried as an IP address. If it holds numeric patterns and the value reads as a
//! number, only the numeric interpretation is used. Otherwise the raw bytes are
//! walked forwards, and backwards when suffix patterns are present.
//!
//! Mutation happens under the owning machine's writer lock; every change is
//! published through the states' atomic edge tables, and a pattern only
//! becomes matchable once its final match atom is installed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::{smallvec, SmallVec};
use tracing::trace;

use super::byte_state::ByteState;
use super::name_state::NameState;
use super::transition::{Atom, ByteMatch, ByteTransition};
use crate::cidr;
use crate::error::{Result, RulerError};
use crate::input::{self, InputCharacter};
use crate::numbits::{comparable_number, HEX_DIGITS};
use crate::pattern::{MatchType, Pattern, Range};

type StateRef<X> = Arc<ByteState<X>>;
type MatchRef<X> = Arc<ByteMatch<X>>;

/// How a value is being interpreted during one walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueType {
    String,
    Numeric,
    Cidr,
}

/// Matches found while reading one value, deduplicated by identity.
struct Collector<X> {
    matches: Vec<MatchRef<X>>,
    /// Anything-but patterns whose excluded value was seen.
    failed: SmallVec<[MatchRef<X>; 2]>,
}

impl<X> Collector<X> {
    fn new() -> Self {
        Self {
            matches: Vec::new(),
            failed: SmallVec::new(),
        }
    }

    fn matched(&mut self, byte_match: &MatchRef<X>) {
        if !self.matches.iter().any(|m| Arc::ptr_eq(m, byte_match)) {
            self.matches.push(byte_match.clone());
        }
    }

    fn failed(&mut self, byte_match: &MatchRef<X>) {
        if !self.failed.iter().any(|m| Arc::ptr_eq(m, byte_match)) {
            self.failed.push(byte_match.clone());
        }
    }

    fn has_failed(&self, byte_match: &MatchRef<X>) -> bool {
        self.failed.iter().any(|m| Arc::ptr_eq(m, byte_match))
    }
}

pub(crate) struct ByteMachine<X> {
    start: StateRef<X>,
    /// Patterns satisfied by every value: existence, a lone `*` and empty
    /// prefixes or suffixes.
    start_state_matches: ArcSwap<Vec<MatchRef<X>>>,
    /// Anything-but patterns. They match unless their path was reached.
    anything_buts: ArcSwap<Vec<MatchRef<X>>>,
    numeric_count: AtomicUsize,
    ip_count: AtomicUsize,
    suffix_count: AtomicUsize,
    wildcard_count: AtomicUsize,
    /// Every pattern stored here and its match. Locked by the writer and by
    /// the census and complexity walks; `transition_on` never touches it.
    patterns: Mutex<FxHashMap<Pattern, MatchRef<X>>>,
}

impl<X> ByteMachine<X> {
    pub(crate) fn new() -> Self {
        Self {
            start: Arc::new(ByteState::new(false)),
            start_state_matches: ArcSwap::from_pointee(Vec::new()),
            anything_buts: ArcSwap::from_pointee(Vec::new()),
            numeric_count: AtomicUsize::new(0),
            ip_count: AtomicUsize::new(0),
            suffix_count: AtomicUsize::new(0),
            wildcard_count: AtomicUsize::new(0),
            patterns: Mutex::new(FxHashMap::default()),
        }
    }

    pub(crate) fn start(&self) -> &StateRef<X> {
        &self.start
    }

    pub(crate) fn start_state_matches(&self) -> Arc<Vec<MatchRef<X>>> {
        self.start_state_matches.load_full()
    }

    /// True when some stored pattern can branch on arbitrary input.
    pub(crate) fn has_complexity(&self) -> bool {
        self.wildcard_count.load(Ordering::Acquire) > 0
    }

    /// The match of every stored pattern.
    pub(crate) fn byte_matches(&self) -> Vec<MatchRef<X>> {
        self.patterns.lock().values().cloned().collect()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.start.is_empty()
            && self.start_state_matches.load().is_empty()
            && self.anything_buts.load().is_empty()
    }

    /// Every match satisfied by `value`.
    pub(crate) fn transition_on(&self, value: &str) -> Vec<MatchRef<X>> {
        let mut collector = Collector::new();
        for byte_match in self.start_state_matches.load().iter() {
            collector.matched(byte_match);
        }

        if self.ip_count.load(Ordering::Acquire) > 0 {
            match cidr::ip_to_comparable(value) {
                Some(encoded) => self.walk(&encoded, ValueType::Cidr, false, &mut collector),
                None => trace!(value, "value is not an IP address"),
            }
        }

        if self.numeric_count.load(Ordering::Acquire) > 0 {
            if let Some(encoded) = comparable_number(value) {
                self.walk(&encoded, ValueType::Numeric, false, &mut collector);
                self.add_anything_buts(&mut collector);
                return collector.matches;
            }
        }

        self.walk(value.as_bytes(), ValueType::String, false, &mut collector);
        if self.suffix_count.load(Ordering::Acquire) > 0 {
            let reversed: Vec<u8> = value.bytes().rev().collect();
            self.walk(&reversed, ValueType::String, true, &mut collector);
        }
        self.add_anything_buts(&mut collector);
        collector.matches
    }

    fn walk(&self, bytes: &[u8], value_type: ValueType, reversed: bool, out: &mut Collector<X>) {
        let mut frontier: SmallVec<[StateRef<X>; 4]> = smallvec![self.start.clone()];
        let mut next: SmallVec<[StateRef<X>; 4]> = SmallVec::new();
        let follow_shortcuts = value_type == ValueType::String && !reversed;

        for (i, &byte) in bytes.iter().enumerate() {
            let at_end = i + 1 == bytes.len();
            for state in &frontier {
                let Some(transition) = state.transition(byte) else {
                    continue;
                };
                for byte_match in transition.matches() {
                    on_match(byte_match, value_type, reversed, at_end, out);
                }
                if follow_shortcuts {
                    for byte_match in transition.shortcuts() {
                        if matches!(&byte_match.pattern, Pattern::Value { value, .. } if value.as_bytes() == bytes)
                        {
                            out.matched(byte_match);
                        }
                    }
                }
                for s in transition.states() {
                    if !next.iter().any(|n| Arc::ptr_eq(n, s)) {
                        next.push(s.clone());
                    }
                }
            }
            if next.is_empty() {
                return;
            }
            std::mem::swap(&mut frontier, &mut next);
            next.clear();
        }
    }

    fn add_anything_buts(&self, out: &mut Collector<X>) {
        for byte_match in self.anything_buts.load().iter() {
            if !out.has_failed(byte_match) {
                out.matched(byte_match);
            }
        }
    }

    /// The next name state of `pattern`, if it is stored here.
    pub(crate) fn find_pattern(&self, pattern: &Pattern) -> Option<Arc<NameState<X>>> {
        self.patterns
            .lock()
            .get(pattern)
            .map(|m| m.next_name_state.clone())
    }

    /// Store `pattern`, leading to `next`. A pattern that is already stored
    /// keeps its existing next name state, which is returned.
    pub(crate) fn add_pattern(
        &self,
        pattern: &Pattern,
        next: Arc<NameState<X>>,
    ) -> Result<Arc<NameState<X>>> {
        let mut patterns = self.patterns.lock();
        if let Some(existing) = patterns.get(pattern) {
            return Ok(existing.next_name_state.clone());
        }
        let byte_match = Arc::new(ByteMatch::new(pattern.clone(), next.clone()));

        match pattern {
            Pattern::Absent => return Err(RulerError::UnsupportedPattern(MatchType::Absent)),
            Pattern::Exists => self.add_start_match(&byte_match),
            Pattern::Range(range) => self.add_range(range, &byte_match),
            Pattern::Value { match_type, .. } => {
                let chars = parse_values(pattern)?.pop().unwrap_or_default();
                if matches_everything(*match_type, &chars) {
                    self.add_start_match(&byte_match);
                } else {
                    self.add_path(&chars, &byte_match);
                }
            }
            Pattern::AnythingBut { .. } | Pattern::AnythingButSet { .. } => {
                for chars in &parse_values(pattern)? {
                    self.add_path(chars, &byte_match);
                }
                // Exclusions must be in place before the pattern can match.
                let mut anything_buts = (**self.anything_buts.load()).clone();
                anything_buts.push(byte_match.clone());
                self.anything_buts.store(Arc::new(anything_buts));
            }
        }

        self.adjust_counts(pattern, true);
        patterns.insert(pattern.clone(), byte_match);
        trace!(?pattern, "added pattern to byte machine");
        Ok(next)
    }

    /// Remove `pattern` and every structure it alone required.
    pub(crate) fn delete_pattern(&self, pattern: &Pattern) -> Result<()> {
        if matches!(pattern, Pattern::Absent) {
            return Err(RulerError::UnsupportedPattern(MatchType::Absent));
        }
        let match_type = pattern.match_type();
        let parsed = pattern
            .values()
            .into_iter()
            .map(|value| input::parse(match_type, value))
            .collect::<Result<Vec<_>>>()?;

        let mut patterns = self.patterns.lock();
        let Some(byte_match) = patterns.remove(pattern) else {
            return Ok(());
        };

        if match_type.is_anything_but() {
            let mut anything_buts = (**self.anything_buts.load()).clone();
            anything_buts.retain(|m| !Arc::ptr_eq(m, &byte_match));
            self.anything_buts.store(Arc::new(anything_buts));
        }

        match pattern {
            Pattern::Exists => self.remove_start_match(&byte_match),
            Pattern::Range(_) => self.delete_everywhere(&byte_match),
            _ => {
                let mut needs_sweep = false;
                for chars in &parsed {
                    if matches_everything(match_type, chars) {
                        self.remove_start_match(&byte_match);
                    } else if let Some(bytes) = literal_bytes(chars) {
                        self.delete_path(&self.start, &bytes, 0, &byte_match);
                    } else {
                        needs_sweep = true;
                    }
                }
                if needs_sweep {
                    self.delete_everywhere(&byte_match);
                }
            }
        }

        self.adjust_counts(pattern, false);
        trace!(?pattern, "deleted pattern from byte machine");
        Ok(())
    }

    fn adjust_counts(&self, pattern: &Pattern, added: bool) {
        let counters = [
            (&self.numeric_count, pattern.is_numeric()),
            (&self.ip_count, pattern.is_cidr()),
            (&self.suffix_count, pattern.match_type().is_suffix()),
            (&self.wildcard_count, pattern.match_type().has_complexity()),
        ];
        for (counter, applies) in counters {
            if !applies {
                continue;
            }
            if added {
                counter.fetch_add(1, Ordering::AcqRel);
            } else {
                counter.fetch_sub(1, Ordering::AcqRel);
            }
        }
    }

    fn add_start_match(&self, byte_match: &MatchRef<X>) {
        let mut matches = (**self.start_state_matches.load()).clone();
        matches.push(byte_match.clone());
        self.start_state_matches.store(Arc::new(matches));
    }

    fn remove_start_match(&self, byte_match: &MatchRef<X>) {
        let mut matches = (**self.start_state_matches.load()).clone();
        matches.retain(|m| !Arc::ptr_eq(m, byte_match));
        self.start_state_matches.store(Arc::new(matches));
    }

    /// Build the path for one parsed value. Leading bytes reuse determinate
    /// structure; everything from the first non-literal character on is fresh.
    fn add_path(&self, chars: &[InputCharacter], byte_match: &MatchRef<X>) {
        let exact = byte_match.pattern.match_type() == MatchType::Exact;
        let mut state = self.start.clone();
        let mut incoming: Vec<(StateRef<X>, u8)> = Vec::new();

        for (i, c) in chars.iter().enumerate() {
            let &InputCharacter::Byte(byte) = c else {
                self.add_indeterminate(state, &chars[i..], incoming, byte_match);
                return;
            };
            if i + 1 == chars.len() {
                state.add_transition(byte, Atom::Match(byte_match.clone()));
                return;
            }
            let next = match self.determinate_successor(&state, byte, i) {
                Some(next) => next,
                None if exact => {
                    state.add_transition(byte, Atom::Shortcut(byte_match.clone()));
                    return;
                }
                None => {
                    let next = Arc::new(ByteState::new(false));
                    state.add_transition(byte, Atom::State(next.clone()));
                    next
                }
            };
            incoming = vec![(state, byte)];
            state = next;
        }
    }

    /// The determinate state after `state` on `byte`, where `state` sits at
    /// `depth` bytes from the start. A shortcut on that byte is pushed one
    /// byte further to make room.
    fn determinate_successor(&self, state: &StateRef<X>, byte: u8, depth: usize) -> Option<StateRef<X>> {
        let transition = state.transition(byte)?;
        if let Some(next) = transition.determinate_state() {
            return Some(next.clone());
        }
        let shortcut = transition.shortcuts().first()?.clone();
        let Pattern::Value { value, .. } = &shortcut.pattern else {
            return None;
        };
        let bytes = value.as_bytes();
        let &follow = bytes.get(depth + 1)?;

        let pushed = Arc::new(ByteState::new(false));
        let atom = if depth + 2 == bytes.len() {
            Atom::Match(shortcut.clone())
        } else {
            Atom::Shortcut(shortcut.clone())
        };
        pushed.add_transition(follow, atom);
        state.replace_transition(byte, &Atom::Shortcut(shortcut), Atom::State(pushed.clone()));
        trace!(depth, "pushed shortcut");
        Some(pushed)
    }

    fn add_indeterminate(
        &self,
        from: StateRef<X>,
        chars: &[InputCharacter],
        mut incoming: Vec<(StateRef<X>, u8)>,
        byte_match: &MatchRef<X>,
    ) {
        let mut frontier: Vec<StateRef<X>> = vec![from];

        for (i, c) in chars.iter().enumerate() {
            let last = i + 1 == chars.len();
            match c {
                InputCharacter::Byte(byte) => {
                    if last {
                        for state in &frontier {
                            state.add_transition(*byte, Atom::Match(byte_match.clone()));
                        }
                        return;
                    }
                    let next = Arc::new(ByteState::new(true));
                    for state in &frontier {
                        state.add_transition(*byte, Atom::State(next.clone()));
                    }
                    incoming = frontier.iter().map(|s| (s.clone(), *byte)).collect();
                    frontier = vec![next];
                }
                InputCharacter::MultiByteSet(variants) => {
                    let join = (!last).then(|| Arc::new(ByteState::new(true)));
                    incoming.clear();
                    for state in &frontier {
                        self.add_variants(state, variants, join.as_ref(), byte_match, &mut incoming);
                    }
                    match join {
                        Some(join) => frontier = vec![join],
                        None => return,
                    }
                }
                InputCharacter::Wildcard => {
                    let mut widened = Vec::with_capacity(frontier.len() * 2);
                    for state in &frontier {
                        let wildcard = self.wildcard_state(state);
                        if last {
                            // The wildcard may match nothing at all.
                            for (origin, byte) in &incoming {
                                origin.add_transition(*byte, Atom::Match(byte_match.clone()));
                            }
                            state.add_transition_for_all_bytes(Atom::Match(byte_match.clone()));
                            wildcard.add_transition_for_all_bytes(Atom::Match(byte_match.clone()));
                        }
                        widened.push(state.clone());
                        if !widened.iter().any(|w| Arc::ptr_eq(w, &wildcard)) {
                            widened.push(wildcard);
                        }
                    }
                    if last {
                        return;
                    }
                    incoming.clear();
                    frontier = widened;
                }
            }
        }
    }

    /// Spell out alternative byte sequences from `from`, ending at `join` or,
    /// for the final character, in a match. Records the edges that complete a
    /// variant in `incoming`.
    fn add_variants(
        &self,
        from: &StateRef<X>,
        variants: &[Vec<u8>],
        join: Option<&StateRef<X>>,
        byte_match: &MatchRef<X>,
        incoming: &mut Vec<(StateRef<X>, u8)>,
    ) {
        let mut firsts: Vec<u8> = variants.iter().filter_map(|v| v.first().copied()).collect();
        firsts.sort_unstable();
        firsts.dedup();

        for first in firsts {
            let mut ends_here = false;
            let mut rest: Vec<Vec<u8>> = Vec::new();
            for variant in variants.iter().filter(|v| v.first() == Some(&first)) {
                if variant.len() == 1 {
                    ends_here = true;
                } else {
                    rest.push(variant[1..].to_vec());
                }
            }
            if ends_here {
                let atom = match join {
                    Some(join) => Atom::State(join.clone()),
                    None => Atom::Match(byte_match.clone()),
                };
                from.add_transition(first, atom);
                incoming.push((from.clone(), first));
            }
            if !rest.is_empty() {
                let middle = Arc::new(ByteState::new(true));
                self.add_variants(&middle, &rest, join, byte_match, incoming);
                from.add_transition(first, Atom::State(middle));
            }
        }
    }

    /// The state that loops on every byte after `from`, creating it if needed.
    fn wildcard_state(&self, from: &StateRef<X>) -> StateRef<X> {
        if let Some(transition) = from.transition(0) {
            for state in transition.states() {
                if state.is_indeterminate()
                    && state.reaches_on_every_byte(state)
                    && from.reaches_on_every_byte(state)
                {
                    return state.clone();
                }
            }
        }
        let wildcard = Arc::new(ByteState::new(true));
        wildcard.add_transition_for_all_bytes(Atom::State(wildcard.clone()));
        from.add_transition_for_all_bytes(Atom::State(wildcard.clone()));
        wildcard
    }

    fn add_range(&self, range: &Range, byte_match: &MatchRef<X>) {
        let mut free = Vec::new();
        self.add_range_digits(&self.start, 0, range, true, true, byte_match, &mut free);
    }

    /// Add the digits at `index` of every value within `range`. `low_tight`
    /// and `high_tight` say whether the digits so far equal the bottom and
    /// top bound's.
    #[allow(clippy::too_many_arguments)]
    fn add_range_digits(
        &self,
        state: &StateRef<X>,
        index: usize,
        range: &Range,
        low_tight: bool,
        high_tight: bool,
        byte_match: &MatchRef<X>,
        free: &mut Vec<StateRef<X>>,
    ) {
        let width = range.bottom.len();
        let last = index + 1 == width;
        let low = if low_tight {
            digit_index(range.bottom[index])
        } else {
            0
        };
        let high = if high_tight {
            digit_index(range.top[index])
        } else {
            HEX_DIGITS.len() - 1
        };

        for digit in low..=high {
            let byte = HEX_DIGITS[digit];
            let on_bottom = low_tight && digit == low;
            let on_top = high_tight && digit == high;
            if last {
                if (on_bottom && range.open_bottom) || (on_top && range.open_top) {
                    continue;
                }
                state.add_transition(byte, Atom::Match(byte_match.clone()));
            } else if on_bottom || on_top {
                let next = Arc::new(ByteState::new(true));
                self.add_range_digits(&next, index + 1, range, on_bottom, on_top, byte_match, free);
                if !next.is_empty() {
                    state.add_transition(byte, Atom::State(next));
                }
            } else {
                let next = self.free_digits(free, width - index - 1, byte_match);
                state.add_transition(byte, Atom::State(next));
            }
        }
    }

    /// A state accepting any `remaining` digits and then matching. The chain
    /// is shared by every unconstrained branch of one range.
    fn free_digits(
        &self,
        free: &mut Vec<StateRef<X>>,
        remaining: usize,
        byte_match: &MatchRef<X>,
    ) -> StateRef<X> {
        while free.len() < remaining {
            let state = Arc::new(ByteState::new(true));
            let atom = match free.last() {
                Some(previous) => Atom::State(previous.clone()),
                None => Atom::Match(byte_match.clone()),
            };
            for &digit in HEX_DIGITS.iter() {
                state.add_transition(digit, atom.clone());
            }
            free.push(state);
        }
        free[remaining - 1].clone()
    }

    /// Remove a literal path, following determinate states only.
    fn delete_path(&self, state: &StateRef<X>, bytes: &[u8], depth: usize, byte_match: &MatchRef<X>) {
        let byte = bytes[depth];
        if depth + 1 == bytes.len() {
            state.remove_transition(byte, &Atom::Match(byte_match.clone()));
            return;
        }
        let Some(transition) = state.transition(byte) else {
            return;
        };
        let shortcut = Atom::Shortcut(byte_match.clone());
        if transition.contains(&shortcut) {
            state.remove_transition(byte, &shortcut);
            return;
        }
        let Some(next) = transition.determinate_state().cloned() else {
            return;
        };
        self.delete_path(&next, bytes, depth + 1, byte_match);
        self.settle(state, byte, byte, &next);
    }

    /// Remove every atom of `byte_match` reachable from the start state.
    fn delete_everywhere(&self, byte_match: &MatchRef<X>) {
        let mut visited = FxHashSet::default();
        self.delete_from(&self.start, byte_match, &mut visited);
    }

    fn delete_from(&self, state: &StateRef<X>, byte_match: &MatchRef<X>, visited: &mut FxHashSet<usize>) {
        if !visited.insert(Arc::as_ptr(state) as usize) {
            return;
        }
        let as_match = Atom::Match(byte_match.clone());
        let as_shortcut = Atom::Shortcut(byte_match.clone());
        for (low, high, transition) in state.ranges() {
            if transition.contains(&as_match) {
                state.remove_transition_range(low, high, &as_match);
            }
            if transition.contains(&as_shortcut) {
                state.remove_transition_range(low, high, &as_shortcut);
            }
        }
        for (low, high, transition) in state.ranges() {
            for child in transition.states() {
                if Arc::ptr_eq(child, state) {
                    continue;
                }
                self.delete_from(child, byte_match, visited);
                self.settle(state, low, high, child);
            }
        }
    }

    /// Tidy the edge `parent[low..=high] -> child` after `child` lost atoms.
    /// A child with nothing left is unlinked; a determinate child left with a
    /// single exact pattern is folded back into a shortcut on the parent.
    fn settle(&self, parent: &StateRef<X>, low: u8, high: u8, child: &StateRef<X>) {
        if child.is_empty() || child.has_only_self_referential_transition() {
            let unlinked = Atom::State(child.clone());
            parent.remove_transition_range(low, high, &unlinked);
            child.remove_transition_for_all_bytes(&unlinked);
            return;
        }
        if low != high || child.is_indeterminate() {
            return;
        }
        let Some((_, transition)) = child.single_transition() else {
            return;
        };
        let lone = match &transition {
            ByteTransition::Shortcut(m) => m.clone(),
            ByteTransition::Match(m) if m.pattern.match_type() == MatchType::Exact => m.clone(),
            _ => return,
        };
        let Some(current) = parent.transition(low) else {
            return;
        };
        if !current.shortcuts().is_empty() {
            return;
        }
        parent.replace_transition(low, &Atom::State(child.clone()), Atom::Shortcut(lone));
        trace!(byte = low, "pulled shortcut");
    }
}

/// Break the reference cycles of wildcard loop states.
impl<X> Drop for ByteMachine<X> {
    fn drop(&mut self) {
        let mut visited = FxHashSet::default();
        let mut stack = vec![self.start.clone()];
        while let Some(state) = stack.pop() {
            if !visited.insert(Arc::as_ptr(&state) as usize) {
                continue;
            }
            for (_, _, transition) in state.ranges() {
                stack.extend(transition.states().iter().cloned());
            }
            state.clear();
        }
    }
}

fn on_match<X>(
    byte_match: &MatchRef<X>,
    value_type: ValueType,
    reversed: bool,
    at_end: bool,
    out: &mut Collector<X>,
) {
    let pattern = &byte_match.pattern;
    let match_type = pattern.match_type();
    let applies = match value_type {
        ValueType::Numeric => pattern.is_numeric(),
        ValueType::Cidr => pattern.is_cidr(),
        ValueType::String => {
            !pattern.is_numeric() && !pattern.is_cidr() && match_type.is_suffix() == reversed
        }
    };
    if !applies || !(at_end || match_type.matches_before_end()) {
        return;
    }
    if match_type.is_anything_but() {
        out.failed(byte_match);
    } else {
        out.matched(byte_match);
    }
}

/// Reject patterns that [`ByteMachine::add_pattern`] cannot store.
pub(crate) fn check_pattern(pattern: &Pattern) -> Result<()> {
    match pattern {
        Pattern::Absent | Pattern::Exists | Pattern::Range(_) => Ok(()),
        _ => parse_values(pattern).map(|_| ()),
    }
}

fn parse_values(pattern: &Pattern) -> Result<Vec<Vec<InputCharacter>>> {
    let match_type = pattern.match_type();
    let parsed = pattern
        .values()
        .into_iter()
        .map(|value| input::parse(match_type, value))
        .collect::<Result<Vec<_>>>()?;
    let unusable = |chars: &Vec<InputCharacter>| {
        chars.is_empty() && (match_type.is_anything_but() || !matches_everything(match_type, chars))
    };
    if parsed.is_empty() || parsed.iter().any(unusable) {
        return Err(RulerError::InvalidPattern(format!(
            "{:?} pattern with an empty value",
            match_type
        )));
    }
    Ok(parsed)
}

fn matches_everything(match_type: MatchType, chars: &[InputCharacter]) -> bool {
    match chars {
        [] => match_type.matches_before_end(),
        [InputCharacter::Wildcard] => match_type == MatchType::Wildcard,
        _ => false,
    }
}

fn literal_bytes(chars: &[InputCharacter]) -> Option<Vec<u8>> {
    chars
        .iter()
        .map(|c| match c {
            InputCharacter::Byte(b) => Some(*b),
            _ => None,
        })
        .collect()
}

fn digit_index(byte: u8) -> usize {
    HEX_DIGITS.iter().position(|&d| d == byte).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> ByteMachine<String> {
        ByteMachine::new()
    }

    fn add(machine: &ByteMachine<String>, pattern: &Pattern) {
        machine
            .add_pattern(pattern, Arc::new(NameState::new()))
            .unwrap();
    }

    fn patterns(machine: &ByteMachine<String>, value: &str) -> Vec<Pattern> {
        machine
            .transition_on(value)
            .into_iter()
            .map(|m| m.pattern.clone())
            .collect()
    }

    fn matches(machine: &ByteMachine<String>, value: &str, pattern: &Pattern) -> bool {
        patterns(machine, value).contains(pattern)
    }

    #[test]
    fn test_exact_uses_shortcut() {
        let m = machine();
        let p = Pattern::exact("\"abc\"");
        add(&m, &p);
        let t = m.start.transition(b'"').unwrap();
        assert!(matches!(t, ByteTransition::Shortcut(_)));
        assert!(matches(&m, "\"abc\"", &p));
        assert!(!matches(&m, "\"abd\"", &p));
        assert!(!matches(&m, "\"abcd\"", &p));
    }

    #[test]
    fn test_shortcut_push_and_pull() {
        let m = machine();
        let abc = Pattern::exact("\"abc\"");
        let abd = Pattern::exact("\"abd\"");
        add(&m, &abc);
        add(&m, &abd);
        assert!(m.start.transition(b'"').unwrap().determinate_state().is_some());
        assert!(matches(&m, "\"abc\"", &abc));
        assert!(matches(&m, "\"abd\"", &abd));
        assert!(!matches(&m, "\"abd\"", &abc));

        m.delete_pattern(&abd).unwrap();
        let t = m.start.transition(b'"').unwrap();
        assert!(matches!(t, ByteTransition::Shortcut(_)));
        assert!(matches(&m, "\"abc\"", &abc));
        assert!(patterns(&m, "\"abd\"").is_empty());

        m.delete_pattern(&abc).unwrap();
        assert!(m.is_empty());
    }

    #[test]
    fn test_shortcut_pushed_to_last_byte() {
        let m = machine();
        let short = Pattern::exact("\"a\"");
        let long = Pattern::exact("\"ab\"");
        add(&m, &short);
        add(&m, &long);
        assert!(matches(&m, "\"a\"", &short));
        assert!(matches(&m, "\"ab\"", &long));
        assert_eq!(patterns(&m, "\"ab\"").len(), 1);
        m.delete_pattern(&long).unwrap();
        m.delete_pattern(&short).unwrap();
        assert!(m.is_empty());
    }

    #[test]
    fn test_prefix_and_suffix() {
        let m = machine();
        let prefix = Pattern::prefix("\"ab");
        let suffix = Pattern::suffix("yz\"");
        add(&m, &prefix);
        add(&m, &suffix);
        assert!(matches(&m, "\"abxyz\"", &prefix));
        assert!(matches(&m, "\"abxyz\"", &suffix));
        assert!(!matches(&m, "\"xabyz1\"", &prefix));
        assert!(!matches(&m, "\"xabyz1\"", &suffix));
        m.delete_pattern(&prefix).unwrap();
        m.delete_pattern(&suffix).unwrap();
        assert!(m.is_empty());
    }

    #[test]
    fn test_ignore_case() {
        let m = machine();
        let p = Pattern::equals_ignore_case("\"JaVa\"");
        add(&m, &p);
        assert!(matches(&m, "\"java\"", &p));
        assert!(matches(&m, "\"JAVA\"", &p));
        assert!(!matches(&m, "\"javas\"", &p));
        m.delete_pattern(&p).unwrap();
        assert!(m.is_empty());
    }

    #[test]
    fn test_wildcards() {
        let m = machine();
        let middle = Pattern::wildcard("\"a*z\"").unwrap();
        let trailing = Pattern::wildcard("\"ab*").unwrap();
        add(&m, &middle);
        add(&m, &trailing);
        assert!(matches(&m, "\"az\"", &middle));
        assert!(matches(&m, "\"abcz\"", &middle));
        assert!(!matches(&m, "\"abzc\"", &middle));
        assert!(matches(&m, "\"ab", &trailing));
        assert!(matches(&m, "\"abzc\"", &trailing));
        assert!(!matches(&m, "\"a\"", &trailing));

        m.delete_pattern(&middle).unwrap();
        assert!(!matches(&m, "\"abcz\"", &middle));
        assert!(matches(&m, "\"abcz\"", &trailing));
        m.delete_pattern(&trailing).unwrap();
        assert!(m.is_empty());
    }

    #[test]
    fn test_lone_wildcard_matches_everything() {
        let m = machine();
        let p = Pattern::wildcard("*").unwrap();
        add(&m, &p);
        assert!(matches(&m, "", &p));
        assert!(matches(&m, "\"anything\"", &p));
        m.delete_pattern(&p).unwrap();
        assert!(m.is_empty());
    }

    #[test]
    fn test_numeric_range() {
        let m = machine();
        let p = Pattern::range(Range::between(10.0, true, 20.0, false).unwrap());
        add(&m, &p);
        for value in ["15", "20", "10.5", "1.5e1"] {
            assert!(matches(&m, value, &p), "{} should match", value);
        }
        for value in ["10", "21", "-15", "\"15\""] {
            assert!(!matches(&m, value, &p), "{} should not match", value);
        }
        m.delete_pattern(&p).unwrap();
        assert!(m.is_empty());
    }

    #[test]
    fn test_cidr_range() {
        let m = machine();
        let p = Pattern::range(Range::cidr("10.0.0.0/24").unwrap());
        add(&m, &p);
        assert!(matches(&m, "\"10.0.0.7\"", &p));
        assert!(!matches(&m, "\"10.0.1.7\"", &p));
        assert!(!matches(&m, "\"not an ip\"", &p));
        m.delete_pattern(&p).unwrap();
        assert!(m.is_empty());
    }

    #[test]
    fn test_anything_but() {
        let m = machine();
        let p = Pattern::anything_but(["\"a\"", "\"b\""]);
        add(&m, &p);
        assert!(!matches(&m, "\"a\"", &p));
        assert!(!matches(&m, "\"b\"", &p));
        assert!(matches(&m, "\"c\"", &p));
        assert!(matches(&m, "\"ab\"", &p));

        let prefix = Pattern::anything_but_prefix(["\"int"]);
        add(&m, &prefix);
        assert!(!matches(&m, "\"internal\"", &prefix));
        assert!(matches(&m, "\"external\"", &prefix));

        m.delete_pattern(&p).unwrap();
        m.delete_pattern(&prefix).unwrap();
        assert!(m.is_empty());
    }

    #[test]
    fn test_numeric_value_is_not_read_as_string() {
        let m = machine();
        let literal = Pattern::exact("00501");
        add(&m, &literal);
        assert!(matches(&m, "00501", &literal));

        let numeric = Pattern::numeric_eq(501.0).unwrap();
        add(&m, &numeric);
        let found = patterns(&m, "00501");
        assert_eq!(found, vec![numeric.clone()]);

        m.delete_pattern(&numeric).unwrap();
        assert!(matches(&m, "00501", &literal));
    }

    #[test]
    fn test_add_is_idempotent() {
        let m = machine();
        let p = Pattern::prefix("\"x");
        let first = Arc::new(NameState::new());
        let kept = m.add_pattern(&p, first.clone()).unwrap();
        let again = m.add_pattern(&p, Arc::new(NameState::new())).unwrap();
        assert!(Arc::ptr_eq(&kept, &first));
        assert!(Arc::ptr_eq(&again, &first));
        assert!(Arc::ptr_eq(&m.find_pattern(&p).unwrap(), &first));
        assert_eq!(m.transition_on("\"xy\"").len(), 1);
    }

    #[test]
    fn test_absent_is_rejected() {
        let m = machine();
        assert!(m
            .add_pattern(&Pattern::absent(), Arc::new(NameState::new()))
            .is_err());
        assert!(m.delete_pattern(&Pattern::absent()).is_err());
    }
}
