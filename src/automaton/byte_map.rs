//! Compact byte-indexed transition table.
//!
//! The table uses a ceilings/transitions representation where each ceiling
//! marks the upper bound (exclusive) of a byte range that maps to the
//! corresponding transition:
//!
//! ```text
//! bytes 'a'..='c' -> T1, 'x' -> T2
//! ceilings:    [0x61, 0x64, 0x78, 0x79, 0x100]
//! transitions: [None, T1,   None, T2,   None]
//! ```
//!
//! Adjacent ranges never hold equal transitions; [`ByteMap::pack`] merges them.
//! A map is immutable once built: updates produce a new map.

use smallvec::SmallVec;

use super::transition::ByteTransition;

/// Number of distinct byte values.
pub(crate) const BYTE_COUNT: usize = 256;

pub(crate) struct ByteMap<X> {
    ceilings: SmallVec<[u16; 4]>,
    transitions: SmallVec<[Option<ByteTransition<X>>; 4]>,
}

impl<X> Clone for ByteMap<X> {
    fn clone(&self) -> Self {
        Self {
            ceilings: self.ceilings.clone(),
            transitions: self.transitions.clone(),
        }
    }
}

fn same_ptr<X>(a: Option<&ByteTransition<X>>, b: Option<&ByteTransition<X>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.ptr_eq(b),
        _ => false,
    }
}

fn same<X>(a: Option<&ByteTransition<X>>, b: Option<&ByteTransition<X>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

impl<X> ByteMap<X> {
    /// An empty map: no byte has a transition.
    pub(crate) fn new() -> Self {
        let mut ceilings = SmallVec::new();
        ceilings.push(BYTE_COUNT as u16);
        let mut transitions = SmallVec::new();
        transitions.push(None);
        Self {
            ceilings,
            transitions,
        }
    }

    /// A map with one transition on one byte.
    pub(crate) fn single(byte: u8, transition: ByteTransition<X>) -> Self {
        let byte = byte as u16;
        let mut ceilings = SmallVec::new();
        let mut transitions = SmallVec::new();
        if byte > 0 {
            ceilings.push(byte);
            transitions.push(None);
        }
        ceilings.push(byte + 1);
        transitions.push(Some(transition));
        if byte + 1 < BYTE_COUNT as u16 {
            ceilings.push(BYTE_COUNT as u16);
            transitions.push(None);
        }
        Self {
            ceilings,
            transitions,
        }
    }

    #[inline]
    pub(crate) fn get(&self, byte: u8) -> Option<&ByteTransition<X>> {
        let index = self.ceilings.partition_point(|&c| c <= byte as u16);
        self.transitions.get(index).and_then(Option::as_ref)
    }

    /// The transition shared by every byte, if all bytes agree on one.
    pub(crate) fn all_bytes(&self) -> Option<&ByteTransition<X>> {
        if self.ceilings.len() == 1 {
            self.transitions[0].as_ref()
        } else {
            None
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.transitions.iter().all(Option::is_none)
    }

    /// The only byte with a transition, when exactly one byte has one.
    pub(crate) fn single_byte(&self) -> Option<(u8, &ByteTransition<X>)> {
        let mut found = None;
        for (floor, ceiling, transition) in self.ranges() {
            if found.is_some() || floor != ceiling {
                return None;
            }
            found = Some((floor, transition));
        }
        found
    }

    /// Non-empty ranges as inclusive `(low, high, transition)` triples.
    pub(crate) fn ranges(&self) -> impl Iterator<Item = (u8, u8, &ByteTransition<X>)> + '_ {
        let floors = std::iter::once(0u16).chain(self.ceilings.iter().copied());
        floors
            .zip(self.ceilings.iter().copied())
            .zip(self.transitions.iter())
            .filter_map(|((floor, ceiling), transition)| {
                transition
                    .as_ref()
                    .map(|t| (floor as u8, (ceiling - 1) as u8, t))
            })
    }

    /// Expand into one entry per byte value.
    pub(crate) fn unpack(&self) -> Vec<Option<ByteTransition<X>>> {
        let mut result = Vec::with_capacity(BYTE_COUNT);
        for (packed_index, &ceiling) in self.ceilings.iter().enumerate() {
            while result.len() < ceiling as usize {
                result.push(self.transitions[packed_index].clone());
            }
        }
        result
    }

    /// Build a map from one entry per byte value, merging equal neighbours.
    pub(crate) fn pack(unpacked: &[Option<ByteTransition<X>>]) -> Self {
        debug_assert_eq!(unpacked.len(), BYTE_COUNT);
        let mut ceilings: SmallVec<[u16; 4]> = SmallVec::new();
        let mut transitions: SmallVec<[Option<ByteTransition<X>>; 4]> = SmallVec::new();
        let mut last: Option<&Option<ByteTransition<X>>> = None;
        for (index, entry) in unpacked.iter().enumerate() {
            if let Some(previous) = last {
                if same(previous.as_ref(), entry.as_ref()) {
                    if let Some(ceiling) = ceilings.last_mut() {
                        *ceiling = index as u16 + 1;
                    }
                    continue;
                }
            }
            ceilings.push(index as u16 + 1);
            transitions.push(entry.clone());
            last = Some(entry);
        }
        Self {
            ceilings,
            transitions,
        }
    }

    /// Apply `f` to the transition of every byte in `low..=high`.
    ///
    /// Bytes that currently share one transition are rewritten once and keep
    /// sharing the result. Returns `None` when nothing changed.
    pub(crate) fn update<F>(&self, low: u8, high: u8, mut f: F) -> Option<Self>
    where
        F: FnMut(Option<&ByteTransition<X>>) -> Option<ByteTransition<X>>,
    {
        let mut unpacked = self.unpack();
        let mut changed = false;
        let mut cache: Option<(Option<ByteTransition<X>>, Option<ByteTransition<X>>)> = None;
        for slot in &mut unpacked[low as usize..=high as usize] {
            let cached = match &cache {
                Some((input, output)) if same_ptr(input.as_ref(), slot.as_ref()) => {
                    Some(output.clone())
                }
                _ => None,
            };
            let output = match cached {
                Some(output) => output,
                None => {
                    let output = f(slot.as_ref());
                    cache = Some((slot.clone(), output.clone()));
                    output
                }
            };
            if !same(slot.as_ref(), output.as_ref()) {
                changed = true;
            }
            *slot = output;
        }
        if changed {
            Some(Self::pack(&unpacked))
        } else {
            None
        }
    }
}
