//! The two-level automaton behind a [`crate::Machine`].
//!
//! - `name_state`: nodes of the field-name graph. Each holds one byte machine
//!   per field name, absence transitions and the sub-rules that reach it.
//! - `byte_machine`: the value automaton for one field, built from
//!   `byte_state` nodes whose edges are `transition`s stored in `byte_map`s.
//! - `census` and `complexity`: read-only walks used for sizing and for
//!   guarding against expensive wildcard rules.
//!
//! Everything here is mutated by a single writer and read concurrently
//! without locks.

mod byte_machine;
mod byte_map;
mod byte_state;
mod census;
mod complexity;
mod name_state;
mod transition;

pub(crate) use byte_machine::{check_pattern, ByteMachine};
pub(crate) use census::approximate_object_count;
pub use complexity::MachineComplexityEvaluator;
pub(crate) use name_state::NameState;
