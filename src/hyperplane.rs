//! Hyperplanes: one dimension of an operator's transition map.
//!
//! An operator's transition table maps tuples of child representer states
//! to the state of the subtree root. Each hyperplane covers one tuple
//! position: intermediate dimensions map a representer to the next
//! hyperplane, the final dimension maps it to the resulting state. A
//! variadic matcher's final dimension additionally maps its keys back to
//! the same hyperplane, so extra operands follow a self-loop.
//!
//! Planes live in an arena owned by their operator and refer to each other
//! by [`PlaneId`]; a self-loop is a plane whose next-dimension entry is its
//! own id, which keeps the structure free of ownership cycles.

use crate::repstate::RepStateId;
use crate::state::StateId;
use rustc_hash::FxHashMap;

/// Index of a hyperplane in its operator's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PlaneId(pub(crate) u32);

impl PlaneId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// One dimension of the multi-dimensional transition map.
#[derive(Default)]
pub struct HyperPlane {
    /// Mapping to the following dimension, keyed by representer state.
    /// For a variadic final dimension the entry points back to this plane.
    next_dimension: FxHashMap<RepStateId, PlaneId>,
    /// Mapping to the resulting state, if this is the final dimension.
    final_dimension: FxHashMap<RepStateId, StateId>,
}

impl HyperPlane {
    pub fn new() -> Self {
        HyperPlane::default()
    }

    /// The plane reached from `rs`, if any.
    pub fn next_dimension(&self, rs: RepStateId) -> Option<PlaneId> {
        self.next_dimension.get(&rs).copied()
    }

    /// The resulting state reached from `rs` at the final dimension.
    pub fn result_state(&self, rs: RepStateId) -> Option<StateId> {
        self.final_dimension.get(&rs).copied()
    }

    pub(crate) fn set_next(&mut self, rs: RepStateId, plane: PlaneId) {
        self.next_dimension.insert(rs, plane);
    }

    pub(crate) fn set_result(&mut self, rs: RepStateId, state: StateId) {
        self.final_dimension.insert(rs, state);
    }

    /// Iterate the intermediate entries (unordered).
    pub fn next_entries(&self) -> impl Iterator<Item = (RepStateId, PlaneId)> + '_ {
        self.next_dimension.iter().map(|(&k, &v)| (k, v))
    }

    /// Iterate the final entries (unordered).
    pub fn final_entries(&self) -> impl Iterator<Item = (RepStateId, StateId)> + '_ {
        self.final_dimension.iter().map(|(&k, &v)| (k, v))
    }

    /// Result states recorded in this dimension (unordered).
    pub fn result_states(&self) -> impl Iterator<Item = StateId> + '_ {
        self.final_dimension.values().copied()
    }

    pub fn is_final(&self) -> bool {
        !self.final_dimension.is_empty()
    }
}
