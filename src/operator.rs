//! Operators: per-(node type, arity) transition structures.
//!
//! One operator exists for every (node type, arity) pair some pattern uses.
//! It owns the hyperplane arena rooted at its transition table, and one set
//! of representer states per operand position, each kept three ways: in
//! insertion order (for deterministic permutation), as an identity map (for
//! deduplication during projection) and indexed by state number (for the
//! label pass).

use crate::hyperplane::{HyperPlane, PlaneId};
use crate::production::Production;
use crate::repstate::{RepStateId, RepStateKey, RepresenterState};
use crate::state::{State, StateId};
use rustc_hash::FxHashMap;
use std::hash::Hash;

/// Per-dimension bookkeeping for an operator's representer states.
struct RepDimension<N: Ord + Hash, T: Hash> {
    /// Representer ids at this dimension, in discovery order.
    order: Vec<RepStateId>,
    /// Identity map for deduplication.
    known: FxHashMap<RepStateKey<N, T>, RepStateId>,
    /// State number → representer, for the label pass.
    by_state: FxHashMap<u32, RepStateId>,
}

impl<N: Ord + Hash, T: Hash> RepDimension<N, T> {
    fn new() -> Self {
        RepDimension {
            order: Vec::new(),
            known: FxHashMap::default(),
            by_state: FxHashMap::default(),
        }
    }
}

/// The transition structure for one (node type, arity) pair.
pub struct Operator<N: Ord + Hash, T: Hash> {
    node_type: T,
    arity: usize,
    /// True once any variadic pattern registers at this arity; a variadic
    /// operator also accepts nodes with more operands than `arity`.
    var_args: bool,
    /// Representer-state bookkeeping, one entry per operand position.
    dims: Vec<RepDimension<N, T>>,
    /// All representer states discovered for this operator, across
    /// dimensions; `RepStateId` indexes this arena.
    rep_states: Vec<RepresenterState<N, T>>,
    /// Hyperplane arena; `planes[0]` is the root transition table for
    /// operators of arity ≥ 1.
    planes: Vec<HyperPlane>,
    /// The single state of this operator's leaves, when arity is 0.
    leaf_state: Option<StateId>,
}

impl<N: Copy + Ord + Hash, T: Copy + Eq + Hash> Operator<N, T> {
    pub fn new(node_type: T, arity: usize) -> Self {
        let planes = if arity > 0 {
            vec![HyperPlane::new()]
        } else {
            Vec::new()
        };
        Operator {
            node_type,
            arity,
            var_args: false,
            dims: (0..arity).map(|_| RepDimension::new()).collect(),
            rep_states: Vec::new(),
            planes,
            leaf_state: None,
        }
    }

    pub fn node_type(&self) -> T {
        self.node_type
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn is_var_args(&self) -> bool {
        self.var_args
    }

    pub(crate) fn mark_var_args(&mut self) {
        self.var_args = true;
    }

    /// The leaf state, for arity-0 operators.
    pub fn leaf_state(&self) -> Option<StateId> {
        self.leaf_state
    }

    /// The root of the transition table.
    pub fn root_plane(&self) -> Option<PlaneId> {
        if self.planes.is_empty() {
            None
        } else {
            Some(PlaneId(0))
        }
    }

    pub fn plane(&self, id: PlaneId) -> &HyperPlane {
        &self.planes[id.index()]
    }

    pub fn rep_state(&self, id: RepStateId) -> &RepresenterState<N, T> {
        &self.rep_states[id.index()]
    }

    /// Representer ids known at `dim`, in discovery order.
    pub fn reps_at(&self, dim: usize) -> &[RepStateId] {
        &self.dims[dim].order
    }

    /// Intern `projection` at `dim`, recording `state` as represented by
    /// it either way. Returns the representer id and whether it is new to
    /// this dimension.
    pub fn intern_rep(
        &mut self,
        dim: usize,
        projection: RepresenterState<N, T>,
        state: StateId,
        state_number: u32,
    ) -> (RepStateId, bool) {
        let key = projection.key();
        let dimension = &mut self.dims[dim];

        let (id, novel) = match dimension.known.get(&key) {
            Some(&id) => (id, false),
            None => {
                let id = RepStateId(self.rep_states.len() as u32);
                self.rep_states.push(projection);
                dimension.known.insert(key, id);
                dimension.order.push(id);
                (id, true)
            }
        };

        self.rep_states[id.index()].add_represented(state);
        dimension.by_state.insert(state_number, id);
        (id, novel)
    }

    /// The representer covering `state_number` at operand position `dim`.
    /// Positions past the last dimension of a variadic operator fold onto
    /// the last dimension.
    pub fn representer_state(&self, state_number: u32, dim: usize) -> Option<RepStateId> {
        if self.dims.is_empty() {
            return None;
        }
        let d = dim.min(self.dims.len() - 1);
        self.dims[d].by_state.get(&state_number).copied()
    }

    /// Install the transition `tuple → result`. An empty tuple records the
    /// operator's leaf state. When the final dimension turns out fully
    /// variadic, its keys also loop back to the same plane so additional
    /// operands of a variadic call stay in place.
    pub fn add_transition(
        &mut self,
        tuple: &[RepStateId],
        result: StateId,
        states: &[State<N, T>],
        productions: &[Production<N, T>],
    ) {
        if tuple.is_empty() {
            self.leaf_state = Some(result);
            return;
        }

        let mut current = PlaneId(0);
        for (dim, &key) in tuple.iter().enumerate() {
            if dim < tuple.len() - 1 {
                current = match self.planes[current.index()].next_dimension(key) {
                    Some(next) => next,
                    None => {
                        let next = PlaneId(self.planes.len() as u32);
                        self.planes.push(HyperPlane::new());
                        self.planes[current.index()].set_next(key, next);
                        next
                    }
                };
            } else {
                self.planes[current.index()].set_result(key, result);
                if self.plane_is_var_args(current, states, productions) {
                    self.planes[current.index()].set_next(key, current);
                }
            }
        }
    }

    /// True if every result state reachable from `plane` is variadic and
    /// every child plane is either the plane itself or variadic in turn.
    fn plane_is_var_args(
        &self,
        plane: PlaneId,
        states: &[State<N, T>],
        productions: &[Production<N, T>],
    ) -> bool {
        let p = &self.planes[plane.index()];
        p.result_states()
            .all(|sid| states[sid.index()].is_var_args(productions))
            && p.next_entries()
                .all(|(_, child)| child == plane || self.plane_is_var_args(child, states, productions))
    }

    /// Total number of representer states across dimensions.
    pub fn rep_state_count(&self) -> usize {
        self.rep_states.len()
    }
}
