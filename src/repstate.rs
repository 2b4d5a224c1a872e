//! Representer states: states projected onto one operand position.
//!
//! Many distinct states look identical from a given operand slot of a given
//! operator — only the costs of the nonterminals that operator actually
//! uses at that slot matter. Projecting onto that cost profile collapses
//! the states into a representer, which is what keeps the transition
//! tables finite.

use crate::cost::{Cost, INFINITE_COST};
use crate::state::StateId;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;

/// Index of a representer state in its operator's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepStateId(pub(crate) u32);

impl RepStateId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// The identity of a representer state: node type and cost profile.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RepStateKey<N: Ord + Hash, T: Hash> {
    node_type: T,
    costs: BTreeMap<N, Cost>,
}

/// A state as seen from one operand position of one operator.
pub struct RepresenterState<N: Ord, T> {
    node_type: T,
    /// Cost per nonterminal used at this operand position; nonterminals
    /// the operator cannot use here are simply absent (infinite).
    costs: BTreeMap<N, Cost>,
    /// Every canonical state that projected to this representer, in
    /// projection order. Used when dumping and when the label pass maps a
    /// state number back to its representer.
    represented: Vec<StateId>,
}

impl<N: Copy + Ord + Hash, T: Copy + Eq + Hash> RepresenterState<N, T> {
    /// An empty projection for `node_type`; costs start out infinite.
    pub fn new(node_type: T) -> Self {
        RepresenterState {
            node_type,
            costs: BTreeMap::new(),
            represented: Vec::new(),
        }
    }

    /// The operator node type this projection belongs to.
    pub fn node_type(&self) -> T {
        self.node_type
    }

    /// The projected cost of `nt`, or infinity.
    pub fn cost(&self, nt: N) -> Cost {
        self.costs.get(&nt).copied().unwrap_or(INFINITE_COST)
    }

    /// Record the projected cost of `nt`.
    pub fn set_cost(&mut self, nt: N, cost: Cost) {
        self.costs.insert(nt, cost);
    }

    /// True if nothing projects through this slot.
    pub fn is_empty(&self) -> bool {
        self.costs.is_empty()
    }

    /// Record a state as projecting to this representer.
    pub fn add_represented(&mut self, state: StateId) {
        if !self.represented.contains(&state) {
            self.represented.push(state);
        }
    }

    /// The states that projected here, in projection order.
    pub fn represented(&self) -> &[StateId] {
        &self.represented
    }

    /// This representer's identity for per-dimension interning.
    pub fn key(&self) -> RepStateKey<N, T> {
        RepStateKey {
            node_type: self.node_type,
            costs: self.costs.clone(),
        }
    }
}

impl<N: Copy + Ord + fmt::Debug, T: Copy + Eq + fmt::Debug> fmt::Display
    for RepresenterState<N, T>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}{{", self.node_type)?;
        for (i, (n, c)) in self.costs.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{:?}={}", n, c)?;
        }
        write!(f, "}}")
    }
}
