//! States: equivalence classes of input subtrees.
//!
//! A state records, per nonterminal, the cheapest production discovered so
//! far — pattern matches with their costs, and closures reached from those
//! patterns. States are interned into a canonical set once their closure
//! fixed point is applied; interning assigns the state number the label
//! pass later writes onto input nodes.

use crate::cost::{self, Cost, INFINITE_COST};
use crate::production::{Production, ProductionId};
use std::collections::BTreeMap;
use std::fmt;

/// Index of a canonical state in the table's arena. The public state
/// number is `id + 1`; `0` stays free as the unlabeled sentinel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub(crate) u32);

impl StateId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }

    /// The public state number for this id.
    #[inline]
    pub(crate) fn number(self) -> u32 {
        self.0 + 1
    }
}

/// The identity of a state: node type and pattern map only.
///
/// Costs and closures are deliberately excluded. Later iterations of the
/// fixed point can re-derive a state whose costs differ only because a
/// closure chain has grown; hashing costs would make such states distinct
/// and the computation would never converge. Two states with the same
/// pattern map also have the same cost map after closure, so the pattern
/// map is a sound identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StateKey<N: Ord, T> {
    node_type: Option<T>,
    patterns: BTreeMap<N, ProductionId>,
}

/// An equivalence class of input subtrees.
pub struct State<N: Ord, T> {
    /// The state's number, assigned on interning; `0` until then.
    pub number: u32,
    /// The node type this state characterizes, or `None` for a null-guard
    /// state.
    node_type: Option<T>,
    /// Best pattern match per nonterminal.
    patterns: BTreeMap<N, ProductionId>,
    /// Cost of each pattern match; always the same key set as `patterns`.
    pattern_costs: BTreeMap<N, Cost>,
    /// Closures reached from this state, keyed by the nonterminal they
    /// derive. Never overlaps `patterns`.
    closures: BTreeMap<N, ProductionId>,
    /// Set once the closure fixed point has been applied.
    finished: bool,
}

impl<N: Copy + Ord, T: Copy + Eq> State<N, T> {
    /// A fresh state for subtrees rooted at `node_type`.
    pub fn new(node_type: T) -> Self {
        State {
            number: 0,
            node_type: Some(node_type),
            patterns: BTreeMap::new(),
            pattern_costs: BTreeMap::new(),
            closures: BTreeMap::new(),
            finished: false,
        }
    }

    /// The node type, or `None` for a null-guard state.
    pub fn node_type(&self) -> Option<T> {
        self.node_type
    }

    /// Number of pattern-matching productions recorded.
    pub fn pattern_count(&self) -> usize {
        debug_assert_eq!(self.patterns.len(), self.pattern_costs.len());
        self.patterns.len()
    }

    /// True if no pattern matches this state.
    pub fn is_empty(&self) -> bool {
        self.pattern_count() == 0
    }

    /// Record a pattern match for `target` at `cost`, displacing any prior
    /// entry. The caller must have established `cost < self.cost(target)`.
    pub fn set_pattern(&mut self, target: N, production: ProductionId, new_cost: Cost) {
        debug_assert!(!self.finished, "state already finished");
        self.pattern_costs.insert(target, new_cost);
        self.patterns.insert(target, production);
    }

    /// The cost of producing `nt` from this state: the pattern cost if a
    /// pattern produces it, otherwise the closure's own cost plus the cost
    /// of its source (closure chains are acyclic, so this terminates),
    /// otherwise infinity.
    pub fn cost(&self, nt: N, productions: &[Production<N, T>]) -> Cost {
        if let Some(&c) = self.pattern_costs.get(&nt) {
            c
        } else if let Some(&id) = self.closures.get(&nt) {
            match &productions[id.index()] {
                Production::Closure(c) => cost::add(c.own_cost, self.cost(c.source, productions)),
                Production::Pattern(_) => {
                    unreachable!("closure map entry refers to a pattern production")
                }
            }
        } else {
            INFINITE_COST
        }
    }

    /// The production deriving `goal`: a pattern if one produces it, else
    /// a closure, else `None`.
    pub fn production(&self, goal: N) -> Option<ProductionId> {
        self.patterns
            .get(&goal)
            .or_else(|| self.closures.get(&goal))
            .copied()
    }

    /// Record `closure` iff it is the cheapest way to its target seen so
    /// far. Returns whether it was recorded.
    pub fn add_closure(
        &mut self,
        id: ProductionId,
        productions: &[Production<N, T>],
    ) -> bool {
        debug_assert!(!self.finished, "closure added to a finished state");
        let closure = match &productions[id.index()] {
            Production::Closure(c) => *c,
            Production::Pattern(_) => unreachable!("add_closure given a pattern production"),
        };

        let closure_cost = cost::add(closure.own_cost, self.cost(closure.source, productions));
        if closure_cost < self.cost(closure.target, productions) {
            self.closures.insert(closure.target, id);
            true
        } else {
            false
        }
    }

    /// True if every pattern in this state is variadic. Vacuously true for
    /// an empty state.
    pub fn is_var_args(&self, productions: &[Production<N, T>]) -> bool {
        self.patterns.values().all(|id| match &productions[id.index()] {
            Production::Pattern(p) => p.var_args,
            Production::Closure(_) => unreachable!("pattern map entry refers to a closure"),
        })
    }

    /// Every nonterminal this state can produce, patterns first.
    pub fn nonterminals(&self) -> Vec<N> {
        let mut result: Vec<N> = self.patterns.keys().copied().collect();
        for n in self.closures.keys() {
            debug_assert!(
                !self.patterns.contains_key(n),
                "closure occludes a pattern match"
            );
            result.push(*n);
        }
        result
    }

    /// Iterate the pattern map in nonterminal order.
    pub fn patterns(&self) -> impl Iterator<Item = (N, ProductionId, Cost)> + '_ {
        self.patterns
            .iter()
            .map(move |(n, id)| (*n, *id, self.pattern_costs[n]))
    }

    /// Iterate the closure map in nonterminal order.
    pub fn closures(&self) -> impl Iterator<Item = (N, ProductionId)> + '_ {
        self.closures.iter().map(|(n, id)| (*n, *id))
    }

    /// Mark the closure fixed point applied; further mutation is an error.
    pub fn finish(&mut self) {
        self.finished = true;
    }

    /// Whether `finish` has been called.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// This state's identity for interning.
    pub fn key(&self) -> StateKey<N, T> {
        StateKey {
            node_type: self.node_type,
            patterns: self.patterns.clone(),
        }
    }
}

impl<N: Copy + Ord + fmt::Debug, T: Copy + Eq + fmt::Debug> fmt::Display for State<N, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "State {} {:?}", self.number, self.node_type)?;
        if !self.patterns.is_empty() {
            write!(f, " patterns(")?;
            for (i, (n, id)) in self.patterns.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{:?}={:?}:{}", n, id, self.pattern_costs[n])?;
            }
            write!(f, ")")?;
        }
        if !self.closures.is_empty() {
            write!(f, " closures(")?;
            for (i, (n, id)) in self.closures.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{:?}={:?}", n, id)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}
