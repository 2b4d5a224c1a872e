//! The production table: grammar construction and state generation.
//!
//! Grammar construction populates the production arena and the operator
//! set; `generate_states` then runs a worklist-driven fixed point that
//! discovers every reachable equivalence-class state and fills in the
//! operators' transition tables. After generation the table is frozen:
//! no mutation paths remain on its public surface, so any number of
//! reducers may share it concurrently.

use crate::cost::{self, Cost};
use crate::operator::Operator;
use crate::production::{Closure, PatternMatcher, Production, ProductionId};
use crate::reducer::label_tree;
use crate::repstate::{RepStateId, RepresenterState};
use crate::semantics::{
    Actions, ClosureActions, ClosurePostCallback, HostRoutine, InputTree, PatternActions,
    TreeGrammar,
};
use crate::state::{State, StateId, StateKey};
use log::{debug, trace};
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::mem;
use thiserror::Error;

/// Errors raised while a grammar is being constructed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrammarError<N: Debug> {
    /// A closure whose target and source coincide.
    #[error("closure target and source must differ: {0:?}")]
    SelfClosure(N),
    /// Adding the closure would create a cycle among closures.
    #[error("closure cycle through {0:?}")]
    ClosureCycle(N),
}

/// Counters describing a `generate_states` run.
#[derive(Debug, Clone, Default)]
pub struct GenerationStats {
    /// Canonical states interned (including empty states).
    pub states: usize,
    /// Candidate states discarded as duplicates.
    pub duplicates: usize,
    /// Representer states across all operators and dimensions.
    pub representer_states: usize,
    /// Transitions installed into hyperplanes (leaf transitions included).
    pub transitions: usize,
    /// Worklist pops.
    pub iterations: usize,
}

/// A set of tree-grammar productions and, once generated, the transition
/// automaton derived from them.
pub struct ProductionTable<G: TreeGrammar> {
    /// All productions, in insertion order; `ProductionId` indexes here.
    productions: Vec<Production<G::Nonterminal, G::NodeType>>,
    /// Semantic actions, parallel to `productions`.
    actions: Vec<Actions<G>>,
    /// The closure productions, in insertion order.
    closure_ids: Vec<ProductionId>,
    /// Every nonterminal mentioned by any production.
    nonterminals: BTreeSet<G::Nonterminal>,
    /// Operators by node type, indexed by arity within each entry.
    operators: BTreeMap<G::NodeType, Vec<Option<Operator<G::Nonterminal, G::NodeType>>>>,
    /// Pattern productions grouped by node type.
    by_node_type: BTreeMap<G::NodeType, Vec<ProductionId>>,
    /// Canonical states; a state's number is its index + 1.
    states: Vec<State<G::Nonterminal, G::NodeType>>,
    /// Identity index over `states` for deduplication.
    state_index: FxHashMap<StateKey<G::Nonterminal, G::NodeType>, StateId>,
    generated: bool,
    stats: GenerationStats,
}

impl<G: TreeGrammar> Default for ProductionTable<G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G: TreeGrammar> ProductionTable<G> {
    pub fn new() -> Self {
        ProductionTable {
            productions: Vec::new(),
            actions: Vec::new(),
            closure_ids: Vec::new(),
            nonterminals: BTreeSet::new(),
            operators: BTreeMap::new(),
            by_node_type: BTreeMap::new(),
            states: Vec::new(),
            state_index: FxHashMap::default(),
            generated: false,
            stats: GenerationStats::default(),
        }
    }

    // ------------------------------------------------------------------
    // Grammar construction
    // ------------------------------------------------------------------

    /// Add a fixed-arity pattern match at the default cost of 1.
    pub fn add_pattern_match(
        &mut self,
        target: G::Nonterminal,
        node_type: G::NodeType,
        post: Option<Box<dyn HostRoutine<G>>>,
        child_types: Vec<G::Nonterminal>,
    ) -> ProductionId {
        self.add_pattern_match_with_cost(target, node_type, 1, post, child_types)
    }

    /// Add a fixed-arity pattern match with an explicit cost.
    pub fn add_pattern_match_with_cost(
        &mut self,
        target: G::Nonterminal,
        node_type: G::NodeType,
        cost: Cost,
        post: Option<Box<dyn HostRoutine<G>>>,
        child_types: Vec<G::Nonterminal>,
    ) -> ProductionId {
        self.add_pattern(
            PatternMatcher::new(target, node_type, cost, child_types),
            post.map(PatternActions::post).unwrap_or_default(),
        )
    }

    /// Add a variadic pattern match (last child type repeats) at the
    /// default cost of 1.
    pub fn add_var_args_pattern_match(
        &mut self,
        target: G::Nonterminal,
        node_type: G::NodeType,
        post: Option<Box<dyn HostRoutine<G>>>,
        child_types: Vec<G::Nonterminal>,
    ) -> ProductionId {
        self.add_var_args_pattern_match_with_cost(target, node_type, 1, post, child_types)
    }

    /// Add a variadic pattern match with an explicit cost.
    pub fn add_var_args_pattern_match_with_cost(
        &mut self,
        target: G::Nonterminal,
        node_type: G::NodeType,
        cost: Cost,
        post: Option<Box<dyn HostRoutine<G>>>,
        child_types: Vec<G::Nonterminal>,
    ) -> ProductionId {
        self.add_pattern(
            PatternMatcher::var_args(target, node_type, cost, child_types),
            post.map(PatternActions::post).unwrap_or_default(),
        )
    }

    /// Add a pattern match in full generality: any matcher, any actions
    /// (predicate, pre- and post-callbacks).
    pub fn add_pattern(
        &mut self,
        matcher: PatternMatcher<G::Nonterminal, G::NodeType>,
        actions: PatternActions<G>,
    ) -> ProductionId {
        assert!(
            !self.generated,
            "the grammar is frozen once generate_states has run"
        );
        let id = ProductionId(self.productions.len() as u32);
        self.nonterminals.insert(matcher.target);
        self.nonterminals.extend(matcher.child_types.iter().copied());

        let node_type = matcher.node_type;
        let arity = matcher.arity();
        self.by_node_type.entry(node_type).or_default().push(id);

        let ops = self.operators.entry(node_type).or_default();
        if ops.len() < arity + 1 {
            ops.resize_with(arity + 1, || None);
        }
        let op = ops[arity].get_or_insert_with(|| Operator::new(node_type, arity));
        if matcher.var_args {
            op.mark_var_args();
        }

        self.productions.push(Production::Pattern(matcher));
        self.actions.push(Actions::Pattern(actions));
        id
    }

    /// Add a closure at the default cost of 0.
    pub fn add_closure(
        &mut self,
        target: G::Nonterminal,
        source: G::Nonterminal,
        post: Option<ClosurePostCallback<G>>,
    ) -> Result<ProductionId, GrammarError<G::Nonterminal>> {
        self.add_closure_with_cost(target, source, 0, post)
    }

    /// Add a closure with an explicit cost.
    pub fn add_closure_with_cost(
        &mut self,
        target: G::Nonterminal,
        source: G::Nonterminal,
        cost: Cost,
        post: Option<ClosurePostCallback<G>>,
    ) -> Result<ProductionId, GrammarError<G::Nonterminal>> {
        self.add_closure_production(
            Closure::new(target, source, cost),
            post.map(ClosureActions::post).unwrap_or_default(),
        )
    }

    /// Add a closure in full generality.
    pub fn add_closure_production(
        &mut self,
        closure: Closure<G::Nonterminal>,
        actions: ClosureActions<G>,
    ) -> Result<ProductionId, GrammarError<G::Nonterminal>> {
        assert!(
            !self.generated,
            "the grammar is frozen once generate_states has run"
        );
        if closure.target == closure.source {
            return Err(GrammarError::SelfClosure(closure.target));
        }
        if self.closure_reaches(closure.source, closure.target) {
            return Err(GrammarError::ClosureCycle(closure.target));
        }

        let id = ProductionId(self.productions.len() as u32);
        self.nonterminals.insert(closure.target);
        self.nonterminals.insert(closure.source);
        self.closure_ids.push(id);
        self.productions.push(Production::Closure(closure));
        self.actions.push(Actions::Closure(actions));
        Ok(id)
    }

    /// Whether `from` transitively derives via closures from `to`.
    fn closure_reaches(&self, from: G::Nonterminal, to: G::Nonterminal) -> bool {
        if from == to {
            return true;
        }
        let mut stack = vec![from];
        let mut seen = BTreeSet::new();
        while let Some(n) = stack.pop() {
            if !seen.insert(n) {
                continue;
            }
            for &cid in &self.closure_ids {
                if let Production::Closure(c) = &self.productions[cid.index()] {
                    if c.target == n {
                        if c.source == to {
                            return true;
                        }
                        stack.push(c.source);
                    }
                }
            }
        }
        false
    }

    // ------------------------------------------------------------------
    // State generation
    // ------------------------------------------------------------------

    /// Run the state-generation fixed point. Idempotent; must be called
    /// before the table is used for labeling or reduction.
    pub fn generate_states(&mut self) {
        if self.generated {
            return;
        }
        self.generated = true;

        let mut worklist = self.generate_leaf_states();

        // The operators are taken out of `self` for the duration of the
        // loop so transitions can be installed while new states are
        // interned into the table.
        let mut operators = mem::take(&mut self.operators);
        while let Some(sid) = worklist.pop() {
            self.stats.iterations += 1;
            for ops in operators.values_mut() {
                for op in ops.iter_mut().flatten() {
                    if op.arity() == 0 {
                        continue;
                    }
                    self.compute_transitions(op, sid, &mut worklist);
                }
            }
        }
        self.operators = operators;

        self.stats.states = self.states.len();
        self.stats.representer_states = self
            .operators
            .values()
            .flat_map(|ops| ops.iter().flatten())
            .map(|op| op.rep_state_count())
            .sum();
        debug!(
            "generated {} states ({} duplicates discarded, {} representer states, {} transitions)",
            self.stats.states,
            self.stats.duplicates,
            self.stats.representer_states,
            self.stats.transitions
        );
    }

    /// Seed the worklist with one state per node type, holding the node
    /// type's leaf patterns. Node types without leaf patterns still intern
    /// their (empty) state so error transitions have a canonical target.
    fn generate_leaf_states(&mut self) -> Vec<StateId> {
        let mut worklist = Vec::new();
        let node_types: Vec<G::NodeType> = self.operators.keys().copied().collect();

        for node_type in node_types {
            let mut state = State::new(node_type);
            for (index, production) in self.productions.iter().enumerate() {
                if let Production::Pattern(p) = production {
                    if p.node_type == node_type
                        && p.is_leaf()
                        && p.own_cost < state.cost(p.target, &self.productions)
                    {
                        state.set_pattern(p.target, ProductionId(index as u32), p.own_cost);
                    }
                }
            }

            let non_empty = !state.is_empty();
            if non_empty {
                self.apply_closures(&mut state);
            } else {
                state.finish();
            }
            let (sid, novel) = self.intern_state(state);

            if non_empty {
                let number = self.states[sid.index()].number;
                if let Some(ops) = self.operators.get_mut(&node_type) {
                    if let Some(op) = ops.get_mut(0).and_then(|slot| slot.as_mut()) {
                        op.add_transition(&[], sid, &self.states, &self.productions);
                        self.stats.transitions += 1;
                    }
                }
                if novel {
                    trace!("leaf state {} for {:?}", number, node_type);
                    worklist.push(sid);
                }
            }
        }
        worklist
    }

    /// Project `sid` onto every operand position of `op`, and permute the
    /// operator's representer states around each novel projection.
    fn compute_transitions(
        &mut self,
        op: &mut Operator<G::Nonterminal, G::NodeType>,
        sid: StateId,
        worklist: &mut Vec<StateId>,
    ) {
        let candidates = self.patterns_accepting(op);
        let number = self.states[sid.index()].number;

        for dim in 0..op.arity() {
            let projection = self.project(op, &candidates, dim, sid);
            let (rep, novel) = op.intern_rep(dim, projection, sid, number);
            if novel {
                debug!(
                    "representer state {} at {:?}/{} dim {}",
                    op.rep_state(rep),
                    op.node_type(),
                    op.arity(),
                    dim
                );
                let mut prefix = Vec::with_capacity(op.arity());
                self.permute(op, &candidates, 0, dim, rep, &mut prefix, worklist);
            }
        }
    }

    /// The pattern productions applicable to `op`: fixed matchers of the
    /// operator's exact arity plus variadic matchers of no greater arity.
    fn patterns_accepting(
        &self,
        op: &Operator<G::Nonterminal, G::NodeType>,
    ) -> Vec<ProductionId> {
        self.by_node_type
            .get(&op.node_type())
            .map(|ids| {
                ids.iter()
                    .copied()
                    .filter(|id| {
                        self.pattern(*id).accepts_dimension(op.arity())
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Project a state onto one operand position of one operator: carry
    /// forward the costs of exactly those nonterminals the operator's
    /// patterns use at that position.
    fn project(
        &self,
        op: &Operator<G::Nonterminal, G::NodeType>,
        candidates: &[ProductionId],
        dim: usize,
        sid: StateId,
    ) -> RepresenterState<G::Nonterminal, G::NodeType> {
        let state = &self.states[sid.index()];
        let mut result = RepresenterState::new(op.node_type());
        for &pid in candidates {
            let n = self.pattern(pid).nonterminal(dim);
            let c = state.cost(n, &self.productions);
            if c < result.cost(n) {
                result.set_cost(n, c);
            }
        }
        result
    }

    /// Enumerate every child tuple with `pivot` fixed at `pivot_dim` and
    /// the other dimensions ranging over their known representer states;
    /// derive and install the resulting state for each tuple.
    #[allow(clippy::too_many_arguments)]
    fn permute(
        &mut self,
        op: &mut Operator<G::Nonterminal, G::NodeType>,
        candidates: &[ProductionId],
        dim: usize,
        pivot_dim: usize,
        pivot: RepStateId,
        prefix: &mut Vec<RepStateId>,
        worklist: &mut Vec<StateId>,
    ) {
        if dim == op.arity() {
            let result = self.analyze_tuple(op, candidates, prefix, worklist);
            op.add_transition(prefix, result, &self.states, &self.productions);
            self.stats.transitions += 1;
        } else if dim == pivot_dim {
            prefix.push(pivot);
            self.permute(op, candidates, dim + 1, pivot_dim, pivot, prefix, worklist);
            prefix.pop();
        } else {
            for index in 0..op.reps_at(dim).len() {
                let rep = op.reps_at(dim)[index];
                prefix.push(rep);
                self.permute(op, candidates, dim + 1, pivot_dim, pivot, prefix, worklist);
                prefix.pop();
            }
        }
    }

    /// Derive the state reached through one child tuple: try every
    /// applicable pattern, keep the cheapest per target nonterminal, close
    /// over the closures, and intern.
    fn analyze_tuple(
        &mut self,
        op: &Operator<G::Nonterminal, G::NodeType>,
        candidates: &[ProductionId],
        tuple: &[RepStateId],
        worklist: &mut Vec<StateId>,
    ) -> StateId {
        let mut result = State::new(op.node_type());

        for &pid in candidates {
            let p = self.pattern(pid);
            let mut total = p.own_cost;
            for (dim, &rep) in tuple.iter().enumerate() {
                if !cost::is_finite(total) {
                    break;
                }
                total = cost::add(total, op.rep_state(rep).cost(p.nonterminal(dim)));
            }
            if total < result.cost(p.target, &self.productions) {
                result.set_pattern(p.target, pid, total);
            }
        }

        let non_empty = !result.is_empty();
        if non_empty {
            self.apply_closures(&mut result);
        } else {
            result.finish();
        }

        let (sid, novel) = self.intern_state(result);
        if novel {
            trace!(
                "state {} from {:?}/{} tuple {:?}",
                self.states[sid.index()].number,
                op.node_type(),
                op.arity(),
                tuple
            );
            if non_empty {
                worklist.push(sid);
            }
        }
        sid
    }

    /// Transitively apply closures to `state` until quiescent, then mark
    /// it finished. A closure is only ever recorded for a target whose
    /// cost is still infinite, so a closure can never displace a pattern
    /// match — state identity depends on that.
    fn apply_closures(&self, state: &mut State<G::Nonterminal, G::NodeType>) {
        let mut recorded = true;
        while recorded {
            recorded = false;
            for &cid in &self.closure_ids {
                let closure = match &self.productions[cid.index()] {
                    Production::Closure(c) => *c,
                    Production::Pattern(_) => continue,
                };
                if cost::is_finite(state.cost(closure.target, &self.productions)) {
                    continue;
                }
                let reached = cost::add(
                    state.cost(closure.source, &self.productions),
                    closure.own_cost,
                );
                if cost::is_finite(reached) && state.add_closure(cid, &self.productions) {
                    recorded = true;
                }
            }
        }
        state.finish();
    }

    /// Intern a finished candidate state, returning the canonical id and
    /// whether the candidate was new. Duplicates are discarded; the first
    /// interning assigned the state number.
    fn intern_state(
        &mut self,
        mut state: State<G::Nonterminal, G::NodeType>,
    ) -> (StateId, bool) {
        debug_assert!(state.is_finished(), "interning an unfinished state");
        let key = state.key();
        match self.state_index.get(&key) {
            Some(&sid) => {
                self.stats.duplicates += 1;
                (sid, false)
            }
            None => {
                let sid = StateId(self.states.len() as u32);
                state.number = sid.number();
                self.states.push(state);
                self.state_index.insert(key, sid);
                (sid, true)
            }
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Whether `generate_states` has run.
    pub fn is_generated(&self) -> bool {
        self.generated
    }

    /// Number of canonical states.
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// The state with the given public number (numbered from 1).
    pub fn state(&self, number: u32) -> Option<&State<G::Nonterminal, G::NodeType>> {
        if number == 0 {
            return None;
        }
        self.states.get(number as usize - 1)
    }

    /// Generation counters.
    pub fn stats(&self) -> &GenerationStats {
        &self.stats
    }

    /// Every nonterminal mentioned by any production, in order.
    pub fn nonterminals(&self) -> impl Iterator<Item = G::Nonterminal> + '_ {
        self.nonterminals.iter().copied()
    }

    /// The operator handling `node_type` with `child_count` operands:
    /// the exact-arity operator when one exists, otherwise the largest
    /// variadic operator of arity at most `child_count`.
    pub fn operator(
        &self,
        node_type: G::NodeType,
        child_count: usize,
    ) -> Option<&Operator<G::Nonterminal, G::NodeType>> {
        let ops = self.operators.get(&node_type)?;
        if let Some(op) = ops.get(child_count).and_then(|slot| slot.as_ref()) {
            return Some(op);
        }
        ops.iter()
            .enumerate()
            .rev()
            .filter(|(arity, _)| *arity <= child_count)
            .find_map(|(_, slot)| slot.as_ref().filter(|op| op.is_var_args()))
    }

    /// Iterate all operators, ordered by node type then arity.
    pub fn operators(
        &self,
    ) -> impl Iterator<Item = &Operator<G::Nonterminal, G::NodeType>> + '_ {
        self.operators.values().flat_map(|ops| ops.iter().flatten())
    }

    /// Iterate the canonical states in numbering order.
    pub fn states(&self) -> impl Iterator<Item = &State<G::Nonterminal, G::NodeType>> + '_ {
        self.states.iter()
    }

    /// Label `node` and report whether its root state can produce `goal`.
    /// A predicate on the underlying pattern production is consulted when
    /// present.
    pub fn can_produce(
        &self,
        node: &mut G::Node,
        goal: G::Nonterminal,
        visitor: &mut G::Visitor,
    ) -> bool {
        assert!(
            self.generated,
            "generate_states must run before can_produce"
        );
        if label_tree(self, node).is_err() {
            return false;
        }
        let state = match self.state(node.state_number()) {
            Some(state) => state,
            None => return false,
        };
        let mut current = match state.production(goal) {
            Some(id) => id,
            None => return false,
        };
        // Chase the closure chain down to the pattern production.
        loop {
            match &self.productions[current.index()] {
                Production::Closure(c) => {
                    current = match state.production(c.source) {
                        Some(id) => id,
                        None => return false,
                    };
                }
                Production::Pattern(_) => break,
            }
        }
        match &self.actions[current.index()] {
            Actions::Pattern(actions) => actions
                .predicate
                .as_ref()
                .map_or(true, |predicate| predicate(visitor, node)),
            Actions::Closure(_) => false,
        }
    }

    /// The production with the given id.
    pub fn production(&self, id: ProductionId) -> &Production<G::Nonterminal, G::NodeType> {
        &self.productions[id.index()]
    }

    /// All productions, in insertion order. `State::cost` and
    /// `State::production` resolve against this slice.
    pub fn productions(&self) -> &[Production<G::Nonterminal, G::NodeType>] {
        &self.productions
    }

    // ------------------------------------------------------------------
    // Internal accessors shared with the reducer and dumper
    // ------------------------------------------------------------------

    pub(crate) fn pattern(&self, id: ProductionId) -> &PatternMatcher<G::Nonterminal, G::NodeType> {
        match &self.productions[id.index()] {
            Production::Pattern(p) => p,
            Production::Closure(_) => unreachable!("production {id:?} is not a pattern"),
        }
    }

    pub(crate) fn production_actions(&self, id: ProductionId) -> &Actions<G> {
        &self.actions[id.index()]
    }

    pub(crate) fn state_by_id(&self, sid: StateId) -> &State<G::Nonterminal, G::NodeType> {
        &self.states[sid.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{leaf, node, Calc, Nt, Op, Trace};

    /// Reg <- Const : 1; Reg <- Plus(Reg, Reg) : 1; Addr <- Reg : 0.
    fn arithmetic_table() -> ProductionTable<Calc> {
        let mut table = ProductionTable::new();
        table.add_pattern_match(Nt::Reg, Op::Const, None, vec![]);
        table.add_pattern_match(Nt::Reg, Op::Plus, None, vec![Nt::Reg, Nt::Reg]);
        table.add_closure(Nt::Addr, Nt::Reg, None).unwrap();
        table.generate_states();
        table
    }

    #[test]
    fn test_minimal_arithmetic_state_set() {
        let table = arithmetic_table();
        // The Const leaf state, the (empty) Plus leaf state, and the Plus
        // result state.
        assert_eq!(table.state_count(), 3);

        let const_leaf = table.state(1).unwrap();
        assert_eq!(const_leaf.node_type(), Some(Op::Const));
        assert_eq!(const_leaf.cost(Nt::Reg, table.productions()), 1);
        assert_eq!(const_leaf.cost(Nt::Addr, table.productions()), 1);

        let plus_leaf = table.state(2).unwrap();
        assert_eq!(plus_leaf.node_type(), Some(Op::Plus));
        assert!(plus_leaf.is_empty());

        let plus = table.state(3).unwrap();
        assert_eq!(plus.node_type(), Some(Op::Plus));
        assert_eq!(plus.cost(Nt::Reg, table.productions()), 3);
        assert_eq!(plus.cost(Nt::Addr, table.productions()), 3);
        assert_eq!(plus.production(Nt::Reg), Some(ProductionId(1)));
    }

    #[test]
    fn test_leaf_operator_records_its_state() {
        let table = arithmetic_table();
        let op = table.operator(Op::Const, 0).unwrap();
        let sid = op.leaf_state().unwrap();
        assert_eq!(table.state_by_id(sid).number, 1);
        // Plus has no leaf productions, hence no arity-0 operator.
        assert!(table.operator(Op::Plus, 0).is_none());
    }

    #[test]
    fn test_equal_cost_keeps_earliest_production() {
        let mut table: ProductionTable<Calc> = ProductionTable::new();
        table.add_pattern_match(Nt::Reg, Op::Const, None, vec![]);
        let first = table.add_pattern_match_with_cost(Nt::Reg, Op::Neg, 2, None, vec![Nt::Reg]);
        let second = table.add_pattern_match_with_cost(Nt::Reg, Op::Neg, 2, None, vec![Nt::Reg]);
        table.generate_states();

        let neg = table
            .states()
            .find(|s| s.node_type() == Some(Op::Neg) && !s.is_empty())
            .unwrap();
        assert_eq!(neg.production(Nt::Reg), Some(first));
        assert_ne!(neg.production(Nt::Reg), Some(second));
    }

    #[test]
    fn test_cheaper_production_displaces_earlier_one() {
        let mut table: ProductionTable<Calc> = ProductionTable::new();
        table.add_pattern_match(Nt::Reg, Op::Const, None, vec![]);
        let _expensive =
            table.add_pattern_match_with_cost(Nt::Reg, Op::Neg, 5, None, vec![Nt::Reg]);
        let cheap = table.add_pattern_match_with_cost(Nt::Reg, Op::Neg, 2, None, vec![Nt::Reg]);
        table.generate_states();

        let neg = table
            .states()
            .find(|s| s.node_type() == Some(Op::Neg) && !s.is_empty())
            .unwrap();
        assert_eq!(neg.production(Nt::Reg), Some(cheap));
    }

    #[test]
    fn test_closure_chain_costs_and_productions() {
        let mut table: ProductionTable<Calc> = ProductionTable::new();
        table.add_pattern_match_with_cost(Nt::A, Op::X, 0, None, vec![]);
        let b_from_a = table.add_closure_with_cost(Nt::B, Nt::A, 1, None).unwrap();
        let c_from_b = table.add_closure_with_cost(Nt::C, Nt::B, 1, None).unwrap();
        table.generate_states();

        let x = table.state(1).unwrap();
        assert_eq!(x.node_type(), Some(Op::X));
        assert_eq!(x.cost(Nt::A, table.productions()), 0);
        assert_eq!(x.cost(Nt::B, table.productions()), 1);
        assert_eq!(x.cost(Nt::C, table.productions()), 2);
        assert_eq!(x.production(Nt::B), Some(b_from_a));
        assert_eq!(x.production(Nt::C), Some(c_from_b));
    }

    #[test]
    fn test_self_closure_rejected() {
        let mut table: ProductionTable<Calc> = ProductionTable::new();
        assert_eq!(
            table.add_closure(Nt::A, Nt::A, None),
            Err(GrammarError::SelfClosure(Nt::A))
        );
    }

    #[test]
    fn test_closure_cycle_rejected() {
        let mut table: ProductionTable<Calc> = ProductionTable::new();
        table.add_closure(Nt::B, Nt::A, None).unwrap();
        assert_eq!(
            table.add_closure(Nt::A, Nt::B, None),
            Err(GrammarError::ClosureCycle(Nt::A))
        );

        // A longer cycle: C <- B <- A already in place, closing A <- C.
        table.add_closure(Nt::C, Nt::B, None).unwrap();
        assert_eq!(
            table.add_closure(Nt::A, Nt::C, None),
            Err(GrammarError::ClosureCycle(Nt::A))
        );
    }

    #[test]
    fn test_generate_states_is_idempotent() {
        let mut table = arithmetic_table();
        let states = table.state_count();
        let transitions = table.stats().transitions;
        table.generate_states();
        assert_eq!(table.state_count(), states);
        assert_eq!(table.stats().transitions, transitions);
    }

    #[test]
    fn test_dedup_collapses_rederived_states() {
        let table = arithmetic_table();
        // The Plus result state is re-derived for every tuple containing
        // the costlier Plus projections; all of them collapse onto one
        // canonical state.
        assert_eq!(table.state_count(), 3);
        assert!(table.stats().duplicates > 0);
        assert!(table.stats().transitions > table.state_count());
    }

    #[test]
    fn test_generation_is_deterministic() {
        let a = arithmetic_table();
        let b = arithmetic_table();
        assert_eq!(a.state_count(), b.state_count());
        for (sa, sb) in a.states().zip(b.states()) {
            assert_eq!(sa.number, sb.number);
            assert_eq!(sa.node_type(), sb.node_type());
            let pa: Vec<_> = sa.patterns().collect();
            let pb: Vec<_> = sb.patterns().collect();
            assert_eq!(pa, pb);
            let ca: Vec<_> = sa.closures().collect();
            let cb: Vec<_> = sb.closures().collect();
            assert_eq!(ca, cb);
        }
    }

    #[test]
    fn test_patterns_and_closures_never_overlap() {
        let table = arithmetic_table();
        for state in table.states() {
            for (nt, _) in state.closures() {
                assert!(
                    state.patterns().all(|(p, _, _)| p != nt),
                    "state {} lists {:?} as both pattern and closure",
                    state.number,
                    nt
                );
            }
        }
    }

    #[test]
    fn test_closure_fixed_point_is_quiescent() {
        let mut table: ProductionTable<Calc> = ProductionTable::new();
        table.add_pattern_match_with_cost(Nt::A, Op::X, 0, None, vec![]);
        table.add_closure_with_cost(Nt::B, Nt::A, 1, None).unwrap();
        table.add_closure_with_cost(Nt::C, Nt::B, 1, None).unwrap();

        let mut state = State::new(Op::X);
        state.set_pattern(Nt::A, ProductionId(0), 0);
        table.apply_closures(&mut state);
        assert!(state.is_finished());

        // Quiescence: no closure still has an infinite target reachable
        // from a finite source.
        for &cid in &table.closure_ids {
            if let Production::Closure(c) = table.production(cid) {
                let target = state.cost(c.target, table.productions());
                let source = state.cost(c.source, table.productions());
                assert!(
                    cost::is_finite(target) || !cost::is_finite(source),
                    "closure {:?} could still fire",
                    cid
                );
            }
        }
    }

    #[test]
    fn test_mixed_arities_get_separate_operators() {
        let mut table: ProductionTable<Calc> = ProductionTable::new();
        table.add_pattern_match(Nt::Reg, Op::Const, None, vec![]);
        table.add_pattern_match(Nt::Reg, Op::Neg, None, vec![Nt::Reg]);
        table.add_pattern_match(Nt::Reg, Op::Neg, None, vec![Nt::Reg, Nt::Reg]);
        table.generate_states();

        assert_eq!(table.operator(Op::Neg, 1).unwrap().arity(), 1);
        assert_eq!(table.operator(Op::Neg, 2).unwrap().arity(), 2);
        // No variadic fallback exists for other arities.
        assert!(table.operator(Op::Neg, 3).is_none());
        assert!(table.operator(Op::Neg, 0).is_none());
    }

    #[test]
    fn test_variadic_operator_covers_larger_arities() {
        let mut table: ProductionTable<Calc> = ProductionTable::new();
        table.add_pattern_match(Nt::Item, Op::Item, None, vec![]);
        table.add_var_args_pattern_match(Nt::List, Op::List, None, vec![Nt::Item]);
        table.generate_states();

        for arity in [1usize, 2, 5] {
            let op = table.operator(Op::List, arity).unwrap();
            assert_eq!(op.arity(), 1);
            assert!(op.is_var_args());
        }
        assert!(table.operator(Op::List, 0).is_none());
    }

    #[test]
    fn test_can_produce_follows_goals_and_predicates() {
        let table = arithmetic_table();
        let mut visitor = Trace::default();

        let mut tree = node(Op::Plus, vec![leaf(Op::Const), leaf(Op::Const)]);
        assert!(table.can_produce(&mut tree, Nt::Reg, &mut visitor));
        assert!(table.can_produce(&mut tree, Nt::Addr, &mut visitor));
        assert!(!table.can_produce(&mut tree, Nt::Item, &mut visitor));

        let mut unknown = leaf(Op::Mystery);
        assert!(!table.can_produce(&mut unknown, Nt::Reg, &mut visitor));
    }

    #[test]
    fn test_can_produce_consults_the_pattern_predicate() {
        let mut table: ProductionTable<Calc> = ProductionTable::new();
        table.add_pattern(
            PatternMatcher::new(Nt::Reg, Op::Const, 1, vec![]),
            PatternActions {
                predicate: Some(Box::new(|visitor: &mut Trace, _| {
                    visitor.record("predicate");
                    false
                })),
                pre: None,
                post: None,
            },
        );
        table.generate_states();

        let mut visitor = Trace::default();
        let mut tree = leaf(Op::Const);
        assert!(!table.can_produce(&mut tree, Nt::Reg, &mut visitor));
        assert_eq!(visitor.events, ["predicate"]);
    }

    #[test]
    #[should_panic(expected = "frozen")]
    fn test_grammar_is_frozen_after_generation() {
        let mut table = arithmetic_table();
        table.add_pattern_match(Nt::Reg, Op::Neg, None, vec![Nt::Reg]);
    }

    #[test]
    fn test_stats_reflect_the_run() {
        let table = arithmetic_table();
        let stats = table.stats();
        assert_eq!(stats.states, 3);
        assert!(stats.iterations >= 2);
        assert!(stats.representer_states >= 2);
        assert!(stats.transitions >= 3);
    }

    #[test]
    fn test_nonterminals_cover_targets_and_operands() {
        let table = arithmetic_table();
        let nts: Vec<_> = table.nonterminals().collect();
        assert_eq!(nts, [Nt::Reg, Nt::Addr]);
    }
}
