//! The tree-parsing automaton: label and reduce passes.
//!
//! A reducer works in two passes over a caller-owned tree. `label` walks
//! the tree post-order, navigating each operator's transition table to
//! assign every node a state number. `reduce` walks it again toward a goal
//! nonterminal, running the productions recorded in each node's state:
//! closure pre-callbacks on the way down, the pattern's post-order routine
//! over the reduced children, closure post-callbacks unwinding on the way
//! back up.

use crate::production::{Production, ProductionId};
use crate::semantics::{Actions, InputTree, TreeGrammar};
use crate::table::ProductionTable;
use log::trace;
use std::fmt::Debug;
use thiserror::Error;

/// Errors raised while labeling or reducing a tree.
///
/// Nothing is retried and nothing is swallowed: any of these aborts the
/// current call, leaving the production table untouched and reusable.
#[derive(Debug, Error)]
pub enum ReduceError<N: Debug, E: std::error::Error + 'static> {
    /// The node's state cannot produce the requested goal.
    #[error("state {state} cannot produce goal {goal:?}")]
    NoProduction { state: u32, goal: N },
    /// The node carries no state number; either `label` has not run or
    /// the operator set cannot classify this subtree.
    #[error("unlabeled node; label the tree before reducing it")]
    UnlabeledNode,
    /// A transition-table lookup failed. This indicates a generator bug
    /// or an input the grammar does not type.
    #[error("no transition for state {state} at operand {dim}")]
    MissingTransition { state: u32, dim: usize },
    /// A semantic action's parameter count is incompatible with the
    /// node's child count (both counts include the node itself).
    #[error("semantic action expected {expected} actuals, received {actual}")]
    ArityMismatch { expected: usize, actual: usize },
    /// A semantic action failed; the underlying error is unchanged.
    #[error("semantic action failed")]
    Callback(#[source] E),
}

/// Shorthand for the error type a grammar's reductions produce.
pub type GrammarReduceError<G> =
    ReduceError<<G as TreeGrammar>::Nonterminal, <G as TreeGrammar>::Error>;

/// Result of reducing a (sub)tree: the value of the root production's
/// post-order routine, or `None` when it has no routine.
pub type ReduceResult<G> = Result<Option<<G as TreeGrammar>::Value>, GrammarReduceError<G>>;

/// The tree parser: labels input trees against a generated production
/// table and reduces them by running semantic actions.
///
/// The table is only read; any number of reducers may share one
/// concurrently.
pub struct Reducer<'a, G: TreeGrammar> {
    visitor: G::Visitor,
    table: &'a ProductionTable<G>,
}

impl<'a, G: TreeGrammar> Reducer<'a, G> {
    /// Create a reducer over a generated table.
    ///
    /// # Panics
    ///
    /// Panics if `generate_states` has not been called on the table.
    pub fn new(visitor: G::Visitor, table: &'a ProductionTable<G>) -> Self {
        assert!(
            table.is_generated(),
            "generate_states must run before a reducer is built"
        );
        Reducer { visitor, table }
    }

    /// The visitor semantic actions run against.
    pub fn visitor(&self) -> &G::Visitor {
        &self.visitor
    }

    pub fn visitor_mut(&mut self) -> &mut G::Visitor {
        &mut self.visitor
    }

    /// Consume the reducer, returning its visitor.
    pub fn into_visitor(self) -> G::Visitor {
        self.visitor
    }

    /// First pass: assign a state number to every node the operator set
    /// can classify. Nodes with an unknown (node type, arity) pair — and
    /// their ancestors — are left unlabeled.
    pub fn label(&self, node: &mut G::Node) -> Result<(), GrammarReduceError<G>> {
        label_tree(self.table, node)
    }

    /// Second pass: rewrite the labeled tree to `goal`, invoking the
    /// recorded productions' semantic actions bottom-up.
    pub fn reduce(&mut self, node: &G::Node, goal: G::Nonterminal) -> ReduceResult<G> {
        let mut pending = Vec::new();
        reduce_node(self.table, &mut self.visitor, node, goal, &mut pending)
    }
}

/// Post-order labeling walk shared with `ProductionTable::can_produce`.
pub(crate) fn label_tree<G: TreeGrammar>(
    table: &ProductionTable<G>,
    node: &mut G::Node,
) -> Result<(), GrammarReduceError<G>> {
    let child_count = node.arity();
    let op = match table.operator(node.node_type(), child_count) {
        Some(op) => op,
        None => {
            node.set_state_number(0);
            return Ok(());
        }
    };

    if child_count == 0 {
        let number = op
            .leaf_state()
            .map(|sid| table.state_by_id(sid).number)
            .unwrap_or(0);
        node.set_state_number(number);
        return Ok(());
    }

    for i in 0..child_count {
        label_tree(table, node.child_mut(i))?;
    }
    if (0..child_count).any(|i| node.child(i).state_number() == 0) {
        // An unclassifiable subtree leaves its ancestors unlabeled too.
        node.set_state_number(0);
        return Ok(());
    }

    let mut current = match op.root_plane() {
        Some(plane) => plane,
        None => {
            node.set_state_number(0);
            return Ok(());
        }
    };
    for dim in 0..child_count {
        let child_number = node.child(dim).state_number();
        let rep = op.representer_state(child_number, dim).ok_or(
            ReduceError::MissingTransition {
                state: child_number,
                dim,
            },
        )?;
        if dim < child_count - 1 {
            current =
                op.plane(current)
                    .next_dimension(rep)
                    .ok_or(ReduceError::MissingTransition {
                        state: child_number,
                        dim,
                    })?;
        } else {
            let sid = op.plane(current)
                .result_state(rep)
                .ok_or(ReduceError::MissingTransition {
                    state: child_number,
                    dim,
                })?;
            let number = table.state_by_id(sid).number;
            trace!(
                "labeled {:?}/{} -> state {}",
                node.node_type(),
                child_count,
                number
            );
            node.set_state_number(number);
        }
    }
    Ok(())
}

/// Reduce one node toward `goal`.
///
/// `pending` is shared down the recursion to avoid re-allocation; each
/// invocation unwinds exactly the closures it pushed.
fn reduce_node<G: TreeGrammar>(
    table: &ProductionTable<G>,
    visitor: &mut G::Visitor,
    node: &G::Node,
    goal: G::Nonterminal,
    pending: &mut Vec<ProductionId>,
) -> ReduceResult<G> {
    let number = node.state_number();
    let state = table.state(number).ok_or(ReduceError::UnlabeledNode)?;

    let mut current = state
        .production(goal)
        .ok_or(ReduceError::NoProduction { state: number, goal })?;

    // Walk the closure chain down to the pattern matcher, running closure
    // pre-callbacks with the original goal.
    let base = pending.len();
    loop {
        match table.production(current) {
            Production::Closure(closure) => {
                if let Actions::Closure(actions) = table.production_actions(current) {
                    if let Some(pre) = &actions.pre {
                        pre(visitor, node, goal).map_err(ReduceError::Callback)?;
                    }
                }
                pending.push(current);
                current = state.production(closure.source).ok_or(
                    ReduceError::NoProduction {
                        state: number,
                        goal: closure.source,
                    },
                )?;
            }
            Production::Pattern(_) => break,
        }
    }

    let pattern = table.pattern(current);
    let actions = match table.production_actions(current) {
        Actions::Pattern(actions) => actions,
        Actions::Closure(_) => unreachable!("pattern production with closure actions"),
    };

    if let Some(pre) = &actions.pre {
        pre(visitor, node, goal).map_err(ReduceError::Callback)?;
    }

    // Reduce children and run the post-order routine. A production with
    // no routine yields no value and its children are not reduced.
    let mut result = None;
    if let Some(post) = &actions.post {
        let child_count = node.arity();
        let formal_count = post.parameter_count();
        let actual_count = child_count + 1;

        if post.is_var_args() {
            // Formals: the node, the fixed child values, one aggregate.
            let fixed_count = formal_count.saturating_sub(2);
            if child_count < fixed_count {
                return Err(ReduceError::ArityMismatch {
                    expected: formal_count,
                    actual: actual_count,
                });
            }
            let mut actuals = Vec::with_capacity(fixed_count);
            for i in 0..fixed_count {
                actuals.push(reduce_node(
                    table,
                    visitor,
                    node.child(i),
                    pattern.nonterminal(i),
                    pending,
                )?);
            }
            let mut variadic = Vec::with_capacity(child_count - fixed_count);
            for i in fixed_count..child_count {
                variadic.push(reduce_node(
                    table,
                    visitor,
                    node.child(i),
                    pattern.nonterminal(i),
                    pending,
                )?);
            }
            result = Some(
                post.invoke(visitor, node, actuals, variadic)
                    .map_err(ReduceError::Callback)?,
            );
        } else {
            if formal_count != actual_count {
                return Err(ReduceError::ArityMismatch {
                    expected: formal_count,
                    actual: actual_count,
                });
            }
            let mut actuals = Vec::with_capacity(child_count);
            for i in 0..child_count {
                actuals.push(reduce_node(
                    table,
                    visitor,
                    node.child(i),
                    pattern.nonterminal(i),
                    pending,
                )?);
            }
            result = Some(
                post.invoke(visitor, node, actuals, Vec::new())
                    .map_err(ReduceError::Callback)?,
            );
        }
    }

    // Unwind this invocation's closures, innermost first.
    while pending.len() > base {
        let Some(cid) = pending.pop() else { break };
        if let Actions::Closure(actions) = table.production_actions(cid) {
            if let Some(post) = &actions.post {
                result = Some(post(visitor, node, result.take()).map_err(ReduceError::Callback)?);
            }
        }
    }

    Ok(result)
}
