//! Host-side interfaces: grammar symbols, the input-tree contract, and
//! semantic-action routines.
//!
//! The automaton itself is generic over two symbol types (nonterminals and
//! node types) and otherwise knows nothing about the host program. Everything
//! host-specific — the concrete tree node, the visitor object semantic
//! actions run against, the value they produce — is bundled behind the
//! [`TreeGrammar`] trait so a single type parameter threads through the
//! [`ProductionTable`](crate::ProductionTable) and
//! [`Reducer`](crate::Reducer).

use std::fmt::Debug;
use std::hash::Hash;

/// Bound alias for grammar symbols (nonterminals and node types).
///
/// Symbols are expected to be small `Copy` enums; they are hashed, ordered
/// and copied freely during state generation.
pub trait Symbol: Copy + Eq + Hash + Ord + Debug + Send + Sync + 'static {}

impl<S: Copy + Eq + Hash + Ord + Debug + Send + Sync + 'static> Symbol for S {}

/// The associated-type bundle tying a production table to its host program.
pub trait TreeGrammar: Sized + 'static {
    /// Grammar goal symbols (e.g. `Reg`, `Addr`).
    type Nonterminal: Symbol;
    /// Tree-node operator identifiers (e.g. `Plus`, `Select`).
    type NodeType: Symbol;
    /// The concrete input-tree node.
    type Node: InputTree<Self::NodeType>;
    /// The object semantic actions run against.
    type Visitor;
    /// The value a reduction produces.
    type Value;
    /// The error type semantic actions may raise; it propagates unchanged
    /// out of `reduce`.
    type Error: std::error::Error + Send + Sync + 'static;
}

/// The input-tree contract.
///
/// The reducer only ever annotates nodes with state numbers and reads them
/// back; tree ownership stays with the caller. State number `0` is the
/// "unlabeled" sentinel — canonical states are numbered from 1 — so nodes
/// should start out with a state number of `0`.
pub trait InputTree<T>: Sized {
    /// The operator at this node.
    fn node_type(&self) -> T;
    /// Number of children.
    fn arity(&self) -> usize;
    /// The `i`-th child.
    fn child(&self, i: usize) -> &Self;
    /// Mutable access to the `i`-th child (used by the label pass).
    fn child_mut(&mut self, i: usize) -> &mut Self;
    /// The state number assigned by the label pass, or `0`.
    fn state_number(&self) -> u32;
    /// Record a state number on this node.
    fn set_state_number(&mut self, number: u32);
}

/// A semantic-action routine attached to a pattern-matching production.
///
/// `parameter_count` counts the node itself and, for variadic routines, the
/// trailing aggregate; it never counts the visitor. The reducer checks the
/// count against the actual child count before invoking and bundles the
/// trailing actuals of a variadic call into the `variadic` vector. A child
/// whose production carries no post-order routine contributes `None`.
pub trait HostRoutine<G: TreeGrammar>: Send + Sync {
    /// Number of formal parameters (node + fixed values [+ aggregate]).
    fn parameter_count(&self) -> usize;
    /// Whether trailing actuals are bundled into one aggregate.
    fn is_var_args(&self) -> bool;
    /// Run the routine. `actuals` holds the fixed child results in order;
    /// `variadic` holds the bundled trailing results (empty unless
    /// `is_var_args`).
    fn invoke(
        &self,
        visitor: &mut G::Visitor,
        node: &G::Node,
        actuals: Vec<Option<G::Value>>,
        variadic: Vec<Option<G::Value>>,
    ) -> Result<G::Value, G::Error>;
}

/// A fixed-arity routine wrapping a plain closure.
pub struct FixedRoutine<G: TreeGrammar> {
    parameter_count: usize,
    #[allow(clippy::type_complexity)]
    action: Box<
        dyn Fn(&mut G::Visitor, &G::Node, Vec<Option<G::Value>>) -> Result<G::Value, G::Error>
            + Send
            + Sync,
    >,
}

impl<G: TreeGrammar> FixedRoutine<G> {
    /// Wrap a closure expecting exactly `child_count` reduced child values.
    pub fn new<F>(child_count: usize, action: F) -> Box<dyn HostRoutine<G>>
    where
        F: Fn(&mut G::Visitor, &G::Node, Vec<Option<G::Value>>) -> Result<G::Value, G::Error>
            + Send
            + Sync
            + 'static,
    {
        Box::new(FixedRoutine {
            parameter_count: child_count + 1,
            action: Box::new(action),
        })
    }
}

impl<G: TreeGrammar> HostRoutine<G> for FixedRoutine<G> {
    fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    fn is_var_args(&self) -> bool {
        false
    }

    fn invoke(
        &self,
        visitor: &mut G::Visitor,
        node: &G::Node,
        actuals: Vec<Option<G::Value>>,
        _variadic: Vec<Option<G::Value>>,
    ) -> Result<G::Value, G::Error> {
        (self.action)(visitor, node, actuals)
    }
}

/// A variadic routine wrapping a plain closure.
///
/// The closure receives the fixed prefix of child results and the bundled
/// trailing results separately.
pub struct VariadicRoutine<G: TreeGrammar> {
    parameter_count: usize,
    #[allow(clippy::type_complexity)]
    action: Box<
        dyn Fn(
                &mut G::Visitor,
                &G::Node,
                Vec<Option<G::Value>>,
                Vec<Option<G::Value>>,
            ) -> Result<G::Value, G::Error>
            + Send
            + Sync,
    >,
}

impl<G: TreeGrammar> VariadicRoutine<G> {
    /// Wrap a closure taking `fixed_count` leading child values plus the
    /// variadic bundle.
    pub fn new<F>(fixed_count: usize, action: F) -> Box<dyn HostRoutine<G>>
    where
        F: Fn(
                &mut G::Visitor,
                &G::Node,
                Vec<Option<G::Value>>,
                Vec<Option<G::Value>>,
            ) -> Result<G::Value, G::Error>
            + Send
            + Sync
            + 'static,
    {
        Box::new(VariadicRoutine {
            // node + fixed children + one trailing aggregate
            parameter_count: fixed_count + 2,
            action: Box::new(action),
        })
    }
}

impl<G: TreeGrammar> HostRoutine<G> for VariadicRoutine<G> {
    fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    fn is_var_args(&self) -> bool {
        true
    }

    fn invoke(
        &self,
        visitor: &mut G::Visitor,
        node: &G::Node,
        actuals: Vec<Option<G::Value>>,
        variadic: Vec<Option<G::Value>>,
    ) -> Result<G::Value, G::Error> {
        (self.action)(visitor, node, actuals, variadic)
    }
}

/// Guard predicate on a pattern-matching production.
pub type Predicate<G> = Box<
    dyn Fn(&mut <G as TreeGrammar>::Visitor, &<G as TreeGrammar>::Node) -> bool + Send + Sync,
>;

/// Pre-order callback; receives the goal the reducer is deriving.
#[allow(clippy::type_complexity)]
pub type PreCallback<G> = Box<
    dyn Fn(
            &mut <G as TreeGrammar>::Visitor,
            &<G as TreeGrammar>::Node,
            <G as TreeGrammar>::Nonterminal,
        ) -> Result<(), <G as TreeGrammar>::Error>
        + Send
        + Sync,
>;

/// Post-order callback on a closure; receives the antecedent's result
/// (`None` when the antecedent produced no value).
#[allow(clippy::type_complexity)]
pub type ClosurePostCallback<G> = Box<
    dyn Fn(
            &mut <G as TreeGrammar>::Visitor,
            &<G as TreeGrammar>::Node,
            Option<<G as TreeGrammar>::Value>,
        ) -> Result<<G as TreeGrammar>::Value, <G as TreeGrammar>::Error>
        + Send
        + Sync,
>;

/// The semantic half of a pattern-matching production.
pub struct PatternActions<G: TreeGrammar> {
    /// Guard consulted by `can_produce`.
    pub predicate: Option<Predicate<G>>,
    /// Invoked before child reduction.
    pub pre: Option<PreCallback<G>>,
    /// Invoked with the reduced child values; absent means the production
    /// yields no value and its children are not reduced.
    pub post: Option<Box<dyn HostRoutine<G>>>,
}

impl<G: TreeGrammar> PatternActions<G> {
    /// Actions with only a post-order routine.
    pub fn post(post: Box<dyn HostRoutine<G>>) -> Self {
        PatternActions {
            predicate: None,
            pre: None,
            post: Some(post),
        }
    }
}

impl<G: TreeGrammar> Default for PatternActions<G> {
    fn default() -> Self {
        PatternActions {
            predicate: None,
            pre: None,
            post: None,
        }
    }
}

/// The semantic half of a closure production.
pub struct ClosureActions<G: TreeGrammar> {
    /// Invoked on the way down the closure chain, with the original goal.
    pub pre: Option<PreCallback<G>>,
    /// Invoked on the way back up, replacing the running result.
    pub post: Option<ClosurePostCallback<G>>,
}

impl<G: TreeGrammar> ClosureActions<G> {
    /// Actions with only a post-order callback.
    pub fn post(post: ClosurePostCallback<G>) -> Self {
        ClosureActions {
            pre: None,
            post: Some(post),
        }
    }
}

impl<G: TreeGrammar> Default for ClosureActions<G> {
    fn default() -> Self {
        ClosureActions {
            pre: None,
            post: None,
        }
    }
}

/// Per-production semantic actions, parallel to the production arena.
pub enum Actions<G: TreeGrammar> {
    /// Actions of a pattern matcher.
    Pattern(PatternActions<G>),
    /// Actions of a closure.
    Closure(ClosureActions<G>),
}
