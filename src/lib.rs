//! burs: a bottom-up rewrite system (BURS) tree-parser generator.
//!
//! This crate provides:
//! - A grammar of tree productions: pattern matchers with costs and
//!   semantic actions, and nonterminal-to-nonterminal closures
//! - A state-generation fixed point that compiles the grammar into a
//!   finite transition automaton over equivalence-class states
//! - Representer-state projection, which keeps the per-operator
//!   transition tables finite
//! - A two-pass reducer: `label` assigns each input-tree node a state
//!   number, `reduce` rewrites the tree to a goal nonterminal at minimum
//!   cost, invoking the productions' semantic callbacks in order
//! - An XML dump of the generated tables for debugging and external
//!   renderers
//!
//! # Example
//!
//! ```rust
//! use burs::{FixedRoutine, InputTree, ProductionTable, Reducer, TreeGrammar};
//!
//! #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
//! enum Nt { Reg }
//!
//! #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
//! enum Op { Const, Plus }
//!
//! struct Node { op: Op, children: Vec<Node>, state: u32 }
//!
//! impl InputTree<Op> for Node {
//!     fn node_type(&self) -> Op { self.op }
//!     fn arity(&self) -> usize { self.children.len() }
//!     fn child(&self, i: usize) -> &Self { &self.children[i] }
//!     fn child_mut(&mut self, i: usize) -> &mut Self { &mut self.children[i] }
//!     fn state_number(&self) -> u32 { self.state }
//!     fn set_state_number(&mut self, n: u32) { self.state = n; }
//! }
//!
//! struct Arith;
//!
//! impl TreeGrammar for Arith {
//!     type Nonterminal = Nt;
//!     type NodeType = Op;
//!     type Node = Node;
//!     type Visitor = ();
//!     type Value = i64;
//!     type Error = std::convert::Infallible;
//! }
//!
//! let mut table: ProductionTable<Arith> = ProductionTable::new();
//! table.add_pattern_match(
//!     Nt::Reg,
//!     Op::Const,
//!     Some(FixedRoutine::new(0, |_, _, _| Ok(1))),
//!     vec![],
//! );
//! table.add_pattern_match(
//!     Nt::Reg,
//!     Op::Plus,
//!     Some(FixedRoutine::new(2, |_, _, vals| {
//!         Ok(vals.into_iter().flatten().sum())
//!     })),
//!     vec![Nt::Reg, Nt::Reg],
//! );
//! table.generate_states();
//!
//! let mut tree = Node {
//!     op: Op::Plus,
//!     children: vec![
//!         Node { op: Op::Const, children: vec![], state: 0 },
//!         Node { op: Op::Const, children: vec![], state: 0 },
//!     ],
//!     state: 0,
//! };
//!
//! let mut reducer = Reducer::new((), &table);
//! reducer.label(&mut tree).unwrap();
//! assert_eq!(reducer.reduce(&tree, Nt::Reg).unwrap(), Some(2));
//! ```

pub mod cost;
pub mod dump;
pub mod hyperplane;
pub mod operator;
pub mod production;
pub mod reducer;
pub mod repstate;
pub mod semantics;
pub mod state;
pub mod table;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports for convenience
pub use cost::{Cost, INFINITE_COST};
pub use production::{Closure, PatternMatcher, Production, ProductionId};
pub use reducer::{GrammarReduceError, ReduceError, ReduceResult, Reducer};
pub use repstate::RepresenterState;
pub use semantics::{
    Actions, ClosureActions, ClosurePostCallback, FixedRoutine, HostRoutine, InputTree,
    PatternActions, PreCallback, Predicate, Symbol, TreeGrammar, VariadicRoutine,
};
pub use state::State;
pub use table::{GenerationStats, GrammarError, ProductionTable};
