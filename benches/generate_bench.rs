//! Benchmarks for state generation and the label/reduce passes.

use burs::{FixedRoutine, InputTree, ProductionTable, Reducer, TreeGrammar};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::convert::Infallible;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Nt {
    Reg,
    Addr,
    Imm,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Op {
    Const,
    Add,
    Sub,
    Mul,
    Neg,
    Load,
}

#[derive(Clone, Debug)]
struct Node {
    op: Op,
    children: Vec<Node>,
    state: u32,
}

impl InputTree<Op> for Node {
    fn node_type(&self) -> Op {
        self.op
    }

    fn arity(&self) -> usize {
        self.children.len()
    }

    fn child(&self, i: usize) -> &Self {
        &self.children[i]
    }

    fn child_mut(&mut self, i: usize) -> &mut Self {
        &mut self.children[i]
    }

    fn state_number(&self) -> u32 {
        self.state
    }

    fn set_state_number(&mut self, number: u32) {
        self.state = number;
    }
}

struct Isel;

impl TreeGrammar for Isel {
    type Nonterminal = Nt;
    type NodeType = Op;
    type Node = Node;
    type Visitor = ();
    type Value = i64;
    type Error = Infallible;
}

fn leaf_routine(value: i64) -> Box<dyn burs::HostRoutine<Isel>> {
    FixedRoutine::new(0, move |_, _, _| Ok(value))
}

fn binary_routine() -> Box<dyn burs::HostRoutine<Isel>> {
    FixedRoutine::new(2, |_, _, vals| Ok(1 + vals.into_iter().flatten().sum::<i64>()))
}

fn unary_routine() -> Box<dyn burs::HostRoutine<Isel>> {
    FixedRoutine::new(1, |_, _, vals| Ok(1 + vals.into_iter().flatten().sum::<i64>()))
}

fn build_table() -> ProductionTable<Isel> {
    let mut table = ProductionTable::new();
    table.add_pattern_match(Nt::Imm, Op::Const, Some(leaf_routine(0)), vec![]);
    table.add_pattern_match_with_cost(Nt::Reg, Op::Const, 2, Some(leaf_routine(1)), vec![]);
    for op in [Op::Add, Op::Sub, Op::Mul] {
        table.add_pattern_match(Nt::Reg, op, Some(binary_routine()), vec![Nt::Reg, Nt::Reg]);
    }
    // Immediate-operand forms are cheaper where they apply.
    table.add_pattern_match_with_cost(
        Nt::Reg,
        Op::Add,
        0,
        Some(binary_routine()),
        vec![Nt::Reg, Nt::Imm],
    );
    table.add_pattern_match(Nt::Reg, Op::Neg, Some(unary_routine()), vec![Nt::Reg]);
    table.add_pattern_match(Nt::Reg, Op::Load, Some(unary_routine()), vec![Nt::Addr]);
    table.add_closure(Nt::Addr, Nt::Reg, None).unwrap();
    table.add_closure_with_cost(Nt::Reg, Nt::Imm, 1, Some(Box::new(|_, _, r| Ok(r.unwrap_or(0)))))
        .unwrap();
    table.generate_states();
    table
}

fn build_tree(depth: usize) -> Node {
    if depth == 0 {
        Node {
            op: Op::Const,
            children: Vec::new(),
            state: 0,
        }
    } else {
        Node {
            op: if depth % 2 == 0 { Op::Add } else { Op::Mul },
            children: vec![build_tree(depth - 1), build_tree(depth - 1)],
            state: 0,
        }
    }
}

fn bench_generate(c: &mut Criterion) {
    c.bench_function("generate_states", |b| {
        b.iter(|| {
            let table = build_table();
            black_box(table.state_count())
        })
    });
}

fn bench_label(c: &mut Criterion) {
    let table = build_table();
    let reducer = Reducer::new((), &table);
    let tree = build_tree(10);

    c.bench_function("label_depth_10", |b| {
        b.iter(|| {
            let mut tree = tree.clone();
            reducer.label(black_box(&mut tree)).unwrap();
            black_box(tree.state)
        })
    });
}

fn bench_reduce(c: &mut Criterion) {
    let table = build_table();
    let mut reducer = Reducer::new((), &table);
    let mut tree = build_tree(10);
    reducer.label(&mut tree).unwrap();

    c.bench_function("reduce_depth_10", |b| {
        b.iter(|| reducer.reduce(black_box(&tree), Nt::Reg).unwrap())
    });
}

criterion_group!(benches, bench_generate, bench_label, bench_reduce);
criterion_main!(benches);
