//! Human-readable XML snapshot of a generated table.
//!
//! The snapshot is hierarchical: operators (with their hyperplane trees),
//! then states with their patterns and closures. Self-looping variadic
//! transitions render as a `<variadic/>` marker. The exact bytes are not
//! contractual — the dump exists for debugging grammars and for external
//! renderers to consume.

use crate::hyperplane::PlaneId;
use crate::operator::Operator;
use crate::semantics::TreeGrammar;
use crate::table::ProductionTable;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

impl<G: TreeGrammar> ProductionTable<G> {
    /// Write an XML snapshot of the generated tables.
    pub fn dump(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "<burmTable states=\"{}\">", self.state_count())?;

        writeln!(out, "<operators>")?;
        for op in self.operators() {
            writeln!(
                out,
                "<operator nodeType=\"{:?}\" arity=\"{}\" variadic=\"{}\">",
                op.node_type(),
                op.arity(),
                op.is_var_args()
            )?;
            if let Some(sid) = op.leaf_state() {
                writeln!(out, "<leaf state=\"{}\"/>", self.state_by_id(sid).number)?;
            }
            if let Some(root) = op.root_plane() {
                self.dump_plane(out, op, root)?;
            }
            writeln!(out, "</operator>")?;
        }
        writeln!(out, "</operators>")?;

        writeln!(out, "<states>")?;
        for state in self.states() {
            let node_type = state
                .node_type()
                .map(|t| format!("{:?}", t))
                .unwrap_or_else(|| "null".to_string());
            writeln!(
                out,
                "<state number=\"{}\" nodeType=\"{}\">",
                state.number, node_type
            )?;
            if state.pattern_count() > 0 {
                writeln!(out, "<patterns>")?;
                for (nt, pid, cost) in state.patterns() {
                    writeln!(
                        out,
                        "<pattern nt=\"{:?}\" cost=\"{}\" pattern=\"{}\"/>",
                        nt,
                        cost,
                        self.production(pid)
                    )?;
                }
                writeln!(out, "</patterns>")?;
            }
            let closures: Vec<_> = state.closures().collect();
            if !closures.is_empty() {
                writeln!(out, "<closures>")?;
                for (nt, cid) in closures {
                    writeln!(
                        out,
                        "<closure nt=\"{:?}\" closure=\"{}\"/>",
                        nt,
                        self.production(cid)
                    )?;
                }
                writeln!(out, "</closures>")?;
            }
            writeln!(out, "</state>")?;
        }
        writeln!(out, "</states>")?;

        writeln!(out, "</burmTable>")
    }

    /// Write the snapshot to a file.
    pub fn dump_to_path(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        self.dump(&mut out)?;
        out.flush()
    }

    /// One dimension of an operator's transition map, entries ordered by
    /// representer id for reproducible output.
    fn dump_plane(
        &self,
        out: &mut dyn Write,
        op: &Operator<G::Nonterminal, G::NodeType>,
        plane_id: PlaneId,
    ) -> io::Result<()> {
        let plane = op.plane(plane_id);

        let mut next: Vec<_> = plane.next_entries().collect();
        next.sort_by_key(|(rep, _)| *rep);
        for (rep, child) in next {
            for &sid in op.rep_state(rep).represented() {
                writeln!(out, "<plane state=\"{}\">", self.state_by_id(sid).number)?;
                if child == plane_id {
                    writeln!(out, "<variadic/>")?;
                } else {
                    self.dump_plane(out, op, child)?;
                }
                writeln!(out, "</plane>")?;
            }
        }

        let mut finals: Vec<_> = plane.final_entries().collect();
        finals.sort_by_key(|(rep, _)| *rep);
        for (rep, result) in finals {
            for &sid in op.rep_state(rep).represented() {
                writeln!(
                    out,
                    "<leaf state=\"{}\" result=\"{}\"/>",
                    self.state_by_id(sid).number,
                    self.state_by_id(result).number
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::table::ProductionTable;
    use crate::test_support::{Calc, Nt, Op};

    fn snapshot(table: &ProductionTable<Calc>) -> String {
        let mut out = Vec::new();
        table.dump(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_dump_lists_operators_and_states() {
        let mut table: ProductionTable<Calc> = ProductionTable::new();
        table.add_pattern_match(Nt::Reg, Op::Const, None, vec![]);
        table.add_pattern_match(Nt::Reg, Op::Plus, None, vec![Nt::Reg, Nt::Reg]);
        table.add_closure(Nt::Addr, Nt::Reg, None).unwrap();
        table.generate_states();

        let xml = snapshot(&table);
        assert!(xml.contains("<burmTable states=\"3\">"));
        assert!(xml.contains("<operator nodeType=\"Const\" arity=\"0\" variadic=\"false\">"));
        assert!(xml.contains("<operator nodeType=\"Plus\" arity=\"2\" variadic=\"false\">"));
        assert!(xml.contains("<state number=\"1\" nodeType=\"Const\">"));
        assert!(xml.contains("<closure nt=\"Addr\""));
        assert!(!xml.contains("<variadic/>"));
    }

    #[test]
    fn test_dump_marks_variadic_self_loops() {
        let mut table: ProductionTable<Calc> = ProductionTable::new();
        table.add_pattern_match(Nt::Item, Op::Item, None, vec![]);
        table.add_var_args_pattern_match(Nt::List, Op::List, None, vec![Nt::Item]);
        table.generate_states();

        let xml = snapshot(&table);
        assert!(xml.contains("variadic=\"true\""));
        assert!(xml.contains("<variadic/>"));
    }
}
