//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::ir::{Block, CallStatement, Exp, LocationSet, Statement, Stmt, UserProc};
use crate::ssa::DataFlow;
use smallvec::SmallVec;
use std::collections::BTreeSet;

impl DataFlow {
    /// Whether the current phase is allowed to rename `e`.
    ///
    /// Registers, temporaries and flags are always renameable. Memory cells
    /// are renameable only once escape analysis has run
    /// ([`Self::set_rename_locals_and_params`]), only when they match the
    /// procedure's local/parameter pattern, and only when their address has
    /// not escaped: an escaped local can be written through pointers the
    /// analysis cannot see.
    pub fn can_rename(&self, e: &Exp, proc: &UserProc) -> bool {
        let e = e.base(); // look inside refs

        if e.is_reg_of() || e.is_temp() || e.is_flags() || e.is_main_flag() {
            return true;
        }

        // hard locals only show up in the post-SSA pass, where they are
        // always safe
        if e.is_local() {
            return true;
        }

        if !e.is_mem_of() {
            return false; // %pc and other junk
        }

        if !proc.is_local_or_param_pattern(e) {
            return false;
        }

        self.rename_locals_and_params && !proc.is_address_escaped_var(e)
    }

    /// Places trivial φ-assignments at the iterated dominance frontier of
    /// every renameable location's definition sites.
    ///
    /// Blocks containing childless calls count as definition sites of
    /// *every* location. Returns whether any φ was inserted, so the caller
    /// can iterate when the IR mutates the CFG; with no IR changes a second
    /// run returns `false`.
    pub fn place_phi_functions(&mut self, proc: &mut UserProc) -> bool {
        // the dominator working vectors are dead weight from here on; only
        // idom and the frontiers are still needed
        self.dfnum = Vec::new();
        self.semi = Vec::new();
        self.ancestor = Vec::new();
        self.samedom = Vec::new();
        self.vertex = Vec::new();
        self.parent = Vec::new();
        self.best = Vec::new();
        self.bucket = Vec::new();

        self.defsites.clear();
        self.defallsites.clear();
        self.a_orig.clear();
        self.def_stmts.clear();

        let num_bb = self.bbs.len();

        assert_eq!(
            num_bb,
            proc.cfg().num_blocks(),
            "CFG gained or lost blocks since `dominators` ran"
        );

        self.a_orig.resize(num_bb, BTreeSet::new());

        // recreate A_orig on every run: propagation and other rewrites make
        // old entries stale
        for n in 0..num_bb {
            let bb = self.bbs[n];

            for &s in proc.cfg().stmts_of(bb) {
                let stmt = proc.cfg().stmt(s);
                let mut defs = LocationSet::new();

                stmt.definitions(&mut defs);

                if stmt.as_call().is_some_and(CallStatement::is_childless) {
                    // this block defines every location
                    self.defallsites.insert(n);
                }

                for d in defs {
                    if self.can_rename(&d, proc) {
                        self.a_orig[n].insert(d.clone());
                        self.def_stmts.insert(d, s);
                    }
                }
            }
        }

        for n in 0..num_bb {
            for a in &self.a_orig[n] {
                self.defsites.entry(a.clone()).or_default().insert(n);
            }
        }

        let mut change = false;
        let locations: Vec<Exp> = self.defsites.keys().cloned().collect();

        for a in locations {
            let sites = self.defsites.get_mut(&a).unwrap();

            // childless calls define this location too
            sites.extend(self.defallsites.iter().copied());

            let mut work = sites.clone();

            while let Some(n) = work.pop_first() {
                let frontier: SmallVec<[usize; 8]> = self.df[n].iter().copied().collect();

                for y in frontier {
                    let placed = self.a_phi.entry(a.clone()).or_default();

                    if placed.contains(&y) {
                        continue;
                    }

                    trace!("placing φ for {a} at block {y}");

                    placed.insert(y);
                    proc.cfg_mut()
                        .prepend_stmt(self.bbs[y], Statement::phi(a.clone()));
                    change = true;

                    if !self.a_orig[y].contains(&a) {
                        work.insert(y);
                    }
                }
            }
        }

        change
    }

    /// Renames every use and definition in block index `n` and recurses over
    /// the dominator-tree children, maintaining the per-location definition
    /// stacks. Invoke as `rename_block_vars(proc, 0, true)` to rename the
    /// whole procedure.
    ///
    /// Returns whether any use was rewritten. On a procedure already in SSA
    /// form this returns `false`: subscripted uses are never re-renamed,
    /// only their collectors are refreshed.
    pub fn rename_block_vars(&mut self, proc: &mut UserProc, n: usize, clear_stacks: bool) -> bool {
        if clear_stacks {
            // stale keys from a previous level's renaming would compare
            // nonsensically once the IR rewrites those expressions
            self.stacks.clear();
        }

        let mut changed = false;
        let bb = self.bbs[n];
        let stmt_ids: Vec<Stmt> = proc.cfg().stmts_of(bb).to_vec();

        trace!("renaming block {n}, {} statements", stmt_ids.len());

        for &s in &stmt_ids {
            // ---- uses ----
            let mut locs = LocationSet::new();

            // for a φ, only the left side's address computation contributes
            // uses; the operands were renamed when their edges were walked
            let phi_lhs: Option<Exp> = {
                let stmt = proc.cfg().stmt(s);

                stmt.as_phi().map(|phi| phi.lhs().clone())
            };

            if let Some(lhs) = &phi_lhs {
                if let Exp::Mem(addr) = lhs {
                    addr.used_locs(&mut locs);
                }

                // a φ operand may be defined by a childless call, whose use
                // collector then needs to know about the φ's location
                let call_defs: SmallVec<[Stmt; 4]> = proc
                    .cfg()
                    .stmt(s)
                    .as_phi()
                    .unwrap()
                    .operands()
                    .iter()
                    .filter_map(|op| op.def)
                    .collect();

                for d in call_defs {
                    if proc.cfg().stmt(d).is_call() {
                        proc.cfg_mut()
                            .stmt_mut(d)
                            .as_call_mut()
                            .unwrap()
                            .use_before_define(lhs.clone());
                    }
                }
            } else {
                proc.cfg().stmt(s).used_locs(&mut locs);
            }

            for x in &locs {
                if !self.can_rename(x, proc) {
                    continue;
                }

                // already subscripted: no renaming required, but redo the
                // usage analysis in case call/return liveness changed
                if let Exp::Ref { base, def } = x {
                    match def {
                        Some(d) if proc.cfg().stmt(*d).is_call() => {
                            proc.cfg_mut()
                                .stmt_mut(*d)
                                .as_call_mut()
                                .unwrap()
                                .use_before_define(base.as_ref().clone());
                        }
                        None => proc.use_before_define(base.as_ref().clone()),
                        Some(_) => {}
                    }

                    continue;
                }

                let def = match self.stack_top(x) {
                    Some(d) => Some(d),
                    None => match self.stack_top(&Exp::DefineAll) {
                        Some(d) => Some(d),
                        None => {
                            // no reaching definition at all: the use becomes
                            // an implicit parameter once type analysis turns
                            // placeholders into implicit assignments
                            proc.use_before_define(x.clone());

                            None
                        }
                    },
                };

                if let Some(d) = def {
                    if proc.cfg().stmt(d).is_call() {
                        // calls collect locations used before they are
                        // defined at the call
                        proc.cfg_mut()
                            .stmt_mut(d)
                            .as_call_mut()
                            .unwrap()
                            .use_before_define(x.clone());
                    }
                }

                changed = true;

                // replace the use of x with x{def}
                if phi_lhs.is_some() {
                    proc.cfg_mut()
                        .stmt_mut(s)
                        .as_phi_mut()
                        .unwrap()
                        .subscript_lhs_address(x, def);
                } else {
                    proc.cfg_mut().stmt_mut(s).subscript_var(x, def);
                }
            }

            // ---- reaching-definition snapshots ----
            // calls and returns snapshot the stacks before their own
            // definitions are pushed
            if proc.cfg().stmt(s).is_call() {
                proc.cfg_mut()
                    .stmt_mut(s)
                    .as_call_mut()
                    .unwrap()
                    .def_collector_mut()
                    .update_defs(&self.stacks);
            } else if proc.cfg().stmt(s).is_return() {
                proc.cfg_mut()
                    .stmt_mut(s)
                    .as_ret_mut()
                    .unwrap()
                    .collector_mut()
                    .update_defs(&self.stacks);
            }

            // ---- definitions ----
            let mut defs = LocationSet::new();

            proc.cfg().stmt(s).definitions(&mut defs);

            for a in &defs {
                if !self.can_rename(a, proc) {
                    continue;
                }

                self.stacks.entry(a.clone()).or_default().push(s);

                // a named local is also a definition of the location its
                // symbol maps to
                if let Exp::Local(name) = a {
                    let mapped = match proc.exp_from_symbol(name) {
                        Some(e) => e.clone(),
                        None => panic!("local `{name}` has no mapped location"),
                    };

                    self.stacks.entry(mapped).or_default().push(s);
                }
            }

            // a childless call (without ABI assumptions) defines everything
            // currently being tracked; the <all> entry must exist so later
            // blocks can fall back to it
            if is_childless_call(proc, s) && !proc.settings().assume_abi {
                self.stacks.entry(Exp::DefineAll).or_default();

                for stack in self.stacks.values_mut() {
                    stack.push(s);
                }
            }
        }

        // ---- successor φ operands ----
        let succs: SmallVec<[Block; 2]> = proc.cfg().out_edges(bb).iter().copied().collect();

        for succ in succs {
            let succ_stmts: Vec<Stmt> = proc.cfg().stmts_of(succ).to_vec();

            // keep scanning past non-φs: an optimisation can turn a φ into
            // an ordinary assignment mid-list
            for t in succ_stmts {
                let lhs = match proc.cfg().stmt(t).as_phi() {
                    Some(phi) => phi.lhs().clone(),
                    None => continue,
                };

                if !self.can_rename(&lhs, proc) {
                    continue;
                }

                let def = self.stack_top(&lhs);

                proc.cfg_mut()
                    .stmt_mut(t)
                    .as_phi_mut()
                    .unwrap()
                    .put_at(bb, def, lhs);
            }
        }

        // ---- dominator-tree children (linear scan of idom) ----
        for c in 0..self.bbs.len() {
            if self.idom[c] == n as i32 {
                changed |= self.rename_block_vars(proc, c, false);
            }
        }

        // ---- backward pass ----
        // statements are unwound in reverse so that the pushes a childless
        // call made onto every stack come off in the right order
        for &s in stmt_ids.iter().rev() {
            let mut defs = LocationSet::new();

            proc.cfg().stmt(s).definitions(&mut defs);

            for a in &defs {
                if !self.can_rename(a, proc) {
                    continue;
                }

                self.pop_definition(a, s);

                if let Exp::Local(name) = a {
                    let mapped = proc
                        .exp_from_symbol(name)
                        .expect("symbol existed on the forward pass")
                        .clone();

                    self.pop_definition(&mapped, s);
                }
            }

            if is_childless_call(proc, s) {
                for stack in self.stacks.values_mut() {
                    if stack.last() == Some(&s) {
                        stack.pop();
                    }
                }
            }
        }

        changed
    }

    fn stack_top(&self, x: &Exp) -> Option<Stmt> {
        self.stacks.get(x).and_then(|stack| stack.last().copied())
    }

    fn pop_definition(&mut self, a: &Exp, s: Stmt) {
        match self.stacks.get_mut(a) {
            Some(stack) if !stack.is_empty() => {
                let popped = stack.pop();

                debug_assert_eq!(popped, Some(s), "stack for {a} lost its balance");
            }
            _ => panic!("tried to pop {a} from Stacks; does not exist"),
        }
    }
}

fn is_childless_call(proc: &UserProc, s: Stmt) -> bool {
    proc.cfg()
        .stmt(s)
        .as_call()
        .is_some_and(CallStatement::is_childless)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, ReturnStatement};

    fn graph(blocks: usize, edges: &[(usize, usize)]) -> (UserProc, Vec<Block>) {
        let mut proc = UserProc::new("test", 28);
        let bbs: Vec<Block> = (0..blocks).map(|_| proc.cfg_mut().new_block()).collect();

        for &(from, to) in edges {
            proc.cfg_mut().add_edge(bbs[from], bbs[to]);
        }

        (proc, bbs)
    }

    fn run_ssa(df: &mut DataFlow, proc: &mut UserProc) -> bool {
        df.dominators(proc.cfg());
        df.place_phi_functions(proc);

        df.rename_block_vars(proc, 0, true)
    }

    fn assert_stacks_empty(df: &DataFlow) {
        for (loc, stack) in df.stacks() {
            assert!(stack.is_empty(), "stack for {loc} is not empty");
        }
    }

    fn rhs_of(proc: &UserProc, s: Stmt) -> Exp {
        match proc.cfg().stmt(s).kind() {
            crate::ir::StatementKind::Assign(a) => a.rhs.clone(),
            _ => unreachable!("expected an assignment"),
        }
    }

    fn the_phi_for<'p>(proc: &'p UserProc, bb: Block, lhs: &Exp) -> (&'p crate::ir::PhiAssign, Stmt) {
        for &s in proc.cfg().stmts_of(bb) {
            if let Some(phi) = proc.cfg().stmt(s).as_phi() {
                if phi.lhs().base() == lhs.base() {
                    return (phi, s);
                }
            }
        }

        panic!("no φ for {lhs} in {bb:?}");
    }

    fn operand_def(phi: &crate::ir::PhiAssign, pred: Block) -> Option<Stmt> {
        phi.operands()
            .iter()
            .find(|op| op.pred == pred)
            .expect("operand for predecessor")
            .def
    }

    #[test]
    fn straight_line_use_gets_the_def() {
        // 0 -> 1 -> 2, r8 defined in 0, used in 2
        let (mut proc, bbs) = graph(3, &[(0, 1), (1, 2)]);
        let s0 = proc
            .cfg_mut()
            .append_stmt(bbs[0], Statement::assign(Exp::Reg(8), Exp::Const(42)));
        let s2 = proc.cfg_mut().append_stmt(
            bbs[2],
            Statement::assign(Exp::Reg(9), Exp::op(BinOp::Add, Exp::Reg(8), Exp::Const(1))),
        );

        let mut df = DataFlow::new();

        df.dominators(proc.cfg());

        assert!(!df.place_phi_functions(&mut proc)); // no joins, no φs
        assert!(df.rename_block_vars(&mut proc, 0, true));

        assert_eq!(
            rhs_of(&proc, s2),
            Exp::op(
                BinOp::Add,
                Exp::subscripted(Exp::Reg(8), Some(s0)),
                Exp::Const(1)
            )
        );
        assert_stacks_empty(&df);
    }

    #[test]
    fn diamond_gets_a_phi_at_the_join() {
        //     0
        //    / \
        //   1   2    r8 defined in both
        //    \ /
        //     3      r8 used here
        let (mut proc, bbs) = graph(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]);
        let s1 = proc
            .cfg_mut()
            .append_stmt(bbs[1], Statement::assign(Exp::Reg(8), Exp::Const(1)));
        let s2 = proc
            .cfg_mut()
            .append_stmt(bbs[2], Statement::assign(Exp::Reg(8), Exp::Const(2)));
        let s3 = proc
            .cfg_mut()
            .append_stmt(bbs[3], Statement::assign(Exp::Reg(9), Exp::Reg(8)));

        let mut df = DataFlow::new();

        df.dominators(proc.cfg());

        assert!(df.place_phi_functions(&mut proc));
        assert_eq!(
            df.a_phi().get(&Exp::Reg(8)).unwrap(),
            &BTreeSet::from([3usize])
        );

        df.rename_block_vars(&mut proc, 0, true);

        let (phi, phi_stmt) = the_phi_for(&proc, bbs[3], &Exp::Reg(8));

        assert_eq!(phi.operands().len(), 2);
        assert_eq!(operand_def(phi, bbs[1]), Some(s1));
        assert_eq!(operand_def(phi, bbs[2]), Some(s2));
        assert_eq!(rhs_of(&proc, s3), Exp::subscripted(Exp::Reg(8), Some(phi_stmt)));
        assert_stacks_empty(&df);
    }

    #[test]
    fn loop_phi_merges_entry_and_back_edge() {
        // 0 -> 1 -> 2 -> 1, r8 defined (and used) in 1
        let (mut proc, bbs) = graph(3, &[(0, 1), (1, 2), (2, 1)]);
        let s1 = proc.cfg_mut().append_stmt(
            bbs[1],
            Statement::assign(Exp::Reg(8), Exp::op(BinOp::Add, Exp::Reg(8), Exp::Const(1))),
        );

        let mut df = DataFlow::new();

        df.dominators(proc.cfg());
        df.place_phi_functions(&mut proc);

        assert_eq!(
            df.a_phi().get(&Exp::Reg(8)).unwrap(),
            &BTreeSet::from([1usize])
        );

        df.rename_block_vars(&mut proc, 0, true);

        let (phi, phi_stmt) = the_phi_for(&proc, bbs[1], &Exp::Reg(8));

        // entry path carries no definition, the back edge carries s1
        assert_eq!(operand_def(phi, bbs[0]), None);
        assert_eq!(operand_def(phi, bbs[2]), Some(s1));
        assert_eq!(
            rhs_of(&proc, s1),
            Exp::op(
                BinOp::Add,
                Exp::subscripted(Exp::Reg(8), Some(phi_stmt)),
                Exp::Const(1)
            )
        );
        assert_stacks_empty(&df);
    }

    #[test]
    fn irreducible_region_reaches_a_fixed_point() {
        // 0 -> 1, 0 -> 2 jumps straight into the loop 1 <-> 2 <-> 3; the
        // worklist must converge with φs at both headers
        let (mut proc, _) = graph(4, &[(0, 1), (0, 2), (1, 2), (2, 3), (3, 2), (3, 1)]);
        let bbs: Vec<Block> = proc.cfg().blocks().collect();
        let _ = proc
            .cfg_mut()
            .append_stmt(bbs[3], Statement::assign(Exp::Reg(8), Exp::Const(1)));

        let mut df = DataFlow::new();

        df.dominators(proc.cfg());

        assert!(df.place_phi_functions(&mut proc));
        assert_eq!(
            df.a_phi().get(&Exp::Reg(8)).unwrap(),
            &BTreeSet::from([1usize, 2usize])
        );

        df.rename_block_vars(&mut proc, 0, true);
        assert_stacks_empty(&df);
    }

    #[test]
    fn childless_call_defines_everything() {
        //     0      r8 := 5
        //    / \
        //   1   2    1 contains a childless call
        //    \ /
        //     3      r10 := r8
        let (mut proc, bbs) = graph(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]);
        let s0 = proc
            .cfg_mut()
            .append_stmt(bbs[0], Statement::assign(Exp::Reg(8), Exp::Const(5)));
        let call = proc
            .cfg_mut()
            .append_stmt(bbs[1], Statement::call(CallStatement::childless("mystery")));
        let _ = proc
            .cfg_mut()
            .append_stmt(bbs[3], Statement::assign(Exp::Reg(10), Exp::Reg(8)));

        let mut df = DataFlow::new();

        df.dominators(proc.cfg());
        df.place_phi_functions(&mut proc);

        assert_eq!(df.defallsites(), &BTreeSet::from([1usize]));
        assert!(df.a_phi().get(&Exp::Reg(8)).unwrap().contains(&3));

        df.rename_block_vars(&mut proc, 0, true);

        // the call was pushed on r8's stack while its subtree was renamed,
        // so the φ's operand along 1 -> 3 is the call itself
        let (phi, _) = the_phi_for(&proc, bbs[3], &Exp::Reg(8));

        assert_eq!(operand_def(phi, bbs[1]), Some(call));
        assert_eq!(operand_def(phi, bbs[2]), Some(s0));

        // the definitions reaching the call were snapshotted before it
        // defined everything itself
        let col = proc.cfg().stmt(call).as_call().unwrap().def_collector();

        assert!(col.is_initialised());
        assert_eq!(
            col.find_def_for(&Exp::Reg(8)),
            Some(&Exp::subscripted(Exp::Reg(8), Some(s0)))
        );

        // and the φ operand told the call that r8 is live through it
        assert!(proc
            .cfg()
            .stmt(call)
            .as_call()
            .unwrap()
            .use_collector()
            .contains(&Exp::Reg(8)));

        assert_stacks_empty(&df);
    }

    #[test]
    fn use_with_no_definition_falls_back_to_define_all() {
        // 0 (childless call) -> 1 (use of r9 with no def anywhere)
        let (mut proc, bbs) = graph(2, &[(0, 1)]);
        let call = proc
            .cfg_mut()
            .append_stmt(bbs[0], Statement::call(CallStatement::childless("mystery")));
        let s1 = proc
            .cfg_mut()
            .append_stmt(bbs[1], Statement::assign(Exp::Reg(10), Exp::Reg(9)));

        let mut df = DataFlow::new();

        run_ssa(&mut df, &mut proc);

        assert_eq!(rhs_of(&proc, s1), Exp::subscripted(Exp::Reg(9), Some(call)));
        assert!(proc
            .cfg()
            .stmt(call)
            .as_call()
            .unwrap()
            .use_collector()
            .contains(&Exp::Reg(9)));
        assert!(proc.use_collector().is_empty());
        assert_stacks_empty(&df);
    }

    #[test]
    fn assume_abi_disables_define_all() {
        let (mut proc, bbs) = graph(2, &[(0, 1)]);

        proc.settings_mut().assume_abi = true;

        let _ = proc
            .cfg_mut()
            .append_stmt(bbs[0], Statement::call(CallStatement::childless("mystery")));
        let s1 = proc
            .cfg_mut()
            .append_stmt(bbs[1], Statement::assign(Exp::Reg(10), Exp::Reg(9)));

        let mut df = DataFlow::new();

        run_ssa(&mut df, &mut proc);

        // nothing was pushed: the use reaches procedure entry instead
        assert!(!df.stacks().contains_key(&Exp::DefineAll));
        assert_eq!(rhs_of(&proc, s1), Exp::subscripted(Exp::Reg(9), None));
        assert!(proc.use_collector().contains(&Exp::Reg(9)));
    }

    #[test]
    fn use_without_reaching_definition_gets_null_def() {
        let (mut proc, bbs) = graph(2, &[(0, 1)]);
        let s1 = proc
            .cfg_mut()
            .append_stmt(bbs[1], Statement::assign(Exp::Reg(10), Exp::Reg(9)));

        let mut df = DataFlow::new();

        run_ssa(&mut df, &mut proc);

        // no def anywhere: null definition, recorded at procedure level
        assert_eq!(rhs_of(&proc, s1), Exp::subscripted(Exp::Reg(9), None));
        assert!(proc.use_collector().contains(&Exp::Reg(9)));
        assert_stacks_empty(&df);
    }

    #[test]
    fn escaped_local_is_never_renamed() {
        let local = Exp::mem(Exp::op(
            BinOp::Sub,
            Exp::subscripted(Exp::Reg(28), None),
            Exp::Const(4),
        ));

        let (mut proc, bbs) = graph(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]);

        proc.mark_address_escaped(local.clone());

        let _ = proc
            .cfg_mut()
            .append_stmt(bbs[1], Statement::assign(local.clone(), Exp::Const(1)));
        let _ = proc
            .cfg_mut()
            .append_stmt(bbs[2], Statement::assign(local.clone(), Exp::Const(2)));
        let s3 = proc
            .cfg_mut()
            .append_stmt(bbs[3], Statement::assign(Exp::Reg(9), local.clone()));

        let mut df = DataFlow::new();

        df.set_rename_locals_and_params(true);
        df.dominators(proc.cfg());

        assert!(!df.can_rename(&local, &proc));
        assert!(!df.place_phi_functions(&mut proc));
        assert!(df.a_phi().get(&local).is_none());

        df.rename_block_vars(&mut proc, 0, true);

        // the memory use survives unsubscripted; the already-subscripted
        // sp inside its address is left alone too
        match &rhs_of(&proc, s3) {
            Exp::Mem(_) => {}
            other => panic!("escaped local was renamed to {other}"),
        }
    }

    #[test]
    fn unescaped_local_is_renamed_once_enabled() {
        let local = Exp::mem(Exp::op(
            BinOp::Sub,
            Exp::subscripted(Exp::Reg(28), None),
            Exp::Const(4),
        ));

        let (mut proc, bbs) = graph(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]);
        let _ = proc
            .cfg_mut()
            .append_stmt(bbs[1], Statement::assign(local.clone(), Exp::Const(1)));
        let _ = proc
            .cfg_mut()
            .append_stmt(bbs[2], Statement::assign(local.clone(), Exp::Const(2)));

        let mut df = DataFlow::new();

        // phase one: locals are off-limits
        df.dominators(proc.cfg());

        assert!(!df.can_rename(&local, &proc));
        assert!(!df.place_phi_functions(&mut proc));

        // phase two: escape analysis has run
        df.set_rename_locals_and_params(true);

        assert!(df.can_rename(&local, &proc));
        assert!(df.place_phi_functions(&mut proc));
        assert!(df.a_phi().get(&local).unwrap().contains(&3));

        df.rename_block_vars(&mut proc, 0, true);
        assert_stacks_empty(&df);
    }

    #[test]
    fn placement_is_idempotent() {
        let (mut proc, bbs) = graph(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]);
        let _ = proc
            .cfg_mut()
            .append_stmt(bbs[1], Statement::assign(Exp::Reg(8), Exp::Const(1)));
        let _ = proc
            .cfg_mut()
            .append_stmt(bbs[2], Statement::assign(Exp::Reg(8), Exp::Const(2)));

        let mut df = DataFlow::new();

        df.dominators(proc.cfg());

        assert!(df.place_phi_functions(&mut proc));
        assert!(!df.place_phi_functions(&mut proc));
        assert!(!df.place_phi_functions(&mut proc));
    }

    #[test]
    fn renaming_twice_changes_nothing() {
        let (mut proc, bbs) = graph(3, &[(0, 1), (1, 2)]);
        let s0 = proc
            .cfg_mut()
            .append_stmt(bbs[0], Statement::assign(Exp::Reg(8), Exp::Const(42)));
        let s2 = proc
            .cfg_mut()
            .append_stmt(bbs[2], Statement::assign(Exp::Reg(9), Exp::Reg(8)));

        let mut df = DataFlow::new();

        assert!(run_ssa(&mut df, &mut proc));

        let renamed = rhs_of(&proc, s2);

        // a second walk only refreshes collectors; no use is re-renamed
        assert!(!df.rename_block_vars(&mut proc, 0, true));
        assert_eq!(rhs_of(&proc, s2), renamed);
        assert_eq!(renamed, Exp::subscripted(Exp::Reg(8), Some(s0)));
    }

    #[test]
    fn return_snapshots_reaching_definitions() {
        let (mut proc, bbs) = graph(2, &[(0, 1)]);
        let s0 = proc
            .cfg_mut()
            .append_stmt(bbs[0], Statement::assign(Exp::Reg(24), Exp::Const(7)));
        let ret = proc
            .cfg_mut()
            .append_stmt(bbs[1], Statement::ret(ReturnStatement::new()));

        let mut df = DataFlow::new();

        run_ssa(&mut df, &mut proc);

        let col = proc.cfg().stmt(ret).as_ret().unwrap().collector();

        assert!(col.is_initialised());
        assert_eq!(
            col.find_def_for(&Exp::Reg(24)),
            Some(&Exp::subscripted(Exp::Reg(24), Some(s0)))
        );
        assert_stacks_empty(&df);
    }

    #[test]
    fn local_definition_pushes_its_mapped_location_too() {
        let mapped = Exp::mem(Exp::op(
            BinOp::Sub,
            Exp::subscripted(Exp::Reg(28), None),
            Exp::Const(8),
        ));

        let (mut proc, bbs) = graph(1, &[]);

        proc.map_symbol("x", mapped.clone());

        let s0 = proc
            .cfg_mut()
            .append_stmt(bbs[0], Statement::assign(Exp::Local("x".into()), Exp::Const(3)));
        let s1 = proc
            .cfg_mut()
            .append_stmt(bbs[0], Statement::assign(Exp::Reg(9), Exp::Local("x".into())));

        let mut df = DataFlow::new();

        run_ssa(&mut df, &mut proc);

        assert_eq!(rhs_of(&proc, s1), Exp::subscripted(Exp::Local("x".into()), Some(s0)));

        // both the local's stack and the mapped location's stack balanced
        assert_stacks_empty(&df);
        assert!(df.stacks().contains_key(&mapped));
    }

    #[test]
    #[should_panic(expected = "no mapped location")]
    fn unmapped_local_is_an_invariant_violation() {
        let (mut proc, bbs) = graph(1, &[]);
        let _ = proc
            .cfg_mut()
            .append_stmt(bbs[0], Statement::assign(Exp::Local("y".into()), Exp::Const(3)));

        let mut df = DataFlow::new();

        run_ssa(&mut df, &mut proc);
    }

    #[test]
    fn flags_and_temps_rename_like_registers() {
        use crate::ir::{FlagBit, StatementKind};

        // 0: %ZF and tmp1 defined; 1: branch on %ZF, r9 := tmp1 + %pc
        let (mut proc, bbs) = graph(2, &[(0, 1)]);
        let s0 = proc.cfg_mut().append_stmt(
            bbs[0],
            Statement::assign(Exp::FlagBit(FlagBit::Zero), Exp::Reg(8)),
        );
        let s1 = proc
            .cfg_mut()
            .append_stmt(bbs[0], Statement::assign(Exp::Temp("tmp1".into()), Exp::Const(1)));
        let br = proc
            .cfg_mut()
            .append_stmt(bbs[1], Statement::branch(Exp::FlagBit(FlagBit::Zero)));
        let s2 = proc.cfg_mut().append_stmt(
            bbs[1],
            Statement::assign(
                Exp::Reg(9),
                Exp::op(BinOp::Add, Exp::Temp("tmp1".into()), Exp::Pc),
            ),
        );

        let mut df = DataFlow::new();

        run_ssa(&mut df, &mut proc);

        match proc.cfg().stmt(br).kind() {
            StatementKind::Branch(cond) => {
                assert_eq!(
                    cond,
                    &Exp::subscripted(Exp::FlagBit(FlagBit::Zero), Some(s0))
                );
            }
            _ => unreachable!(),
        }

        // the temporary picked up its def; the program counter is junk and
        // is left alone
        assert_eq!(
            rhs_of(&proc, s2),
            Exp::op(
                BinOp::Add,
                Exp::subscripted(Exp::Temp("tmp1".into()), Some(s1)),
                Exp::Pc
            )
        );
        assert_stacks_empty(&df);
    }

    #[test]
    fn use_collector_round_trips_out_of_ssa() {
        let (mut proc, bbs) = graph(2, &[(0, 1)]);
        let _ = proc
            .cfg_mut()
            .append_stmt(bbs[1], Statement::assign(Exp::Reg(10), Exp::Reg(9)));

        let mut df = DataFlow::new();

        run_ssa(&mut df, &mut proc);

        let before = proc.use_collector().clone();
        let mut after = before.clone();

        after.from_ssa_form(&proc, None);

        assert_eq!(before, after);
    }

    #[test]
    fn every_renamed_use_has_exactly_one_def() {
        // SSA uniqueness over a busier graph: every subscripted use points
        // at a statement that actually defines its base location
        let (mut proc, bbs) = graph(
            5,
            &[(0, 1), (0, 2), (1, 3), (2, 3), (3, 4), (4, 1)],
        );

        for (bb, value) in [(1, 1), (2, 2), (3, 3)] {
            let _ = proc
                .cfg_mut()
                .append_stmt(bbs[bb], Statement::assign(Exp::Reg(8), Exp::Const(value)));
        }

        let _ = proc
            .cfg_mut()
            .append_stmt(bbs[4], Statement::assign(Exp::Reg(9), Exp::Reg(8)));

        let mut df = DataFlow::new();

        run_ssa(&mut df, &mut proc);

        let cfg = proc.cfg();

        for bb in cfg.blocks() {
            for &s in cfg.stmts_of(bb) {
                let mut uses = LocationSet::new();

                cfg.stmt(s).used_locs(&mut uses);

                for u in uses {
                    if let Exp::Ref {
                        base,
                        def: Some(d),
                    } = u
                    {
                        let mut defs = LocationSet::new();

                        cfg.stmt(d).definitions(&mut defs);

                        assert!(
                            defs.iter().any(|loc| loc.base() == base.base())
                                || cfg.stmt(d).as_call().is_some_and(CallStatement::is_childless),
                            "use of {base} subscripted with a statement that does not define it"
                        );
                    }
                }
            }
        }

        assert_stacks_empty(&df);
    }
}
