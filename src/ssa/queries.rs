//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::ir::{Cfg, Exp, ExpTransformer, ImplicitConverter, LocationSet, Stmt};
use crate::ssa::DataFlow;
use std::collections::BTreeMap;

impl DataFlow {
    /// Finds the locations that are live across a dominating φ, walking the
    /// dominator tree in pre-order from block index `n` (call with `n = 0`).
    ///
    /// A location lands in `used_by_dom_phi` when a φ that dominates its
    /// (unique) assignment uses it: first a φ operand adds `loc{def}` to
    /// `used_by_dom_phi0`, and when the walk later reaches the defining
    /// statement the entry moves to `used_by_dom_phi`.
    ///
    /// `defd_by_phi` tracks φ definitions that have not been used yet: each
    /// φ inserts `lhs{φ} → φ`, and every use erases its entry. Whatever is
    /// left at the end is a dead φ, and callers may remove it together with
    /// the `used_by_dom_phi` entries it justified.
    pub fn find_live_at_dom_phi(
        &self,
        cfg: &Cfg,
        n: usize,
        used_by_dom_phi: &mut LocationSet,
        used_by_dom_phi0: &mut LocationSet,
        defd_by_phi: &mut BTreeMap<Exp, Stmt>,
    ) {
        let bb = self.bbs[n];

        for &s in cfg.stmts_of(bb) {
            let stmt = cfg.stmt(s);

            if let Some(phi) = stmt.as_phi() {
                // every operand is a use, wrapped with the definition the
                // renamer gave it
                for op in phi.operands() {
                    used_by_dom_phi0.insert(Exp::subscripted(op.base.clone(), op.def));
                }

                defd_by_phi.insert(Exp::subscripted(phi.lhs().clone(), Some(s)), s);
                // fall through: φ uses are legitimate uses too
            }

            let mut uses = LocationSet::new();

            stmt.used_locs(&mut uses);

            for u in &uses {
                // this φ definition is used somewhere, so it is not dead
                defd_by_phi.remove(u);
            }

            let mut defs = LocationSet::new();

            stmt.definitions(&mut defs);

            for d in defs {
                let wrapped = Exp::subscripted(d, Some(s));

                // each location is defined only once, so this is the moment
                // to decide whether its assignment is dominated by a φ use
                // of itself
                if used_by_dom_phi0.remove(&wrapped) {
                    used_by_dom_phi.insert(wrapped);
                }
            }
        }

        // stale used_by_dom_phi0 entries are harmless; erasing them would
        // cost more than carrying them
        for c in 0..self.idom.len() {
            if self.idom[c] == n as i32 {
                self.find_live_at_dom_phi(cfg, c, used_by_dom_phi, used_by_dom_phi0, defd_by_phi);
            }
        }
    }

    /// Assigns every statement a monotonically increasing dominance number
    /// in dominator-tree pre-order, starting from block index `n` (call
    /// with `n = 0` and `curr_num = 0`).
    pub fn set_dominance_nums(&self, cfg: &mut Cfg, n: usize, curr_num: &mut i32) {
        let stmts: Vec<Stmt> = cfg.stmts_of(self.bbs[n]).to_vec();

        for s in stmts {
            cfg.stmt_mut(s).set_dom_number(*curr_num);
            *curr_num += 1;
        }

        for c in 0..self.idom.len() {
            if self.idom[c] == n as i32 {
                self.set_dominance_nums(cfg, c, curr_num);
            }
        }
    }

    /// Re-keys `A_phi`, the defsites and the per-block definition sets
    /// after the IR has replaced entry placeholders `e{-}` with references
    /// to implicit assignments.
    ///
    /// The keys were captured before that rewrite, so each one is passed
    /// through the same [`ImplicitConverter`] the IR used; otherwise later
    /// lookups with converted expressions would miss.
    pub fn convert_implicits(&mut self, cfg: &mut Cfg) {
        let mut ic = ImplicitConverter::new(cfg);

        let a_phi = std::mem::take(&mut self.a_phi);

        self.a_phi = a_phi
            .into_iter()
            .map(|(e, sites)| (ic.transform(e), sites))
            .collect();

        let defsites = std::mem::take(&mut self.defsites);

        self.defsites = defsites
            .into_iter()
            .map(|(e, sites)| (ic.transform(e), sites))
            .collect();

        let a_orig = std::mem::take(&mut self.a_orig);

        self.a_orig = a_orig
            .into_iter()
            .map(|set| set.into_iter().map(|e| ic.transform(e)).collect())
            .collect();
    }
}
