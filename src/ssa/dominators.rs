//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::ir::{Block, Cfg};
use crate::ssa::DataFlow;
use smallvec::SmallVec;
use std::collections::BTreeSet;

//
// The dominator tree is computed with the Lengauer–Tarjan algorithm as
// presented in Appel's "Modern Compiler Implementation" (algorithms 19.9
// and 19.10b), with path compression in `ancestor_with_lowest_semi` for
// O(N log N) overall. Dominance frontiers are Cytron's DF_local/DF_up
// formulation, computed bottom-up over the dominator tree.
//

impl DataFlow {
    /// Computes the dominator tree and dominance frontiers of `cfg`,
    /// rebuilding the block↔index mapping from scratch.
    ///
    /// After this returns, `idom[0] == None`, every reachable block has its
    /// unique immediate dominator, and [`Self::frontier`] is exact.
    /// Unreachable blocks keep valid indices but no dominator relation.
    pub fn dominators(&mut self, cfg: &Cfg) {
        let r = cfg.entry_block();
        let num_bb = cfg.num_blocks();

        self.bbs.clear();
        self.bbs.resize(num_bb, r);
        self.indices.clear(); // restarts re-index everything
        self.indices.insert(r, 0);
        self.n = 0;

        self.dfnum = vec![0; num_bb];
        self.semi = vec![-1; num_bb];
        self.ancestor = vec![-1; num_bb];
        self.idom = vec![-1; num_bb];
        self.samedom = vec![-1; num_bb];
        self.vertex = vec![-1; num_bb];
        self.parent = vec![-1; num_bb];
        self.best = vec![-1; num_bb];
        self.bucket = vec![BTreeSet::new(); num_bb];
        self.df = vec![BTreeSet::new(); num_bb];

        // index every block up front: a block can be unreachable, so
        // discovering blocks through edges would miss some
        let mut idx = 1;

        for bb in cfg.blocks() {
            if bb != r {
                self.indices.insert(bb, idx);
                self.bbs[idx] = bb;
                idx += 1;
            }
        }

        self.dfs(cfg, -1, 0);

        for i in (1..self.n).rev() {
            let n = self.vertex[i] as usize;
            let p = self.parent[n];
            let mut s = p;

            // semi-dominator of n, per the Semidominator Theorem
            for &pred in cfg.in_edges(self.bbs[n]) {
                let v = self.index_of(pred);

                // a predecessor the DFS never reached has no semi-dominator
                // to contribute
                if v != 0 && self.dfnum[v] == 0 {
                    continue;
                }

                let sdash = if self.dfnum[v] <= self.dfnum[n] {
                    v as i32
                } else {
                    let lowest = self.ancestor_with_lowest_semi(v);
                    self.semi[lowest]
                };

                if self.dfnum[sdash as usize] < self.dfnum[s as usize] {
                    s = sdash;
                }
            }

            self.semi[n] = s;

            // n's dominator calculation is deferred until the path from s
            // to n has been linked into the spanning forest
            self.bucket[s as usize].insert(n);
            self.link(p, n);

            let deferred: SmallVec<[usize; 8]> =
                self.bucket[p as usize].iter().copied().collect();

            for v in deferred {
                let y = self.ancestor_with_lowest_semi(v);

                if self.semi[y] == self.semi[v] {
                    self.idom[v] = p;
                } else {
                    self.samedom[v] = y as i32;
                }
            }

            self.bucket[p as usize].clear();
        }

        // deferred dominators, second clause of the Dominator Theorem
        for i in 1..self.n {
            let n = self.vertex[i] as usize;

            if self.samedom[n] != -1 {
                self.idom[n] = self.idom[self.samedom[n] as usize];
            }
        }

        self.compute_df(cfg, 0);

        trace!("dominators: {} of {num_bb} blocks reachable", self.n);
    }

    /// Whether block index `n` dominates block index `w`, by walking up the
    /// dominator tree from `w`.
    pub fn dominates(&self, n: usize, w: usize) -> bool {
        let mut w = w;

        while self.idom[w] != -1 {
            if self.idom[w] == n as i32 {
                return true;
            }

            w = self.idom[w] as usize;
        }

        false
    }

    pub(in crate::ssa) fn index_of(&self, bb: Block) -> usize {
        match self.indices.get(&bb) {
            Some(&idx) => idx,
            None => panic!("block {bb:?} is not in the index map; the CFG changed after `dominators`"),
        }
    }

    fn dfs(&mut self, cfg: &Cfg, p: i32, n: usize) {
        self.dfnum[n] = self.n;
        self.vertex[self.n] = n as i32;
        self.parent[n] = p;
        self.n += 1;

        let succs: SmallVec<[usize; 4]> = cfg
            .out_edges(self.bbs[n])
            .iter()
            .map(|&w| self.index_of(w))
            .collect();

        for w in succs {
            // index 0 is the entry, which is always numbered first; every
            // other unvisited block still has dfnum 0
            if w != 0 && self.dfnum[w] == 0 {
                self.dfs(cfg, n as i32, w);
            }
        }
    }

    fn link(&mut self, p: i32, n: usize) {
        self.ancestor[n] = p;
        self.best[n] = n as i32;
    }

    // Path compression: after this, v's ancestor chain is (roughly) halved
    // and `best[v]` is the ancestor of v with the lowest-numbered
    // semi-dominator. Unrolled onto a work vector so that very deep DFS
    // trees cannot overflow the call stack.
    fn ancestor_with_lowest_semi(&mut self, v: usize) -> usize {
        let mut work: SmallVec<[usize; 16]> = SmallVec::new();
        let mut u = v;

        while self.ancestor[self.ancestor[u] as usize] != -1 {
            work.push(u);
            u = self.ancestor[u] as usize;
        }

        let mut b = self.best[u] as usize;

        while let Some(w) = work.pop() {
            let a = self.ancestor[w] as usize;

            self.ancestor[w] = self.ancestor[a];

            if self.dfnum[self.semi[b] as usize]
                < self.dfnum[self.semi[self.best[w] as usize] as usize]
            {
                self.best[w] = b as i32;
            }

            b = self.best[w] as usize;
        }

        b
    }

    fn compute_df(&mut self, cfg: &Cfg, n: usize) {
        let mut s = BTreeSet::new();

        // DF_local: successors n does not immediately dominate
        for &succ in cfg.out_edges(self.bbs[n]) {
            let y = self.index_of(succ);

            if self.idom[y] != n as i32 {
                s.insert(y);
            }
        }

        // DF_up of every dominator-tree child (linear scan of idom)
        for c in 0..self.idom.len() {
            if self.idom[c] != n as i32 {
                continue;
            }

            self.compute_df(cfg, c);

            for &w in &self.df[c] {
                if n == w || !self.dominates(n, w) {
                    s.insert(w);
                }
            }
        }

        self.df[n] = s;
    }
}
