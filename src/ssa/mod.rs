//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

//! The SSA construction core.
//!
//! One [`DataFlow`] value per procedure carries every piece of analysis
//! state: the block↔index mapping, the Lengauer–Tarjan dominator vectors and
//! dominance frontiers, the φ-placement maps, and the per-location
//! definition stacks used while renaming. The driver-visible entry points
//! are [`DataFlow::dominators`], [`DataFlow::place_phi_functions`],
//! [`DataFlow::rename_block_vars`], and the auxiliary queries in
//! [`queries`](self).
//!
//! The whole core is single-threaded; analyse multiple procedures in
//! parallel by giving each worker its own `DataFlow`.

mod collectors;
mod dominators;
mod queries;
mod rename;

pub use collectors::*;

use crate::arena::ArenaKey;
use crate::ir::{Block, Exp, Stmt};
use crate::utility::SaHashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};

/// The per-location definition stacks maintained by the renaming walk. The
/// statement on top of `stacks[loc]` is the definition of `loc` reaching
/// the current point of the dominator-tree walk.
pub type Stacks = BTreeMap<Exp, Vec<Stmt>>;

/// Dataflow analysis state for one procedure.
///
/// Re-runnable: [`Self::dominators`] rebuilds everything from the CFG,
/// [`Self::place_phi_functions`] clears and rebuilds the φ-placement maps,
/// and the top-level [`Self::rename_block_vars`] call clears the stacks.
pub struct DataFlow {
    // block↔index mapping; the entry block is always index 0. Unreachable
    // blocks get indices too, but keep dfnum = 0.
    pub(in crate::ssa) bbs: Vec<Block>,
    pub(in crate::ssa) indices: SaHashMap<Block, usize>,

    // Lengauer–Tarjan state, all indexed by block index
    pub(in crate::ssa) n: usize,
    pub(in crate::ssa) dfnum: Vec<usize>,
    pub(in crate::ssa) vertex: Vec<i32>,
    pub(in crate::ssa) parent: Vec<i32>,
    pub(in crate::ssa) semi: Vec<i32>,
    pub(in crate::ssa) ancestor: Vec<i32>,
    pub(in crate::ssa) best: Vec<i32>,
    pub(in crate::ssa) idom: Vec<i32>,
    pub(in crate::ssa) samedom: Vec<i32>,
    pub(in crate::ssa) bucket: Vec<BTreeSet<usize>>,
    pub(in crate::ssa) df: Vec<BTreeSet<usize>>,

    // φ-placement state
    pub(in crate::ssa) a_orig: Vec<BTreeSet<Exp>>,
    pub(in crate::ssa) defsites: BTreeMap<Exp, BTreeSet<usize>>,
    pub(in crate::ssa) defallsites: BTreeSet<usize>,
    pub(in crate::ssa) a_phi: BTreeMap<Exp, BTreeSet<usize>>,
    pub(in crate::ssa) def_stmts: BTreeMap<Exp, Stmt>,

    // rename state
    pub(in crate::ssa) stacks: Stacks,
    pub(in crate::ssa) rename_locals_and_params: bool,
}

impl DataFlow {
    /// Creates an empty analysis. Nothing is valid until
    /// [`Self::dominators`] has run.
    pub fn new() -> Self {
        Self {
            bbs: Vec::new(),
            indices: SaHashMap::default(),
            n: 0,
            dfnum: Vec::new(),
            vertex: Vec::new(),
            parent: Vec::new(),
            semi: Vec::new(),
            ancestor: Vec::new(),
            best: Vec::new(),
            idom: Vec::new(),
            samedom: Vec::new(),
            bucket: Vec::new(),
            df: Vec::new(),
            a_orig: Vec::new(),
            defsites: BTreeMap::new(),
            defallsites: BTreeSet::new(),
            a_phi: BTreeMap::new(),
            def_stmts: BTreeMap::new(),
            stacks: Stacks::new(),
            rename_locals_and_params: false,
        }
    }

    /// Whether locals and parameters (memory cells matching the procedure's
    /// local/parameter pattern) may currently be renamed.
    pub fn renames_locals_and_params(&self) -> bool {
        self.rename_locals_and_params
    }

    /// Switches on renaming of locals and parameters. The driver flips this
    /// once escape analysis has run; it is a monotonic phase switch.
    pub fn set_rename_locals_and_params(&mut self, flag: bool) {
        self.rename_locals_and_params = flag;
    }

    /// The index assigned to `bb`, or `None` before [`Self::dominators`]
    /// has run.
    pub fn block_index(&self, bb: Block) -> Option<usize> {
        self.indices.get(&bb).copied()
    }

    /// The block at index `n`.
    pub fn block_at(&self, n: usize) -> Block {
        self.bbs[n]
    }

    /// The number of indexed blocks.
    pub fn num_indexed(&self) -> usize {
        self.bbs.len()
    }

    /// The immediate dominator of block index `n`, or `None` for the entry
    /// block and for unreachable blocks.
    pub fn idom_of(&self, n: usize) -> Option<usize> {
        match self.idom[n] {
            -1 => None,
            d => Some(d as usize),
        }
    }

    /// The dominance frontier of block index `n`.
    pub fn frontier(&self, n: usize) -> &BTreeSet<usize> {
        &self.df[n]
    }

    /// The blocks containing childless calls, which conservatively define
    /// every location.
    pub fn defallsites(&self) -> &BTreeSet<usize> {
        &self.defallsites
    }

    /// The blocks defining each location, as discovered by the last
    /// [`Self::place_phi_functions`] run (define-all sites already folded
    /// in).
    pub fn defsites(&self) -> &BTreeMap<Exp, BTreeSet<usize>> {
        &self.defsites
    }

    /// The blocks carrying a φ-assignment for each location.
    pub fn a_phi(&self) -> &BTreeMap<Exp, BTreeSet<usize>> {
        &self.a_phi
    }

    /// A representative defining statement for each location, kept for
    /// diagnostics.
    pub fn def_stmt_for(&self, loc: &Exp) -> Option<Stmt> {
        self.def_stmts.get(loc).copied()
    }

    /// The renaming stacks. Outside of a [`Self::rename_block_vars`] walk
    /// every stack is empty; anything else means the walk was unbalanced.
    pub fn stacks(&self) -> &Stacks {
        &self.stacks
    }

    /// Writes the renaming stacks to `w`, one line per location.
    pub fn dump_stacks(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(w, "Stacks: {} entries", self.stacks.len())?;

        for (loc, stack) in &self.stacks {
            write!(w, "Var {loc} [ ")?;

            for s in stack.iter().rev() {
                write!(w, "s{} ", s.index())?;
            }

            writeln!(w, "]")?;
        }

        Ok(())
    }

    /// Writes the `A_phi` map to `w`.
    pub fn dump_a_phi(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(w, "A_phi:")?;

        for (loc, blocks) in &self.a_phi {
            write!(w, "{loc} ->")?;

            for n in blocks {
                write!(w, " {n}")?;
            }

            writeln!(w)?;
        }

        writeln!(w, "end A_phi")
    }

    /// Writes the defsites map to `w`.
    pub fn dump_defsites(&self, w: &mut dyn Write) -> io::Result<()> {
        for (loc, blocks) in &self.defsites {
            write!(w, "{loc}")?;

            for n in blocks {
                write!(w, " {n}")?;
            }

            writeln!(w)?;
        }

        Ok(())
    }

    /// Writes the per-block definition sets to `w`.
    pub fn dump_a_orig(&self, w: &mut dyn Write) -> io::Result<()> {
        for (n, locs) in self.a_orig.iter().enumerate() {
            write!(w, "{n}")?;

            for loc in locs {
                write!(w, " {loc}")?;
            }

            writeln!(w)?;
        }

        Ok(())
    }
}

impl Default for DataFlow {
    fn default() -> Self {
        Self::new()
    }
}
