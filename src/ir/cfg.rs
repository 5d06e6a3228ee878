//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::arena::ArenaMap;
use crate::dense_arena_key;
use crate::ir::{Exp, Statement, Stmt};
use smallvec::SmallVec;
use std::collections::BTreeMap;

dense_arena_key! {
    /// References a single basic block in a procedure's control-flow graph.
    pub struct Block;
}

struct BlockData {
    stmts: Vec<Stmt>,
    in_edges: SmallVec<[Block; 2]>,
    out_edges: SmallVec<[Block; 2]>,
}

/// The control-flow graph of one procedure.
///
/// The graph owns its blocks and the arena of statements they contain;
/// everything else refers to both through their `Copy` keys, which is what
/// lets the dataflow code keep per-block state in parallel-indexed vectors
/// without any owning pointers between blocks.
///
/// Block discovery and edge creation are the frontend's job; this type only
/// provides the surface the dataflow core consumes.
pub struct Cfg {
    blocks: ArenaMap<Block, BlockData>,
    stmts: ArenaMap<Stmt, Statement>,
    entry: Option<Block>,
    implicits: BTreeMap<Exp, Stmt>,
}

impl Cfg {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self {
            blocks: ArenaMap::default(),
            stmts: ArenaMap::default(),
            entry: None,
            implicits: BTreeMap::new(),
        }
    }

    /// Creates a new, empty block. The first block created becomes the
    /// procedure's entry.
    pub fn new_block(&mut self) -> Block {
        let bb = self.blocks.insert(BlockData {
            stmts: Vec::new(),
            in_edges: SmallVec::new(),
            out_edges: SmallVec::new(),
        });

        if self.entry.is_none() {
            self.entry = Some(bb);
        }

        bb
    }

    /// The procedure's entry block.
    ///
    /// Panics if no block has been created yet.
    pub fn entry_block(&self) -> Block {
        self.entry.expect("control-flow graph has no entry block")
    }

    /// Overrides which block is the procedure's entry.
    pub fn set_entry(&mut self, bb: Block) {
        self.entry = Some(bb);
    }

    /// The number of blocks in the graph, reachable or not.
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Iterates over every block in creation order.
    pub fn blocks(&self) -> impl Iterator<Item = Block> + '_ {
        self.blocks.keys()
    }

    /// Adds a control-flow edge `from -> to`.
    pub fn add_edge(&mut self, from: Block, to: Block) {
        self.blocks[from].out_edges.push(to);
        self.blocks[to].in_edges.push(from);
    }

    /// The predecessors of `bb`, in edge-creation order.
    pub fn in_edges(&self, bb: Block) -> &[Block] {
        &self.blocks[bb].in_edges
    }

    /// The successors of `bb`, in edge-creation order.
    pub fn out_edges(&self, bb: Block) -> &[Block] {
        &self.blocks[bb].out_edges
    }

    /// The statements of `bb` in forward order. Iterate the slice in reverse
    /// for the backward leg of the renaming walk.
    pub fn stmts_of(&self, bb: Block) -> &[Stmt] {
        &self.blocks[bb].stmts
    }

    /// Appends a statement to the end of `bb`.
    pub fn append_stmt(&mut self, bb: Block, stmt: Statement) -> Stmt {
        let s = self.stmts.insert(stmt);

        self.blocks[bb].stmts.push(s);

        s
    }

    /// Prepends a statement to the front of `bb`. This is how φ-assignments
    /// land at the top of join blocks.
    pub fn prepend_stmt(&mut self, bb: Block, stmt: Statement) -> Stmt {
        let s = self.stmts.insert(stmt);

        self.blocks[bb].stmts.insert(0, s);

        s
    }

    /// Looks up a statement.
    pub fn stmt(&self, s: Stmt) -> &Statement {
        &self.stmts[s]
    }

    /// Mutable variant of [`Self::stmt`].
    pub fn stmt_mut(&mut self, s: Stmt) -> &mut Statement {
        &mut self.stmts[s]
    }

    /// Finds (creating on first request) the implicit assignment that
    /// defines `e` at procedure entry.
    ///
    /// Implicit assignments give the procedure-entry placeholder `e{-}` a
    /// real defining statement once the IR has stopped rewriting memory
    /// expressions; they live at the top of the entry block.
    pub fn find_implicit_assign(&mut self, e: &Exp) -> Stmt {
        if let Some(&s) = self.implicits.get(e) {
            return s;
        }

        let entry = self.entry_block();
        let s = self.prepend_stmt(entry, Statement::implicit(e.clone()));

        self.implicits.insert(e.clone(), s);

        s
    }
}

impl Default for Cfg {
    fn default() -> Self {
        Self::new()
    }
}
