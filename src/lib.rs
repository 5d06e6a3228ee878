//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

#![deny(
    unreachable_pub,
    missing_docs,
    missing_abi,
    rust_2018_idioms,
    rustdoc::broken_intra_doc_links,
    rustdoc::private_intra_doc_links
)]

//! # Citrine
//!
//! The dataflow core of the Citrine machine-code decompiler. This crate takes
//! a procedure's control-flow graph of basic blocks containing IR statements,
//! computes its dominator tree and dominance frontiers, and rewrites the
//! procedure into SSA form: φ-assignments are placed at join points for every
//! renameable location, and every use and definition is subscripted so that
//! each location has a single defining statement.
//!
//! Unlike SSA construction inside a compiler, the "variables" here are
//! arbitrary machine locations (registers, flags, memory cells that match the
//! procedure's local/parameter pattern), and calls into procedures that have
//! not been analysed yet conservatively define *everything*. The collectors
//! maintained during renaming record which locations are used before any
//! definition is known, so that later passes can reconstruct parameters,
//! arguments and return values.

// Even when trace logging is disabled, the trace macro has a significant
// cost in hot loops, so it compiles to nothing unless the feature is on.
macro_rules! trace {
    ($($tt:tt)*) => {
        if cfg!(feature = "trace-log") {
            ::log::trace!($($tt)*);
        }
    };
}

pub mod arena;
pub mod ir;
pub mod ssa;
pub mod utility;
