//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

//! The decompiler IR surface that the dataflow core consumes: expressions
//! identifying machine locations, the statements that define and use them,
//! the control-flow graph that owns both, and the procedure wrapper tying
//! them to per-procedure knowledge (symbols, escape analysis, settings).

mod cfg;
mod exp;
mod proc;
mod stmt;
mod visitor;

pub use cfg::*;
pub use exp::*;
pub use proc::*;
pub use stmt::*;
pub use visitor::*;
