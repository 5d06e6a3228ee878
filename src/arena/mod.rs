//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

//! A small typed arena that does not allow deletion. Blocks and statements
//! are both arena keys, which makes references to them (`Block`, `Stmt`)
//! plain `Copy` integers that can live inside expression trees and ordered
//! maps without any ownership cycles.

mod key;
mod map;

pub use key::ArenaKey;
pub use map::ArenaMap;
