//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::ir::{Assign, Exp, ExpTransformer, LocationSet, SsaStripper, Stmt, UserProc};
use crate::ssa::Stacks;
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

/// An ordered set of locations used before any definition of them is known.
///
/// One lives in every [`UserProc`] (locations that reach procedure entry,
/// the future implicit parameters) and one in every call statement
/// (locations a not-yet-analysed callee may read).
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct UseCollector {
    locs: LocationSet,
    initialised: bool,
}

impl UseCollector {
    /// Creates an empty, uninitialised collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the collector's contents have been computed at least once.
    pub fn is_initialised(&self) -> bool {
        self.initialised
    }

    /// Marks the collector as computed.
    pub fn set_initialised(&mut self) {
        self.initialised = true;
    }

    /// Inserts a location, by value.
    pub fn insert(&mut self, e: Exp) {
        self.locs.insert(e);
    }

    /// Removes a location; returns whether it was present.
    pub fn remove(&mut self, e: &Exp) -> bool {
        self.locs.remove(e)
    }

    /// Whether the collector contains `e`.
    pub fn contains(&self, e: &Exp) -> bool {
        self.locs.contains(e)
    }

    /// The number of collected locations.
    pub fn len(&self) -> usize {
        self.locs.len()
    }

    /// Whether the collector is empty.
    pub fn is_empty(&self) -> bool {
        self.locs.is_empty()
    }

    /// Iterates over the collected locations in order.
    pub fn iter(&self) -> impl Iterator<Item = &Exp> + '_ {
        self.locs.iter()
    }

    /// Translates the collector out of SSA form.
    ///
    /// Each collected location is wrapped as `loc{def}` and run through the
    /// SSA-removal transform; whatever comes back (a recovered local name,
    /// or the location with its subscripts stripped) replaces the original
    /// entry.
    pub fn from_ssa_form(&mut self, proc: &UserProc, def: Option<Stmt>) {
        let mut removes = Vec::new();
        let mut inserts = Vec::new();

        for loc in &self.locs {
            let wrapped = Exp::subscripted(loc.clone(), def);
            let out = SsaStripper::new(proc).transform(wrapped);

            if out != *loc {
                removes.push(loc.clone());
                inserts.push(out);
            }
        }

        for e in removes {
            self.locs.remove(&e);
        }

        for e in inserts {
            self.locs.insert(e);
        }
    }
}

impl Display for UseCollector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, loc) in self.locs.iter().enumerate() {
            if i != 0 {
                write!(f, ",  ")?;
            }

            write!(f, "{loc}")?;
        }

        Ok(())
    }
}

/// An ordered set of assignments capturing the definitions that reach a call
/// or a return, keyed by left-hand side.
///
/// At most one assignment per left-hand side is kept; later insertions for
/// the same location are ignored.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DefCollector {
    defs: BTreeMap<Exp, Exp>,
    initialised: bool,
}

impl DefCollector {
    /// Creates an empty, uninitialised collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether [`Self::update_defs`] has run at least once.
    pub fn is_initialised(&self) -> bool {
        self.initialised
    }

    /// Inserts an assignment, unless one with the same left-hand side is
    /// already present.
    pub fn insert(&mut self, a: Assign) {
        self.defs.entry(a.lhs).or_insert(a.rhs);
    }

    /// The definition for `e` that reaches this collector, or `None` if no
    /// definition of `e` reaches here.
    pub fn find_def_for(&self, e: &Exp) -> Option<&Exp> {
        self.defs.get(e)
    }

    /// Snapshots the current reaching definitions: for every location with a
    /// non-empty stack, materialises `loc := loc{top}` and inserts it.
    pub fn update_defs(&mut self, stacks: &Stacks) {
        for (loc, stack) in stacks {
            let top = match stack.last() {
                Some(&s) => s,
                None => continue, // this variable's definition doesn't reach here
            };

            self.insert(Assign {
                lhs: loc.clone(),
                rhs: Exp::subscripted(loc.clone(), Some(top)),
            });
        }

        self.initialised = true;
    }

    /// Replaces every occurrence of `from` with `to` on both sides of every
    /// collected assignment. Returns whether anything changed.
    pub fn search_replace_all(&mut self, from: &Exp, to: &Exp) -> bool {
        let mut changed = false;
        let old = std::mem::take(&mut self.defs);

        for (lhs, rhs) in old {
            let (lhs, c1) = lhs.search_replace(from, to);
            let (rhs, c2) = rhs.search_replace(from, to);

            changed |= c1 || c2;
            self.defs.entry(lhs).or_insert(rhs);
        }

        changed
    }

    /// The number of collected assignments.
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    /// Whether the collector is empty.
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Iterates over `(lhs, rhs)` pairs in left-hand-side order.
    pub fn iter(&self) -> impl Iterator<Item = (&Exp, &Exp)> + '_ {
        self.defs.iter()
    }
}

impl Display for DefCollector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, (lhs, rhs)) in self.defs.iter().enumerate() {
            if i != 0 {
                write!(f, ",   ")?;
            }

            write!(f, "{lhs}={rhs}")?;
        }

        Ok(())
    }
}
