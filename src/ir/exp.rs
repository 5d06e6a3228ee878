//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::ir::Stmt;
use static_assertions::assert_impl_all;
use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

/// The number of a machine register, as assigned by the frontend's
/// register mapping.
pub type RegNum = u16;

/// One of the individual condition-code bits that instruction semantics
/// read and write.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FlagBit {
    /// The carry flag, `%CF`.
    Carry,
    /// The zero flag, `%ZF`.
    Zero,
    /// The sign flag, `%SF`.
    Sign,
    /// The overflow flag, `%OF`.
    Overflow,
}

/// The operators that appear inside address computations.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BinOp {
    /// Integer addition.
    Add,
    /// Integer subtraction.
    Sub,
}

/// A decompiler IR expression.
///
/// Expressions identify the things that statements define and use: machine
/// registers, decoder temporaries, flags, memory cells, and (late in the
/// pipeline) named locals. They have *value* semantics: structural equality,
/// deep cloning, and a derived total order so they can key ordered maps.
/// The dataflow core clones an expression whenever it stores one as a map
/// key, so the IR is free to rewrite the original afterwards.
///
/// An SSA subscript is itself an expression: [`Exp::Ref`] wraps a base
/// location together with its defining statement. `def: None` is the
/// procedure-entry placeholder, printed `{-}`, which later becomes a
/// reference to an implicit assignment.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Exp {
    /// A machine register, `r24`.
    Reg(RegNum),
    /// A temporary introduced while decoding instruction semantics, `tmp1`.
    Temp(String),
    /// The whole-flags pseudo-register `%flags`.
    Flags,
    /// An individual flag bit such as `%CF`.
    FlagBit(FlagBit),
    /// The program counter `%pc`. Never renamed.
    Pc,
    /// A named high-level local, only produced by the out-of-SSA post-pass.
    Local(String),
    /// An integer constant.
    Const(i64),
    /// A memory cell, `m[addr]`.
    Mem(Box<Exp>),
    /// Address arithmetic, e.g. the `r28{-} - 4` inside `m[r28{-} - 4]`.
    Op(BinOp, Box<Exp>, Box<Exp>),
    /// An SSA-subscripted location, `base{def}`.
    Ref {
        /// The location being referenced.
        base: Box<Exp>,
        /// The statement whose definition reaches this use, or `None` for
        /// the procedure-entry placeholder.
        def: Option<Stmt>,
    },
    /// The sentinel `<all>` standing for "every location", used as the
    /// stack key for in-scope childless calls.
    DefineAll,
}

assert_impl_all!(Exp: Clone, Ord, Send, Sync);

/// An ordered set of locations, the common currency of the use/def queries.
pub type LocationSet = BTreeSet<Exp>;

impl Exp {
    /// Builds `m[addr]`.
    pub fn mem(addr: Exp) -> Self {
        Self::Mem(Box::new(addr))
    }

    /// Builds a binary address computation.
    pub fn op(op: BinOp, lhs: Exp, rhs: Exp) -> Self {
        Self::Op(op, Box::new(lhs), Box::new(rhs))
    }

    /// Builds `base{def}`.
    pub fn subscripted(base: Exp, def: Option<Stmt>) -> Self {
        Self::Ref {
            base: Box::new(base),
            def,
        }
    }

    /// Checks whether this is a register.
    pub fn is_reg_of(&self) -> bool {
        matches!(self, Self::Reg(_))
    }

    /// Checks whether this is a decoder temporary.
    pub fn is_temp(&self) -> bool {
        matches!(self, Self::Temp(_))
    }

    /// Checks whether this is the whole-flags pseudo-register.
    pub fn is_flags(&self) -> bool {
        matches!(self, Self::Flags)
    }

    /// Checks whether this is an individual flag bit.
    pub fn is_main_flag(&self) -> bool {
        matches!(self, Self::FlagBit(_))
    }

    /// Checks whether this is a named high-level local.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    /// Checks whether this is a memory cell.
    pub fn is_mem_of(&self) -> bool {
        matches!(self, Self::Mem(_))
    }

    /// Checks whether this is an SSA-subscripted reference.
    pub fn is_subscript(&self) -> bool {
        matches!(self, Self::Ref { .. })
    }

    /// Strips one level of SSA subscript, if present.
    pub fn base(&self) -> &Exp {
        match self {
            Self::Ref { base, .. } => base,
            other => other,
        }
    }

    /// Collects every location this expression reads into `out`.
    ///
    /// A memory cell is itself a location, and the locations inside its
    /// address are also read. A subscripted reference is collected whole
    /// (its reaching definition is part of its identity); when it wraps a
    /// memory cell the address locations are still live and are collected
    /// too.
    pub fn used_locs(&self, out: &mut LocationSet) {
        match self {
            Self::Reg(_) | Self::Temp(_) | Self::Flags | Self::FlagBit(_) | Self::Pc
            | Self::Local(_) => {
                out.insert(self.clone());
            }
            Self::Mem(addr) => {
                out.insert(self.clone());
                addr.used_locs(out);
            }
            Self::Ref { base, .. } => {
                out.insert(self.clone());

                if let Self::Mem(addr) = base.as_ref() {
                    addr.used_locs(out);
                }
            }
            Self::Op(_, lhs, rhs) => {
                lhs.used_locs(out);
                rhs.used_locs(out);
            }
            Self::Const(_) | Self::DefineAll => {}
        }
    }

    /// Rewrites every use of the location `x` within this expression to
    /// `x{def}`, returning the rewritten expression.
    ///
    /// Occurrences inside existing subscripted references are left alone:
    /// they already carry a reaching definition.
    pub fn subscript_var(self, x: &Exp, def: Option<Stmt>) -> Exp {
        if self == *x {
            return Exp::subscripted(self, def);
        }

        match self {
            Self::Mem(addr) => Self::Mem(Box::new(addr.subscript_var(x, def))),
            Self::Op(op, lhs, rhs) => Self::Op(
                op,
                Box::new(lhs.subscript_var(x, def)),
                Box::new(rhs.subscript_var(x, def)),
            ),
            other => other,
        }
    }

    /// Replaces every occurrence of `from` (at any depth, including inside
    /// references) with `to`. Returns the rewritten expression and whether
    /// anything changed.
    pub fn search_replace(self, from: &Exp, to: &Exp) -> (Exp, bool) {
        if self == *from {
            return (to.clone(), true);
        }

        match self {
            Self::Mem(addr) => {
                let (addr, changed) = addr.search_replace(from, to);

                (Self::Mem(Box::new(addr)), changed)
            }
            Self::Op(op, lhs, rhs) => {
                let (lhs, c1) = lhs.search_replace(from, to);
                let (rhs, c2) = rhs.search_replace(from, to);

                (Self::Op(op, Box::new(lhs), Box::new(rhs)), c1 || c2)
            }
            Self::Ref { base, def } => {
                let (base, changed) = base.search_replace(from, to);

                (
                    Self::Ref {
                        base: Box::new(base),
                        def,
                    },
                    changed,
                )
            }
            other => (other, false),
        }
    }
}

impl Display for FlagBit {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Carry => write!(f, "%CF"),
            Self::Zero => write!(f, "%ZF"),
            Self::Sign => write!(f, "%SF"),
            Self::Overflow => write!(f, "%OF"),
        }
    }
}

impl Display for Exp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        use crate::arena::ArenaKey;

        match self {
            Self::Reg(n) => write!(f, "r{n}"),
            Self::Temp(name) => write!(f, "{name}"),
            Self::Flags => write!(f, "%flags"),
            Self::FlagBit(bit) => write!(f, "{bit}"),
            Self::Pc => write!(f, "%pc"),
            Self::Local(name) => write!(f, "{name}"),
            Self::Const(k) => write!(f, "{k}"),
            Self::Mem(addr) => write!(f, "m[{addr}]"),
            Self::Op(BinOp::Add, lhs, rhs) => write!(f, "{lhs} + {rhs}"),
            Self::Op(BinOp::Sub, lhs, rhs) => write!(f, "{lhs} - {rhs}"),
            Self::Ref { base, def: None } => write!(f, "{base}{{-}}"),
            Self::Ref {
                base,
                def: Some(s),
            } => write!(f, "{base}{{s{}}}", s.index()),
            Self::DefineAll => write!(f, "<all>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaKey;

    fn sp_minus(k: i64) -> Exp {
        Exp::mem(Exp::op(
            BinOp::Sub,
            Exp::subscripted(Exp::Reg(28), None),
            Exp::Const(k),
        ))
    }

    #[test]
    fn used_locs_of_memory() {
        // m[r28{-} - 4] reads the cell itself and everything inside the
        // address, including the subscripted stack pointer.
        let e = sp_minus(4);
        let mut locs = LocationSet::new();

        e.used_locs(&mut locs);

        assert!(locs.contains(&e));
        assert!(locs.contains(&Exp::subscripted(Exp::Reg(28), None)));
        assert_eq!(locs.len(), 2);
    }

    #[test]
    fn subscript_var_skips_existing_refs() {
        let s = Stmt::new(3);
        let inner = Exp::subscripted(Exp::Reg(28), None);
        let e = Exp::op(BinOp::Add, inner.clone(), Exp::Reg(24));

        // subscripting r28 must not touch r28{-}
        let out = e.clone().subscript_var(&Exp::Reg(28), Some(s));

        assert_eq!(out, e);

        let out = e.subscript_var(&Exp::Reg(24), Some(s));

        assert_eq!(
            out,
            Exp::op(BinOp::Add, inner, Exp::subscripted(Exp::Reg(24), Some(s)))
        );
    }

    #[test]
    fn subscript_var_wraps_whole_match() {
        let s = Stmt::new(0);
        let e = sp_minus(8);

        let out = e.clone().subscript_var(&e, Some(s));

        assert_eq!(out, Exp::subscripted(e, Some(s)));
    }

    #[test]
    fn display_round_trip_shapes() {
        let s = Stmt::new(5);
        let e = Exp::subscripted(sp_minus(4), Some(s));

        assert_eq!(format!("{e}"), "m[r28{-} - 4]{s5}");
        assert_eq!(format!("{}", Exp::DefineAll), "<all>");
        assert_eq!(format!("{}", Exp::FlagBit(FlagBit::Carry)), "%CF");
    }

    #[test]
    fn ordering_is_total_and_stable() {
        let mut set = LocationSet::new();

        set.insert(Exp::Reg(24));
        set.insert(Exp::Reg(8));
        set.insert(Exp::Flags);
        set.insert(sp_minus(4));

        let order: Vec<Exp> = set.iter().cloned().collect();
        let again: Vec<Exp> = set.iter().cloned().collect();

        assert_eq!(order, again);
        assert_eq!(order[0], Exp::Reg(8));
        assert_eq!(order[1], Exp::Reg(24));
    }
}
