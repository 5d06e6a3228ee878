//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::dense_arena_key;
use crate::ir::{Block, Exp, LocationSet};
use crate::ssa::{DefCollector, UseCollector};
use std::fmt::{self, Display, Formatter};

dense_arena_key! {
    /// References a single statement in the procedure's statement arena.
    ///
    /// Statement keys are what SSA subscripts point at: `r24{s3}` means "the
    /// value of `r24` defined by statement `s3`".
    pub struct Stmt;
}

// subscripts live inside ordered expression keys, so statement references
// must stay plain ordered integers
static_assertions::assert_impl_all!(Stmt: Copy, Ord, std::hash::Hash);

/// A plain assignment, `lhs := rhs`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Assign {
    /// The location being defined.
    pub lhs: Exp,
    /// The value assigned to it.
    pub rhs: Exp,
}

/// One incoming value of a φ-assignment.
///
/// The contributing predecessor block is recorded so later passes can match
/// operands to in-edges even after edges are reordered.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PhiOperand {
    /// The predecessor block this operand flows in from.
    pub pred: Block,
    /// The location the operand refers to.
    pub base: Exp,
    /// The statement defining that location on this edge, or `None` when no
    /// definition reaches the edge.
    pub def: Option<Stmt>,
}

/// A φ-assignment at a join point, `lhs := φ(...)`.
///
/// Placed trivially (with no operands) by φ-placement; the renaming walk
/// fills in one operand per predecessor edge.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PhiAssign {
    lhs: Exp,
    operands: Vec<PhiOperand>,
}

impl PhiAssign {
    /// Creates a trivial φ-assignment for `lhs` with no operands yet.
    pub fn new(lhs: Exp) -> Self {
        Self {
            lhs,
            operands: Vec::new(),
        }
    }

    /// The location this φ defines.
    pub fn lhs(&self) -> &Exp {
        &self.lhs
    }

    /// The operands filled in so far, one per renamed predecessor edge.
    pub fn operands(&self) -> &[PhiOperand] {
        &self.operands
    }

    /// Sets the operand contributed by the edge from `pred`, replacing any
    /// operand previously recorded for that edge.
    pub fn put_at(&mut self, pred: Block, def: Option<Stmt>, base: Exp) {
        match self.operands.iter_mut().find(|op| op.pred == pred) {
            Some(op) => {
                op.base = base;
                op.def = def;
            }
            None => self.operands.push(PhiOperand { pred, base, def }),
        }
    }

    /// Rewrites uses of `x` inside the lhs's address computation (for a φ
    /// defining a memory cell). The lhs location itself is a definition, not
    /// a use, so it is never wrapped.
    pub fn subscript_lhs_address(&mut self, x: &Exp, def: Option<Stmt>) {
        if let Exp::Mem(addr) = &mut self.lhs {
            *addr = Box::new(addr.as_ref().clone().subscript_var(x, def));
        }
    }
}

/// A call statement.
///
/// A call is *childless* when its callee has not been analysed yet; such a
/// call conservatively defines every location. Calls carry two collectors:
/// the [`DefCollector`] snapshots the definitions reaching the call, and the
/// [`UseCollector`] records locations the callee may use before defining.
#[derive(Clone, Debug)]
pub struct CallStatement {
    callee: String,
    childless: bool,
    arguments: Vec<Exp>,
    defines: Vec<Exp>,
    def_collector: DefCollector,
    use_collector: UseCollector,
}

impl CallStatement {
    /// Creates a call to an analysed callee with no arguments or defines yet.
    pub fn new(callee: impl Into<String>) -> Self {
        Self {
            callee: callee.into(),
            childless: false,
            arguments: Vec::new(),
            defines: Vec::new(),
            def_collector: DefCollector::new(),
            use_collector: UseCollector::new(),
        }
    }

    /// Creates a childless call, one whose callee is not yet analysed.
    pub fn childless(callee: impl Into<String>) -> Self {
        Self {
            childless: true,
            ..Self::new(callee)
        }
    }

    /// The name of the callee.
    pub fn callee(&self) -> &str {
        &self.callee
    }

    /// Whether the callee has not been analysed (a define-all site).
    pub fn is_childless(&self) -> bool {
        self.childless
    }

    /// Appends an argument expression.
    pub fn push_argument(&mut self, arg: Exp) {
        self.arguments.push(arg);
    }

    /// The argument expressions.
    pub fn arguments(&self) -> &[Exp] {
        &self.arguments
    }

    /// Adds a location this call is known to define.
    pub fn push_define(&mut self, loc: Exp) {
        self.defines.push(loc);
    }

    /// The locations this call is known to define.
    pub fn defines(&self) -> &[Exp] {
        &self.defines
    }

    /// The definitions reaching this call.
    pub fn def_collector(&self) -> &DefCollector {
        &self.def_collector
    }

    /// Mutable access to the reaching-definitions collector.
    pub fn def_collector_mut(&mut self) -> &mut DefCollector {
        &mut self.def_collector
    }

    /// Records that `e` is used at (or through) this call before any
    /// definition of it is known.
    pub fn use_before_define(&mut self, e: Exp) {
        self.use_collector.insert(e);
    }

    /// The locations used before definition at this call.
    pub fn use_collector(&self) -> &UseCollector {
        &self.use_collector
    }

    /// Mutable access to the use collector.
    pub fn use_collector_mut(&mut self) -> &mut UseCollector {
        &mut self.use_collector
    }
}

/// A return statement, carrying the definitions that reach procedure exit.
#[derive(Clone, Debug)]
pub struct ReturnStatement {
    values: Vec<Exp>,
    collector: DefCollector,
}

impl ReturnStatement {
    /// Creates a return with no returned values yet.
    pub fn new() -> Self {
        Self {
            values: Vec::new(),
            collector: DefCollector::new(),
        }
    }

    /// Appends a returned value expression.
    pub fn push_value(&mut self, value: Exp) {
        self.values.push(value);
    }

    /// The returned value expressions.
    pub fn values(&self) -> &[Exp] {
        &self.values
    }

    /// The definitions reaching this return.
    pub fn collector(&self) -> &DefCollector {
        &self.collector
    }

    /// Mutable access to the reaching-definitions collector.
    pub fn collector_mut(&mut self) -> &mut DefCollector {
        &mut self.collector
    }
}

impl Default for ReturnStatement {
    fn default() -> Self {
        Self::new()
    }
}

/// The different kinds of statement in the IR.
#[derive(Clone, Debug)]
pub enum StatementKind {
    /// A plain assignment.
    Assign(Assign),
    /// A φ-assignment at a join point.
    Phi(PhiAssign),
    /// An implicit definition at procedure entry, `lhs := -`.
    Implicit(Exp),
    /// A call.
    Call(CallStatement),
    /// A return.
    Ret(ReturnStatement),
    /// A (possibly conditional) branch. Edges live on the blocks; the
    /// statement only contributes the condition's uses.
    Branch(Exp),
}

/// A statement stored in the procedure's statement arena.
///
/// Besides its kind, a statement carries the dominance number assigned by
/// [`DataFlow::set_dominance_nums`](crate::ssa::DataFlow::set_dominance_nums),
/// which later passes use to order statements by dominator-tree pre-order.
#[derive(Clone, Debug)]
pub struct Statement {
    kind: StatementKind,
    dom_number: i32,
}

impl Statement {
    /// Wraps a statement kind with an unset dominance number.
    pub fn new(kind: StatementKind) -> Self {
        Self {
            kind,
            dom_number: -1,
        }
    }

    /// Builds `lhs := rhs`.
    pub fn assign(lhs: Exp, rhs: Exp) -> Self {
        Self::new(StatementKind::Assign(Assign { lhs, rhs }))
    }

    /// Builds a trivial φ-assignment for `lhs`.
    pub fn phi(lhs: Exp) -> Self {
        Self::new(StatementKind::Phi(PhiAssign::new(lhs)))
    }

    /// Builds an implicit procedure-entry definition of `lhs`.
    pub fn implicit(lhs: Exp) -> Self {
        Self::new(StatementKind::Implicit(lhs))
    }

    /// Builds a call statement.
    pub fn call(call: CallStatement) -> Self {
        Self::new(StatementKind::Call(call))
    }

    /// Builds a return statement.
    pub fn ret(ret: ReturnStatement) -> Self {
        Self::new(StatementKind::Ret(ret))
    }

    /// Builds a branch on `cond`.
    pub fn branch(cond: Exp) -> Self {
        Self::new(StatementKind::Branch(cond))
    }

    /// The statement's kind.
    pub fn kind(&self) -> &StatementKind {
        &self.kind
    }

    /// Mutable access to the statement's kind.
    pub fn kind_mut(&mut self) -> &mut StatementKind {
        &mut self.kind
    }

    /// The dominance number, or `-1` if none has been assigned.
    pub fn dom_number(&self) -> i32 {
        self.dom_number
    }

    /// Sets the dominance number.
    pub fn set_dom_number(&mut self, num: i32) {
        self.dom_number = num;
    }

    /// Checks whether this is a φ-assignment.
    pub fn is_phi(&self) -> bool {
        matches!(self.kind, StatementKind::Phi(_))
    }

    /// Checks whether this is a call.
    pub fn is_call(&self) -> bool {
        matches!(self.kind, StatementKind::Call(_))
    }

    /// Checks whether this is a return.
    pub fn is_return(&self) -> bool {
        matches!(self.kind, StatementKind::Ret(_))
    }

    /// Views this statement as a φ-assignment.
    pub fn as_phi(&self) -> Option<&PhiAssign> {
        match &self.kind {
            StatementKind::Phi(phi) => Some(phi),
            _ => None,
        }
    }

    /// Mutable variant of [`Self::as_phi`].
    pub fn as_phi_mut(&mut self) -> Option<&mut PhiAssign> {
        match &mut self.kind {
            StatementKind::Phi(phi) => Some(phi),
            _ => None,
        }
    }

    /// Views this statement as a call.
    pub fn as_call(&self) -> Option<&CallStatement> {
        match &self.kind {
            StatementKind::Call(call) => Some(call),
            _ => None,
        }
    }

    /// Mutable variant of [`Self::as_call`].
    pub fn as_call_mut(&mut self) -> Option<&mut CallStatement> {
        match &mut self.kind {
            StatementKind::Call(call) => Some(call),
            _ => None,
        }
    }

    /// Views this statement as a return.
    pub fn as_ret(&self) -> Option<&ReturnStatement> {
        match &self.kind {
            StatementKind::Ret(ret) => Some(ret),
            _ => None,
        }
    }

    /// Mutable variant of [`Self::as_ret`].
    pub fn as_ret_mut(&mut self) -> Option<&mut ReturnStatement> {
        match &mut self.kind {
            StatementKind::Ret(ret) => Some(ret),
            _ => None,
        }
    }

    /// Collects the locations this statement defines into `out`.
    pub fn definitions(&self, out: &mut LocationSet) {
        match &self.kind {
            StatementKind::Assign(a) => {
                out.insert(a.lhs.clone());
            }
            StatementKind::Phi(phi) => {
                out.insert(phi.lhs.clone());
            }
            StatementKind::Implicit(lhs) => {
                out.insert(lhs.clone());
            }
            StatementKind::Call(call) => {
                out.extend(call.defines.iter().cloned());
            }
            StatementKind::Ret(_) | StatementKind::Branch(_) => {}
        }
    }

    /// Collects the locations this statement uses into `out`.
    ///
    /// Defining `m[a]` *uses* the locations inside `a`; a φ uses each of its
    /// operands as a subscripted reference.
    pub fn used_locs(&self, out: &mut LocationSet) {
        match &self.kind {
            StatementKind::Assign(a) => {
                a.rhs.used_locs(out);
                lhs_address_uses(&a.lhs, out);
            }
            StatementKind::Phi(phi) => {
                lhs_address_uses(&phi.lhs, out);

                for op in &phi.operands {
                    out.insert(Exp::subscripted(op.base.clone(), op.def));
                }
            }
            StatementKind::Implicit(_) => {}
            StatementKind::Call(call) => {
                for arg in &call.arguments {
                    arg.used_locs(out);
                }
            }
            StatementKind::Ret(ret) => {
                for value in &ret.values {
                    value.used_locs(out);
                }
            }
            StatementKind::Branch(cond) => cond.used_locs(out),
        }
    }

    /// Rewrites every use of `x` in this statement to `x{def}`.
    ///
    /// Definitions are left alone except for the address computation of a
    /// memory lhs, which is a use like any other.
    pub fn subscript_var(&mut self, x: &Exp, def: Option<Stmt>) {
        match &mut self.kind {
            StatementKind::Assign(a) => {
                a.rhs = a.rhs.clone().subscript_var(x, def);

                if let Exp::Mem(addr) = &mut a.lhs {
                    *addr = Box::new(addr.as_ref().clone().subscript_var(x, def));
                }
            }
            StatementKind::Phi(phi) => phi.subscript_lhs_address(x, def),
            StatementKind::Implicit(_) => {}
            StatementKind::Call(call) => {
                for arg in &mut call.arguments {
                    *arg = arg.clone().subscript_var(x, def);
                }
            }
            StatementKind::Ret(ret) => {
                for value in &mut ret.values {
                    *value = value.clone().subscript_var(x, def);
                }
            }
            StatementKind::Branch(cond) => {
                *cond = cond.clone().subscript_var(x, def);
            }
        }
    }
}

fn lhs_address_uses(lhs: &Exp, out: &mut LocationSet) {
    match lhs {
        Exp::Mem(addr) => addr.used_locs(out),
        Exp::Ref { base, .. } => {
            if let Exp::Mem(addr) = base.as_ref() {
                addr.used_locs(out);
            }
        }
        _ => {}
    }
}

impl Display for Statement {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        use crate::arena::ArenaKey;

        match &self.kind {
            StatementKind::Assign(a) => write!(f, "{} := {}", a.lhs, a.rhs),
            StatementKind::Phi(phi) => {
                write!(f, "{} := φ(", phi.lhs)?;

                for (i, op) in phi.operands.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }

                    match op.def {
                        Some(s) => write!(f, "{}{{s{}}}", op.base, s.index())?,
                        None => write!(f, "{}{{-}}", op.base)?,
                    }
                }

                write!(f, ")")
            }
            StatementKind::Implicit(lhs) => write!(f, "{lhs} := -"),
            StatementKind::Call(call) => {
                write!(f, "call {}(", call.callee)?;

                for (i, arg) in call.arguments.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }

                    write!(f, "{arg}")?;
                }

                write!(f, ")")
            }
            StatementKind::Ret(ret) => {
                write!(f, "ret")?;

                for (i, value) in ret.values.iter().enumerate() {
                    write!(f, "{} {value}", if i == 0 { "" } else { "," })?;
                }

                Ok(())
            }
            StatementKind::Branch(cond) => write!(f, "branch {cond}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaKey;
    use crate::ir::BinOp;

    #[test]
    fn assign_defs_and_uses() {
        let s = Statement::assign(
            Exp::Reg(24),
            Exp::op(BinOp::Add, Exp::Reg(24), Exp::Const(1)),
        );

        let mut defs = LocationSet::new();
        let mut uses = LocationSet::new();

        s.definitions(&mut defs);
        s.used_locs(&mut uses);

        assert!(defs.contains(&Exp::Reg(24)));
        assert_eq!(defs.len(), 1);
        assert!(uses.contains(&Exp::Reg(24)));
        assert_eq!(uses.len(), 1);
    }

    #[test]
    fn memory_lhs_contributes_address_uses() {
        // m[r28 - 4] := r24 defines the cell but uses r28 and r24
        let s = Statement::assign(
            Exp::mem(Exp::op(BinOp::Sub, Exp::Reg(28), Exp::Const(4))),
            Exp::Reg(24),
        );

        let mut defs = LocationSet::new();
        let mut uses = LocationSet::new();

        s.definitions(&mut defs);
        s.used_locs(&mut uses);

        assert_eq!(defs.len(), 1);
        assert!(uses.contains(&Exp::Reg(28)));
        assert!(uses.contains(&Exp::Reg(24)));
        assert!(!uses.contains(&Exp::Reg(0)));
    }

    #[test]
    fn put_at_replaces_by_pred() {
        let b0 = Block::new(0);
        let s0 = Stmt::new(0);
        let s1 = Stmt::new(1);
        let mut phi = PhiAssign::new(Exp::Reg(8));

        phi.put_at(b0, Some(s0), Exp::Reg(8));
        phi.put_at(b0, Some(s1), Exp::Reg(8));

        assert_eq!(phi.operands().len(), 1);
        assert_eq!(phi.operands()[0].def, Some(s1));
    }

    #[test]
    fn subscripting_skips_defined_location() {
        let d = Stmt::new(7);
        let mut s = Statement::assign(Exp::Reg(24), Exp::Reg(24));

        s.subscript_var(&Exp::Reg(24), Some(d));

        match s.kind() {
            StatementKind::Assign(a) => {
                assert_eq!(a.lhs, Exp::Reg(24));
                assert_eq!(a.rhs, Exp::subscripted(Exp::Reg(24), Some(d)));
            }
            _ => unreachable!(),
        }
    }
}
