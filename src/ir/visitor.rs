//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::ir::{Cfg, Exp, UserProc};

/// A bottom-up expression rewriter.
///
/// The default [`transform`](Self::transform) rebuilds sub-expressions first
/// and then hands the node to [`visit`](Self::visit); implementations
/// override `visit` (and occasionally [`walk_children`](Self::walk_children)
/// when they need to see a node before its children change).
pub trait ExpTransformer {
    /// Rewrites `e`, children first.
    fn transform(&mut self, e: Exp) -> Exp {
        let e = self.walk_children(e);

        self.visit(e)
    }

    /// Rebuilds `e` with transformed children.
    fn walk_children(&mut self, e: Exp) -> Exp {
        match e {
            Exp::Mem(addr) => Exp::Mem(Box::new(self.transform(*addr))),
            Exp::Op(op, lhs, rhs) => Exp::Op(
                op,
                Box::new(self.transform(*lhs)),
                Box::new(self.transform(*rhs)),
            ),
            Exp::Ref { base, def } => Exp::Ref {
                base: Box::new(self.transform(*base)),
                def,
            },
            other => other,
        }
    }

    /// Rewrites one node whose children have already been rewritten.
    fn visit(&mut self, e: Exp) -> Exp {
        e
    }
}

/// Rewrites procedure-entry placeholders `e{-}` into references to the
/// entry block's implicit assignments, `e{implicit}`.
///
/// Run once the IR has stopped rewriting memory expressions; afterwards the
/// keyed collections of the dataflow state must be re-keyed through this
/// same transform (see
/// [`DataFlow::convert_implicits`](crate::ssa::DataFlow::convert_implicits)).
pub struct ImplicitConverter<'c> {
    cfg: &'c mut Cfg,
}

impl<'c> ImplicitConverter<'c> {
    /// Creates a converter that materialises implicit assignments in `cfg`.
    pub fn new(cfg: &'c mut Cfg) -> Self {
        Self { cfg }
    }
}

impl ExpTransformer for ImplicitConverter<'_> {
    fn visit(&mut self, e: Exp) -> Exp {
        match e {
            Exp::Ref { base, def: None } => {
                let def = Some(self.cfg.find_implicit_assign(&base));

                Exp::Ref { base, def }
            }
            other => other,
        }
    }
}

/// Strips SSA subscripts, mapping each referenced location back to its
/// recovered local name when the procedure's symbol map has one.
pub struct SsaStripper<'p> {
    proc: &'p UserProc,
}

impl<'p> SsaStripper<'p> {
    /// Creates a stripper using `proc`'s symbol map.
    pub fn new(proc: &'p UserProc) -> Self {
        Self { proc }
    }
}

impl ExpTransformer for SsaStripper<'_> {
    // References are handled whole in `visit`: the symbol map is keyed by
    // locations as they appear in SSA, so the base must not be rewritten
    // before lookup.
    fn walk_children(&mut self, e: Exp) -> Exp {
        match e {
            Exp::Mem(addr) => Exp::Mem(Box::new(self.transform(*addr))),
            Exp::Op(op, lhs, rhs) => Exp::Op(
                op,
                Box::new(self.transform(*lhs)),
                Box::new(self.transform(*rhs)),
            ),
            other => other,
        }
    }

    fn visit(&mut self, e: Exp) -> Exp {
        match e {
            Exp::Ref { base, .. } => {
                if let Some(name) = self.proc.sym_for_exp(&base) {
                    return Exp::Local(name.to_string());
                }

                self.transform(*base)
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::BinOp;

    fn sp_local() -> Exp {
        Exp::mem(Exp::op(
            BinOp::Sub,
            Exp::subscripted(Exp::Reg(28), None),
            Exp::Const(4),
        ))
    }

    #[test]
    fn implicit_converter_rewrites_placeholders() {
        let mut cfg = Cfg::new();
        let _ = cfg.new_block();

        let e = Exp::subscripted(sp_local(), None);
        let out = ImplicitConverter::new(&mut cfg).transform(e);

        // both the outer {-} and the inner r28{-} now point at implicit
        // assignments in the entry block
        match out {
            Exp::Ref {
                def: Some(_), base, ..
            } => match *base {
                Exp::Mem(addr) => match *addr {
                    Exp::Op(_, inner, _) => {
                        assert!(matches!(*inner, Exp::Ref { def: Some(_), .. }));
                    }
                    _ => unreachable!(),
                },
                _ => unreachable!(),
            },
            _ => unreachable!("expected a converted reference"),
        }
    }

    #[test]
    fn stripper_prefers_symbol_names() {
        let mut proc = UserProc::new("main", 28);

        proc.map_symbol("x", sp_local());

        let wrapped = Exp::subscripted(sp_local(), None);
        let out = SsaStripper::new(&proc).transform(wrapped);

        assert_eq!(out, Exp::Local("x".to_string()));
    }

    #[test]
    fn stripper_falls_back_to_base() {
        let proc = UserProc::new("main", 28);

        let wrapped = Exp::subscripted(Exp::Reg(24), None);
        let out = SsaStripper::new(&proc).transform(wrapped);

        assert_eq!(out, Exp::Reg(24));

        // nested references inside the base are stripped too
        let nested = Exp::subscripted(sp_local(), None);
        let out = SsaStripper::new(&proc).transform(nested);

        assert_eq!(
            out,
            Exp::mem(Exp::op(BinOp::Sub, Exp::Reg(28), Exp::Const(4)))
        );
    }
}
