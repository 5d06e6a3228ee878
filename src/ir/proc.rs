//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::ir::{BinOp, Cfg, Exp, LocationSet, RegNum};
use crate::ssa::UseCollector;
use std::collections::BTreeMap;

/// Driver-supplied knobs that the analysis reads but never writes.
#[derive(Copy, Clone, Debug, Default)]
pub struct DecompileSettings {
    /// When set, the driver trusts the target ABI: a childless call is
    /// assumed to respect calling conventions, so it no longer acts as a
    /// definition of every location.
    pub assume_abi: bool,
}

/// A procedure being decompiled.
///
/// Owns the control-flow graph and the bits of per-procedure knowledge the
/// dataflow core consults: the stack-pointer register (for recognising the
/// local/parameter pattern `m[sp{-} ± k]`), the symbol map from recovered
/// local names to the locations they stand for, the set of locals whose
/// address escapes, and the procedure-level use collector that accumulates
/// locations read before any definition is known.
pub struct UserProc {
    name: String,
    cfg: Cfg,
    sp: RegNum,
    symbols: BTreeMap<String, Exp>,
    escaped: LocationSet,
    col: UseCollector,
    settings: DecompileSettings,
}

impl UserProc {
    /// Creates a procedure with an empty CFG. `sp` is the number of the
    /// stack-pointer register on the source architecture.
    pub fn new(name: impl Into<String>, sp: RegNum) -> Self {
        Self {
            name: name.into(),
            cfg: Cfg::new(),
            sp,
            symbols: BTreeMap::new(),
            escaped: LocationSet::new(),
            col: UseCollector::new(),
            settings: DecompileSettings::default(),
        }
    }

    /// The procedure's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The control-flow graph.
    pub fn cfg(&self) -> &Cfg {
        &self.cfg
    }

    /// Mutable access to the control-flow graph.
    pub fn cfg_mut(&mut self) -> &mut Cfg {
        &mut self.cfg
    }

    /// The driver-supplied settings.
    pub fn settings(&self) -> DecompileSettings {
        self.settings
    }

    /// Mutable access to the driver-supplied settings.
    pub fn settings_mut(&mut self) -> &mut DecompileSettings {
        &mut self.settings
    }

    /// Records that the local name `name` stands for the location `e`.
    pub fn map_symbol(&mut self, name: impl Into<String>, e: Exp) {
        self.symbols.insert(name.into(), e);
    }

    /// The location a recovered local name stands for, if any.
    pub fn exp_from_symbol(&self, name: &str) -> Option<&Exp> {
        self.symbols.get(name)
    }

    /// The local name that stands for the location `e`, if any. Names are
    /// searched in sorted order so the answer is deterministic.
    pub fn sym_for_exp(&self, e: &Exp) -> Option<&str> {
        self.symbols
            .iter()
            .find(|(_, mapped)| *mapped == e)
            .map(|(name, _)| name.as_str())
    }

    /// Marks the variable `e` as having its address escape the procedure.
    pub fn mark_address_escaped(&mut self, e: Exp) {
        self.escaped.insert(e);
    }

    /// Whether the address of `e` escapes the procedure. An escaped
    /// variable can be written through unknown pointers, so it is never
    /// safe to rename.
    pub fn is_address_escaped_var(&self, e: &Exp) -> bool {
        self.escaped.contains(e)
    }

    /// Whether `e` matches the procedure's local-or-parameter pattern:
    /// a memory cell addressed at a constant offset from the value the
    /// stack pointer had on entry, `m[sp{-}]` or `m[sp{-} ± k]`.
    pub fn is_local_or_param_pattern(&self, e: &Exp) -> bool {
        let sp = Exp::subscripted(Exp::Reg(self.sp), None);

        match e {
            Exp::Mem(addr) => match addr.as_ref() {
                Exp::Op(BinOp::Add | BinOp::Sub, base, off) => {
                    **base == sp && matches!(off.as_ref(), Exp::Const(_))
                }
                other => *other == sp,
            },
            _ => false,
        }
    }

    /// Records that `e` is used in this procedure before any definition of
    /// it is known; it will be resolved as an implicit parameter later.
    pub fn use_before_define(&mut self, e: Exp) {
        self.col.insert(e);
    }

    /// The procedure-level use collector.
    pub fn use_collector(&self) -> &UseCollector {
        &self.col
    }

    /// Mutable access to the procedure-level use collector.
    pub fn use_collector_mut(&mut self) -> &mut UseCollector {
        &mut self.col
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(sp: RegNum, off: i64) -> Exp {
        Exp::mem(Exp::op(
            BinOp::Sub,
            Exp::subscripted(Exp::Reg(sp), None),
            Exp::Const(off),
        ))
    }

    #[test]
    fn local_or_param_pattern() {
        let proc = UserProc::new("main", 28);

        assert!(proc.is_local_or_param_pattern(&local(28, 4)));
        assert!(proc.is_local_or_param_pattern(&Exp::mem(Exp::subscripted(
            Exp::Reg(28),
            None
        ))));

        // wrong base register, unsubscripted sp, and non-constant offsets
        // all fall outside the pattern
        assert!(!proc.is_local_or_param_pattern(&local(29, 4)));
        assert!(!proc.is_local_or_param_pattern(&Exp::mem(Exp::Reg(28))));
        assert!(!proc.is_local_or_param_pattern(&Exp::mem(Exp::op(
            BinOp::Add,
            Exp::subscripted(Exp::Reg(28), None),
            Exp::Reg(0),
        ))));
        assert!(!proc.is_local_or_param_pattern(&Exp::Reg(28)));
    }

    #[test]
    fn symbols_map_both_ways() {
        let mut proc = UserProc::new("main", 28);
        let x = local(28, 4);

        proc.map_symbol("x", x.clone());

        assert_eq!(proc.exp_from_symbol("x"), Some(&x));
        assert_eq!(proc.sym_for_exp(&x), Some("x"));
        assert_eq!(proc.sym_for_exp(&Exp::Reg(0)), None);
    }
}
