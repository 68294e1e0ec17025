//! Guest-IR model and the instrumentation pass.
//!
//! The host framework hands the tool every translated block of guest IR and
//! expects an augmented block back. This module provides:
//! 1. **IR model:** The statement/expression sum types forming the
//!    instrumentation contract with the host.
//! 2. **Pass:** The rewrite that copies original statements verbatim and
//!    inserts store/flush/fence callback hooks after the interesting ones.

/// IR statement and expression types.
pub mod ir;

/// The instrumentation pass.
pub mod pass;

pub use ir::{
    BarrierKind, BinOp, Endness, FlushKind, Hook, IntWidth, IrBlock, IrConst, IrExpr, IrStmt,
    IrTemp, IrType, UnOp,
};
pub use pass::instrument;
