//! The instrumentation pass.
//!
//! The heart of the tool: every translated block is rewritten so the model
//! observes the guest's stores, flushes, and fences. Uninteresting statements
//! are copied straight through; after each interesting one a callback hook is
//! appended. Store values are widened to a full machine word, wide vector
//! stores are split into word-sized lane callbacks at the correct byte
//! offsets, and CAS callbacks are guarded so only successful swaps are
//! recorded.

use tracing::warn;

use crate::common::constants::MAX_STORE_BYTES;
use crate::instr::ir::{
    BarrierKind, BinOp, Endness, FlushKind, Hook, IntWidth, IrBlock, IrConst, IrExpr, IrStmt,
    IrType, UnOp,
};

/// Instruments one translated block, returning the augmented block.
///
/// # Panics
///
/// Panics on a guest/host word-type mismatch or a non-64-bit word; neither
/// target shape is supported.
pub fn instrument(block: &IrBlock, guest_word: IrType, host_word: IrType) -> IrBlock {
    assert!(
        guest_word == host_word,
        "host/guest word size mismatch"
    );
    assert!(guest_word == IrType::I64, "only 64-bit guests are supported");

    let mut out = IrBlock {
        tyenv: block.tyenv.clone(),
        stmts: Vec::with_capacity(block.stmts.len() * 2),
        endness: block.endness,
    };

    // Any IR preamble preceding the first instruction mark is copied verbatim.
    let mut index = 0;
    while index < block.stmts.len() && !matches!(block.stmts[index], IrStmt::IMark { .. }) {
        out.push(block.stmts[index].clone());
        index += 1;
    }

    out.push(IrStmt::Hook(Hook::BlockEntered));

    for stmt in &block.stmts[index..] {
        match stmt {
            IrStmt::NoOp => {}

            IrStmt::IMark { .. }
            | IrStmt::AbiHint
            | IrStmt::Put { .. }
            | IrStmt::PutI { .. }
            | IrStmt::WrTmp { .. }
            | IrStmt::LoadG { .. }
            | IrStmt::Exit { .. }
            | IrStmt::Dirty => out.push(stmt.clone()),

            IrStmt::Flush { addr, kind } => {
                out.push(stmt.clone());
                let hook = match kind {
                    FlushKind::Ordered => Hook::FlushFence { addr: addr.clone() },
                    FlushKind::Unordered => Hook::Flush { addr: addr.clone() },
                };
                out.push(IrStmt::Hook(hook));
            }

            IrStmt::Barrier { kind } => {
                out.push(stmt.clone());
                if matches!(kind, BarrierKind::Full | BarrierKind::Store) {
                    out.push(IrStmt::Hook(Hook::Fence));
                }
            }

            IrStmt::Store { addr, data } => {
                out.push(stmt.clone());
                let size = out.type_of(data).size_bytes();
                add_store_hook(&mut out, addr.clone(), size, None, data.clone());
            }

            IrStmt::StoreG { addr, data, guard } => {
                out.push(stmt.clone());
                let size = out.type_of(data).size_bytes();
                add_store_hook(&mut out, addr.clone(), size, Some(guard.clone()), data.clone());
            }

            IrStmt::Cas {
                addr,
                expd_lo,
                data_lo,
                old_lo,
                expd_hi,
                data_hi,
                old_hi,
            } => {
                let size = out.type_of(data_lo).size_bytes();
                let width = IntWidth::from_type(out.type_of(expd_lo))
                    .unwrap_or_else(|| panic!("unsupported CAS width"));
                // The original statement goes in before its guard is built.
                out.push(stmt.clone());

                if let (Some(expd_hi), Some(data_hi), Some(old_hi)) = (expd_hi, data_hi, old_hi) {
                    let x_hi = make_expr(
                        &mut out,
                        IrExpr::Binop(
                            BinOp::Xor(width),
                            Box::new(expd_hi.clone()),
                            Box::new(IrExpr::Temp(*old_hi)),
                        ),
                    );
                    let x_lo = make_expr(
                        &mut out,
                        IrExpr::Binop(
                            BinOp::Xor(width),
                            Box::new(expd_lo.clone()),
                            Box::new(IrExpr::Temp(*old_lo)),
                        ),
                    );
                    let x_hl = make_expr(
                        &mut out,
                        IrExpr::Binop(BinOp::Or(width), Box::new(x_hi), Box::new(x_lo)),
                    );
                    let guard = make_expr(
                        &mut out,
                        IrExpr::Binop(
                            BinOp::CasCmpEq(width),
                            Box::new(x_hl),
                            Box::new(IrExpr::Const(width.zero())),
                        ),
                    );
                    add_store_hook(&mut out, addr.clone(), size, Some(guard.clone()), data_lo.clone());
                    let hi_addr = make_expr(
                        &mut out,
                        IrExpr::Binop(
                            BinOp::Add64,
                            Box::new(addr.clone()),
                            Box::new(IrExpr::Const(IrConst::U64(size))),
                        ),
                    );
                    add_store_hook(&mut out, hi_addr, size, Some(guard), data_hi.clone());
                } else {
                    let guard = make_expr(
                        &mut out,
                        IrExpr::Binop(
                            BinOp::CasCmpEq(width),
                            Box::new(expd_lo.clone()),
                            Box::new(IrExpr::Temp(*old_lo)),
                        ),
                    );
                    add_store_hook(&mut out, addr.clone(), size, Some(guard), data_lo.clone());
                }
            }

            IrStmt::Llsc {
                addr, store_data, ..
            } => {
                out.push(stmt.clone());
                if let Some(data) = store_data {
                    let size = out.type_of(data).size_bytes();
                    add_store_hook(&mut out, addr.clone(), size, None, data.clone());
                }
            }

            IrStmt::Hook(_) => panic!("hook statement in an untranslated block"),
        }
    }

    out
}

/// Appends a store hook, widening the value to a machine word.
///
/// Vector values are split into word-sized lanes; value shapes the model
/// cannot widen are skipped with a warning.
fn add_store_hook(out: &mut IrBlock, addr: IrExpr, size: u64, guard: Option<IrExpr>, value: IrExpr) {
    assert!(
        size >= 1 && size <= MAX_STORE_BYTES,
        "store of {size} bytes has no IR value shape"
    );
    if let IrExpr::Const(c) = &value {
        let widened = IrExpr::Const(IrConst::U64(c.widen()));
        out.push(IrStmt::Hook(Hook::Store {
            addr,
            size,
            value: widened,
            guard,
        }));
        return;
    }

    let ty = out.type_of(&value);
    match ty {
        IrType::I64 => out.push(IrStmt::Hook(Hook::Store {
            addr,
            size,
            value,
            guard,
        })),
        IrType::F64 => {
            let widened = make_expr(out, IrExpr::Unop(UnOp::ReinterpF64AsI64, Box::new(value)));
            out.push(IrStmt::Hook(Hook::Store {
                addr,
                size,
                value: widened,
                guard,
            }));
        }
        IrType::I1 | IrType::I8 | IrType::I16 | IrType::I32 => {
            let op = match ty {
                IrType::I1 => UnOp::Widen1To64,
                IrType::I8 => UnOp::Widen8To64,
                IrType::I16 => UnOp::Widen16To64,
                _ => UnOp::Widen32To64,
            };
            let widened = make_expr(out, IrExpr::Unop(op, Box::new(value)));
            out.push(IrStmt::Hook(Hook::Store {
                addr,
                size,
                value: widened,
                guard,
            }));
        }
        IrType::V128 => add_wide_store_hooks(out, addr, size, guard, value, 2),
        IrType::V256 => add_wide_store_hooks(out, addr, size, guard, value, 4),
        IrType::F32 => warn!("unable to trace store - unsupported type of store {ty:?}"),
    }
}

/// Splits a vector store into word-sized lane hooks at their byte offsets.
fn add_wide_store_hooks(
    out: &mut IrBlock,
    addr: IrExpr,
    size: u64,
    guard: Option<IrExpr>,
    value: IrExpr,
    parts: u64,
) {
    for lane in 0..parts {
        let offset = match out.endness {
            Endness::Little => 8 * lane,
            Endness::Big => 8 * (parts - 1 - lane),
        };
        let lane_addr = make_expr(
            out,
            IrExpr::Binop(
                BinOp::Add64,
                Box::new(addr.clone()),
                Box::new(IrExpr::Const(IrConst::U64(offset))),
            ),
        );
        let lane_op = if parts == 2 {
            UnOp::V128To64Lane(lane as u8)
        } else {
            UnOp::V256To64Lane(lane as u8)
        };
        let lane_value = make_expr(out, IrExpr::Unop(lane_op, Box::new(value.clone())));
        out.push(IrStmt::Hook(Hook::Store {
            addr: lane_addr,
            size: size / parts,
            value: lane_value,
            guard: guard.clone(),
        }));
    }
}

/// Flattens an expression into a fresh temporary, returning its read.
fn make_expr(out: &mut IrBlock, expr: IrExpr) -> IrExpr {
    let ty = out.type_of(&expr);
    let tmp = out.new_temp(ty);
    out.push(IrStmt::WrTmp { tmp, expr });
    IrExpr::Temp(tmp)
}
