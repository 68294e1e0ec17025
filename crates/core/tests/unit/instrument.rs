//! Instrumentation-pass unit tests.
//!
//! Feeds hand-built IR blocks through the pass and checks the augmented
//! output: verbatim copies, the block-entry counter, widened store hooks,
//! vector lane splitting with correct byte offsets, CAS guards, and the
//! flush/fence hook selection.

use rstest::rstest;

use pmat_core::instr::{
    BarrierKind, BinOp, Endness, FlushKind, Hook, IntWidth, IrBlock, IrConst, IrExpr, IrStmt,
    IrType, UnOp, instrument,
};

/// Builds a little-endian block with one temp per type in `temps`.
fn block(temps: &[IrType]) -> IrBlock {
    let mut block = IrBlock::new(Endness::Little);
    for &ty in temps {
        let _ = block.new_temp(ty);
    }
    block
}

/// Collects the hooks of an instrumented block in order.
fn hooks(out: &IrBlock) -> Vec<&Hook> {
    out.stmts
        .iter()
        .filter_map(|stmt| match stmt {
            IrStmt::Hook(hook) => Some(hook),
            _ => None,
        })
        .collect()
}

/// Runs the pass with matching 64-bit word types.
fn run(block: &IrBlock) -> IrBlock {
    instrument(block, IrType::I64, IrType::I64)
}

// ══════════════════════════════════════════════════════════
// 1. Verbatim copies and the block counter
// ══════════════════════════════════════════════════════════

/// The preamble before the first instruction mark is copied ahead of the
/// block-entry hook; uninteresting statements are copied verbatim.
#[test]
fn preamble_precedes_the_block_counter() {
    let mut input = block(&[IrType::I64]);
    input.push(IrStmt::WrTmp {
        tmp: 0,
        expr: IrExpr::Const(IrConst::U64(7)),
    });
    input.push(IrStmt::IMark { addr: 0x400000, len: 4 });
    input.push(IrStmt::Put {
        offset: 16,
        data: IrExpr::Temp(0),
    });

    let out = run(&input);
    assert!(matches!(out.stmts[0], IrStmt::WrTmp { tmp: 0, .. }));
    assert!(matches!(out.stmts[1], IrStmt::Hook(Hook::BlockEntered)));
    assert!(matches!(out.stmts[2], IrStmt::IMark { .. }));
    assert!(matches!(out.stmts[3], IrStmt::Put { .. }));
    assert_eq!(hooks(&out).len(), 1);
}

/// No-op statements are dropped from the output.
#[test]
fn noops_are_dropped() {
    let mut input = block(&[]);
    input.push(IrStmt::IMark { addr: 0x1000, len: 4 });
    input.push(IrStmt::NoOp);
    let out = run(&input);
    assert!(!out.stmts.iter().any(|stmt| matches!(stmt, IrStmt::NoOp)));
}

/// A word-size mismatch between guest and host is fatal.
#[test]
#[should_panic(expected = "host/guest word size mismatch")]
fn word_size_mismatch_panics() {
    let input = block(&[]);
    let _ = instrument(&input, IrType::I32, IrType::I64);
}

// ══════════════════════════════════════════════════════════
// 2. Store widening
// ══════════════════════════════════════════════════════════

/// A 64-bit store hooks its value directly, with no widening temp.
#[test]
fn i64_store_hooks_directly() {
    let mut input = block(&[IrType::I64, IrType::I64]);
    input.push(IrStmt::IMark { addr: 0x1000, len: 4 });
    input.push(IrStmt::Store {
        addr: IrExpr::Temp(0),
        data: IrExpr::Temp(1),
    });

    let out = run(&input);
    let all = hooks(&out);
    assert_eq!(all.len(), 2);
    match all[1] {
        Hook::Store {
            addr,
            size,
            value,
            guard,
        } => {
            assert_eq!(*addr, IrExpr::Temp(0));
            assert_eq!(*size, 8);
            assert_eq!(*value, IrExpr::Temp(1));
            assert!(guard.is_none());
        }
        other => panic!("expected a store hook, got {other:?}"),
    }
    assert_eq!(out.tyenv.len(), input.tyenv.len(), "no widening temp needed");
}

/// Narrow integer stores are widened through a fresh temporary.
#[rstest]
#[case(IrType::I8, UnOp::Widen8To64, 1)]
#[case(IrType::I16, UnOp::Widen16To64, 2)]
#[case(IrType::I32, UnOp::Widen32To64, 4)]
fn narrow_store_is_widened(#[case] ty: IrType, #[case] op: UnOp, #[case] size: u64) {
    let mut input = block(&[IrType::I64, ty]);
    input.push(IrStmt::IMark { addr: 0x1000, len: 4 });
    input.push(IrStmt::Store {
        addr: IrExpr::Temp(0),
        data: IrExpr::Temp(1),
    });

    let out = run(&input);
    let widen_tmp = (input.tyenv.len()) as u32;
    assert!(out.stmts.iter().any(|stmt| matches!(
        stmt,
        IrStmt::WrTmp { tmp, expr: IrExpr::Unop(o, _) } if *tmp == widen_tmp && *o == op
    )));
    match hooks(&out)[1] {
        Hook::Store {
            size: hook_size,
            value,
            ..
        } => {
            assert_eq!(*hook_size, size);
            assert_eq!(*value, IrExpr::Temp(widen_tmp));
            assert_eq!(out.tyenv[widen_tmp as usize], IrType::I64);
        }
        other => panic!("expected a store hook, got {other:?}"),
    }
}

/// A float store is reinterpreted, not converted.
#[test]
fn f64_store_reinterprets_bits() {
    let mut input = block(&[IrType::I64, IrType::F64]);
    input.push(IrStmt::IMark { addr: 0x1000, len: 4 });
    input.push(IrStmt::Store {
        addr: IrExpr::Temp(0),
        data: IrExpr::Temp(1),
    });

    let out = run(&input);
    assert!(out.stmts.iter().any(|stmt| matches!(
        stmt,
        IrStmt::WrTmp { expr: IrExpr::Unop(UnOp::ReinterpF64AsI64, _), .. }
    )));
}

/// Constant stores are widened in place without a temporary.
#[test]
fn const_store_is_widened_in_place() {
    let mut input = block(&[IrType::I64]);
    input.push(IrStmt::IMark { addr: 0x1000, len: 4 });
    input.push(IrStmt::Store {
        addr: IrExpr::Temp(0),
        data: IrExpr::Const(IrConst::U16(0xBEEF)),
    });

    let out = run(&input);
    match hooks(&out)[1] {
        Hook::Store { size, value, .. } => {
            assert_eq!(*size, 2);
            assert_eq!(*value, IrExpr::Const(IrConst::U64(0xBEEF)));
        }
        other => panic!("expected a store hook, got {other:?}"),
    }
    assert_eq!(out.tyenv.len(), input.tyenv.len());
}

/// A value shape the model cannot widen is skipped with a warning.
#[test]
fn unsupported_store_type_is_skipped() {
    let mut input = block(&[IrType::I64, IrType::F32]);
    input.push(IrStmt::IMark { addr: 0x1000, len: 4 });
    input.push(IrStmt::Store {
        addr: IrExpr::Temp(0),
        data: IrExpr::Temp(1),
    });

    let out = run(&input);
    assert_eq!(hooks(&out).len(), 1, "only the block counter");
}

// ══════════════════════════════════════════════════════════
// 3. Vector lane splitting
// ══════════════════════════════════════════════════════════

/// A V128 store becomes two word hooks at offsets 0 and 8 (little-endian).
#[test]
fn v128_store_splits_into_two_lanes() {
    let mut input = block(&[IrType::I64, IrType::V128]);
    input.push(IrStmt::IMark { addr: 0x1000, len: 4 });
    input.push(IrStmt::Store {
        addr: IrExpr::Temp(0),
        data: IrExpr::Temp(1),
    });

    let out = run(&input);
    let all = hooks(&out);
    assert_eq!(all.len(), 3);
    for hook in &all[1..] {
        match hook {
            Hook::Store { size, value, .. } => {
                assert_eq!(*size, 8);
                assert!(matches!(value, IrExpr::Temp(_)));
            }
            other => panic!("expected a store hook, got {other:?}"),
        }
    }
    // Lane offsets 0 and 8 materialize as Add64 temps in order.
    let offsets: Vec<u64> = out
        .stmts
        .iter()
        .filter_map(|stmt| match stmt {
            IrStmt::WrTmp {
                expr: IrExpr::Binop(BinOp::Add64, _, rhs),
                ..
            } => match rhs.as_ref() {
                IrExpr::Const(IrConst::U64(off)) => Some(*off),
                _ => None,
            },
            _ => None,
        })
        .collect();
    assert_eq!(offsets, vec![0, 8]);
    // Lane extracts reference lanes 0 and 1.
    let lanes: Vec<u8> = out
        .stmts
        .iter()
        .filter_map(|stmt| match stmt {
            IrStmt::WrTmp {
                expr: IrExpr::Unop(UnOp::V128To64Lane(lane), _),
                ..
            } => Some(*lane),
            _ => None,
        })
        .collect();
    assert_eq!(lanes, vec![0, 1]);
}

/// A big-endian V128 store maps lane 0 to the high byte offset.
#[test]
fn v128_big_endian_reverses_lane_offsets() {
    let mut input = IrBlock::new(Endness::Big);
    let addr = input.new_temp(IrType::I64);
    let data = input.new_temp(IrType::V128);
    input.push(IrStmt::IMark { addr: 0x1000, len: 4 });
    input.push(IrStmt::Store {
        addr: IrExpr::Temp(addr),
        data: IrExpr::Temp(data),
    });

    let out = instrument(&input, IrType::I64, IrType::I64);
    let offsets: Vec<u64> = out
        .stmts
        .iter()
        .filter_map(|stmt| match stmt {
            IrStmt::WrTmp {
                expr: IrExpr::Binop(BinOp::Add64, _, rhs),
                ..
            } => match rhs.as_ref() {
                IrExpr::Const(IrConst::U64(off)) => Some(*off),
                _ => None,
            },
            _ => None,
        })
        .collect();
    assert_eq!(offsets, vec![8, 0], "lane 0 is least significant");
}

/// A V256 store becomes four word hooks at offsets 0, 8, 16, 24.
#[test]
fn v256_store_splits_into_four_lanes() {
    let mut input = block(&[IrType::I64, IrType::V256]);
    input.push(IrStmt::IMark { addr: 0x1000, len: 4 });
    input.push(IrStmt::Store {
        addr: IrExpr::Temp(0),
        data: IrExpr::Temp(1),
    });

    let out = run(&input);
    let stores = hooks(&out).len() - 1;
    assert_eq!(stores, 4);
    let lanes: Vec<u8> = out
        .stmts
        .iter()
        .filter_map(|stmt| match stmt {
            IrStmt::WrTmp {
                expr: IrExpr::Unop(UnOp::V256To64Lane(lane), _),
                ..
            } => Some(*lane),
            _ => None,
        })
        .collect();
    assert_eq!(lanes, vec![0, 1, 2, 3]);
}

// ══════════════════════════════════════════════════════════
// 4. Guarded stores, CAS, LLSC
// ══════════════════════════════════════════════════════════

/// A guarded store's hook carries the original guard.
#[test]
fn guarded_store_keeps_its_guard() {
    let mut input = block(&[IrType::I64, IrType::I64, IrType::I1]);
    input.push(IrStmt::IMark { addr: 0x1000, len: 4 });
    input.push(IrStmt::StoreG {
        addr: IrExpr::Temp(0),
        data: IrExpr::Temp(1),
        guard: IrExpr::Temp(2),
    });

    let out = run(&input);
    match hooks(&out)[1] {
        Hook::Store { guard, .. } => assert_eq!(*guard, Some(IrExpr::Temp(2))),
        other => panic!("expected a store hook, got {other:?}"),
    }
}

/// A single CAS emits one store hook guarded by `expected == old`.
#[test]
fn cas_emits_a_guarded_store() {
    let mut input = block(&[IrType::I64, IrType::I64, IrType::I64, IrType::I64]);
    input.push(IrStmt::IMark { addr: 0x1000, len: 4 });
    input.push(IrStmt::Cas {
        addr: IrExpr::Temp(0),
        expd_lo: IrExpr::Temp(1),
        data_lo: IrExpr::Temp(2),
        old_lo: 3,
        expd_hi: None,
        data_hi: None,
        old_hi: None,
    });

    let out = run(&input);
    // The guard temp is the CAS-compare of expected against old.
    let guard_tmp = out
        .stmts
        .iter()
        .find_map(|stmt| match stmt {
            IrStmt::WrTmp {
                tmp,
                expr: IrExpr::Binop(BinOp::CasCmpEq(IntWidth::W64), lhs, rhs),
            } => {
                assert_eq!(lhs.as_ref(), &IrExpr::Temp(1));
                assert_eq!(rhs.as_ref(), &IrExpr::Temp(3));
                Some(*tmp)
            }
            _ => None,
        })
        .expect("CAS guard expression");
    assert_eq!(out.tyenv[guard_tmp as usize], IrType::I1);

    match hooks(&out)[1] {
        Hook::Store { size, guard, .. } => {
            assert_eq!(*size, 8);
            assert_eq!(*guard, Some(IrExpr::Temp(guard_tmp)));
        }
        other => panic!("expected a store hook, got {other:?}"),
    }
}

/// A double CAS emits two guarded hooks, the second at `addr + size`.
#[test]
fn double_cas_emits_two_guarded_stores() {
    let mut input = block(&[
        IrType::I64, // 0: addr
        IrType::I32, // 1: expd_lo
        IrType::I32, // 2: data_lo
        IrType::I32, // 3: old_lo
        IrType::I32, // 4: expd_hi
        IrType::I32, // 5: data_hi
        IrType::I32, // 6: old_hi
    ]);
    input.push(IrStmt::IMark { addr: 0x1000, len: 4 });
    input.push(IrStmt::Cas {
        addr: IrExpr::Temp(0),
        expd_lo: IrExpr::Temp(1),
        data_lo: IrExpr::Temp(2),
        old_lo: 3,
        expd_hi: Some(IrExpr::Temp(4)),
        data_hi: Some(IrExpr::Temp(5)),
        old_hi: Some(6),
    });

    let out = run(&input);
    let stores: Vec<&Hook> = hooks(&out)
        .into_iter()
        .filter(|hook| matches!(hook, Hook::Store { .. }))
        .collect();
    assert_eq!(stores.len(), 2);
    for hook in &stores {
        match hook {
            Hook::Store { size, guard, .. } => {
                assert_eq!(*size, 4);
                assert!(guard.is_some(), "both halves are guarded");
            }
            _ => unreachable!(),
        }
    }
    // The fold to a single guard uses xor/or at the CAS width.
    assert!(out.stmts.iter().any(|stmt| matches!(
        stmt,
        IrStmt::WrTmp { expr: IrExpr::Binop(BinOp::Or(IntWidth::W32), _, _), .. }
    )));
    // The high half's address is addr + 4.
    assert!(out.stmts.iter().any(|stmt| matches!(
        stmt,
        IrStmt::WrTmp { expr: IrExpr::Binop(BinOp::Add64, _, rhs), .. }
            if matches!(rhs.as_ref(), IrExpr::Const(IrConst::U64(4)))
    )));
}

/// Store-conditional data is hooked; a bare load-linked is not.
#[test]
fn llsc_hooks_only_the_store_half() {
    let mut input = block(&[IrType::I64, IrType::I64, IrType::I1, IrType::I64]);
    input.push(IrStmt::IMark { addr: 0x1000, len: 4 });
    input.push(IrStmt::Llsc {
        result: 3,
        addr: IrExpr::Temp(0),
        store_data: None,
    });
    input.push(IrStmt::Llsc {
        result: 2,
        addr: IrExpr::Temp(0),
        store_data: Some(IrExpr::Temp(1)),
    });

    let out = run(&input);
    let stores = hooks(&out)
        .into_iter()
        .filter(|hook| matches!(hook, Hook::Store { .. }))
        .count();
    assert_eq!(stores, 1);
}

// ══════════════════════════════════════════════════════════
// 5. Flushes and barriers
// ══════════════════════════════════════════════════════════

/// An ordered (self-fencing) flush selects the flush-fence hook; an
/// unordered one gets the plain flush hook and no fence.
#[rstest]
#[case(FlushKind::Ordered, true)]
#[case(FlushKind::Unordered, false)]
fn flush_kind_selects_the_hook(#[case] kind: FlushKind, #[case] fenced: bool) {
    let mut input = block(&[IrType::I64]);
    input.push(IrStmt::IMark { addr: 0x1000, len: 4 });
    input.push(IrStmt::Flush {
        addr: IrExpr::Temp(0),
        kind,
    });

    let out = run(&input);
    let all = hooks(&out);
    assert_eq!(all.len(), 2);
    match all[1] {
        Hook::FlushFence { .. } => assert!(fenced, "unordered flush must not fence"),
        Hook::Flush { .. } => assert!(!fenced, "ordered flush must fence"),
        other => panic!("expected a flush hook, got {other:?}"),
    }
    assert!(!all.iter().any(|hook| matches!(hook, Hook::Fence)));
}

/// Store and full barriers hook a fence; a reservation cancel does not.
#[rstest]
#[case(BarrierKind::Full, true)]
#[case(BarrierKind::Store, true)]
#[case(BarrierKind::CancelReservation, false)]
fn barrier_kind_selects_the_fence(#[case] kind: BarrierKind, #[case] fences: bool) {
    let mut input = block(&[]);
    input.push(IrStmt::IMark { addr: 0x1000, len: 4 });
    input.push(IrStmt::Barrier { kind });

    let out = run(&input);
    let fence_hooks = hooks(&out)
        .into_iter()
        .filter(|hook| matches!(hook, Hook::Fence))
        .count();
    assert_eq!(fence_hooks, usize::from(fences));
}
