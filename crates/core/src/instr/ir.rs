//! IR statement and expression types.
//!
//! A reduced model of the host framework's guest IR: a tagged variant of
//! statement kinds with flat (atomic) operand expressions. The tool never
//! interprets most of these — it copies them verbatim — but it must
//! distinguish every store-like shape, flushes, and memory barriers, and it
//! must be able to append its own widening expressions and callback hooks.

/// Index of an IR temporary within a block's type environment.
pub type IrTemp = u32;

/// Type of an IR value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IrType {
    /// One-bit integer (guard values).
    I1,
    /// 8-bit integer.
    I8,
    /// 16-bit integer.
    I16,
    /// 32-bit integer.
    I32,
    /// 64-bit integer; the machine word.
    I64,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
    /// 128-bit vector.
    V128,
    /// 256-bit vector.
    V256,
}

impl IrType {
    /// Size of a value of this type in bytes.
    pub fn size_bytes(self) -> u64 {
        match self {
            Self::I1 | Self::I8 => 1,
            Self::I16 => 2,
            Self::I32 | Self::F32 => 4,
            Self::I64 | Self::F64 => 8,
            Self::V128 => 16,
            Self::V256 => 32,
        }
    }
}

/// Integer operation width for CAS guards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntWidth {
    /// 8-bit operation.
    W8,
    /// 16-bit operation.
    W16,
    /// 32-bit operation.
    W32,
    /// 64-bit operation.
    W64,
}

impl IntWidth {
    /// Width for an integer IR type; `None` for non-integer types.
    pub fn from_type(ty: IrType) -> Option<Self> {
        match ty {
            IrType::I8 => Some(Self::W8),
            IrType::I16 => Some(Self::W16),
            IrType::I32 => Some(Self::W32),
            IrType::I64 => Some(Self::W64),
            _ => None,
        }
    }

    /// The IR type of values this width operates on.
    pub fn ty(self) -> IrType {
        match self {
            Self::W8 => IrType::I8,
            Self::W16 => IrType::I16,
            Self::W32 => IrType::I32,
            Self::W64 => IrType::I64,
        }
    }

    /// A zero constant of this width.
    pub fn zero(self) -> IrConst {
        match self {
            Self::W8 => IrConst::U8(0),
            Self::W16 => IrConst::U16(0),
            Self::W32 => IrConst::U32(0),
            Self::W64 => IrConst::U64(0),
        }
    }
}

/// An IR constant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IrConst {
    /// One-bit constant.
    U1(bool),
    /// 8-bit constant.
    U8(u8),
    /// 16-bit constant.
    U16(u16),
    /// 32-bit constant.
    U32(u32),
    /// 64-bit constant.
    U64(u64),
}

impl IrConst {
    /// The type of this constant.
    pub fn ty(self) -> IrType {
        match self {
            Self::U1(_) => IrType::I1,
            Self::U8(_) => IrType::I8,
            Self::U16(_) => IrType::I16,
            Self::U32(_) => IrType::I32,
            Self::U64(_) => IrType::I64,
        }
    }

    /// This constant zero-extended to a machine word.
    pub fn widen(self) -> u64 {
        match self {
            Self::U1(v) => u64::from(v),
            Self::U8(v) => u64::from(v),
            Self::U16(v) => u64::from(v),
            Self::U32(v) => u64::from(v),
            Self::U64(v) => v,
        }
    }
}

/// Unary IR operations the pass emits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnOp {
    /// Zero-extend a 1-bit value to 64 bits.
    Widen1To64,
    /// Zero-extend an 8-bit value to 64 bits.
    Widen8To64,
    /// Zero-extend a 16-bit value to 64 bits.
    Widen16To64,
    /// Zero-extend a 32-bit value to 64 bits.
    Widen32To64,
    /// Reinterpret a 64-bit float's bits as an integer.
    ReinterpF64AsI64,
    /// Extract 64-bit lane `0..2` of a 128-bit vector (lane 0 is least significant).
    V128To64Lane(u8),
    /// Extract 64-bit lane `0..4` of a 256-bit vector (lane 0 is least significant).
    V256To64Lane(u8),
}

/// Binary IR operations the pass emits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    /// 64-bit addition (address arithmetic).
    Add64,
    /// CAS equality compare, producing a 1-bit guard.
    CasCmpEq(IntWidth),
    /// Bitwise or.
    Or(IntWidth),
    /// Bitwise xor.
    Xor(IntWidth),
}

/// A flat IR expression.
#[derive(Clone, Debug, PartialEq)]
pub enum IrExpr {
    /// Read of a temporary.
    Temp(IrTemp),
    /// A constant.
    Const(IrConst),
    /// Unary operation.
    Unop(UnOp, Box<IrExpr>),
    /// Binary operation.
    Binop(BinOp, Box<IrExpr>, Box<IrExpr>),
}

/// Kind of a cache-line flush instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushKind {
    /// Ordered flush: the instruction fences its own line (CLFLUSH-like).
    Ordered,
    /// Unordered flush: needs a separate fence (CLFLUSHOPT-like).
    Unordered,
}

/// Kind of a memory-barrier event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BarrierKind {
    /// Full memory fence.
    Full,
    /// Store fence.
    Store,
    /// Load-linked reservation cancel; not a store ordering point.
    CancelReservation,
}

/// A callback hook the pass inserts.
#[derive(Clone, Debug, PartialEq)]
pub enum Hook {
    /// Count entry into the translated block.
    BlockEntered,
    /// Report a store of `size` bytes of `value` (widened to a machine word)
    /// at `addr`; fires only when `guard` evaluates true.
    Store {
        /// Address expression of the store.
        addr: IrExpr,
        /// Store size in bytes.
        size: u64,
        /// Stored value, widened to a machine word.
        value: IrExpr,
        /// Optional 1-bit guard; `None` means always.
        guard: Option<IrExpr>,
    },
    /// Report a cache-line flush of the line containing `addr`.
    Flush {
        /// Address inside the flushed line.
        addr: IrExpr,
    },
    /// Report a flush that fences itself, with no crash window in between.
    FlushFence {
        /// Address inside the flushed line.
        addr: IrExpr,
    },
    /// Report a store fence.
    Fence,
}

/// A guest IR statement.
#[derive(Clone, Debug, PartialEq)]
pub enum IrStmt {
    /// No operation; dropped by the pass.
    NoOp,
    /// Start of a guest instruction.
    IMark {
        /// Guest address of the instruction.
        addr: u64,
        /// Encoded length in bytes.
        len: u32,
    },
    /// ABI hint from the front end.
    AbiHint,
    /// Write to a guest register.
    Put {
        /// Guest state offset.
        offset: u32,
        /// Value written.
        data: IrExpr,
    },
    /// Indexed write to a guest register file.
    PutI {
        /// Value written.
        data: IrExpr,
    },
    /// Assign an expression to a temporary.
    WrTmp {
        /// Destination temporary.
        tmp: IrTemp,
        /// Assigned expression.
        expr: IrExpr,
    },
    /// Guarded load into a temporary.
    LoadG {
        /// Destination temporary.
        dst: IrTemp,
        /// Load address.
        addr: IrExpr,
    },
    /// Plain store.
    Store {
        /// Store address.
        addr: IrExpr,
        /// Stored value.
        data: IrExpr,
    },
    /// Guarded store.
    StoreG {
        /// Store address.
        addr: IrExpr,
        /// Stored value.
        data: IrExpr,
        /// 1-bit guard.
        guard: IrExpr,
    },
    /// Compare-and-swap, single or double width.
    Cas {
        /// Address of the CAS.
        addr: IrExpr,
        /// Expected low value.
        expd_lo: IrExpr,
        /// New low value.
        data_lo: IrExpr,
        /// Temporary receiving the old low value.
        old_lo: IrTemp,
        /// Expected high value (double CAS only).
        expd_hi: Option<IrExpr>,
        /// New high value (double CAS only).
        data_hi: Option<IrExpr>,
        /// Temporary receiving the old high value (double CAS only).
        old_hi: Option<IrTemp>,
    },
    /// Load-linked / store-conditional.
    Llsc {
        /// Result temporary (loaded value or SC success flag).
        result: IrTemp,
        /// Address of the operation.
        addr: IrExpr,
        /// Stored value for SC; `None` for LL.
        store_data: Option<IrExpr>,
    },
    /// Cache-line flush instruction.
    Flush {
        /// Address inside the flushed line.
        addr: IrExpr,
        /// Whether the flush fences itself.
        kind: FlushKind,
    },
    /// Memory-barrier event.
    Barrier {
        /// Barrier kind.
        kind: BarrierKind,
    },
    /// Conditional block exit.
    Exit {
        /// 1-bit guard.
        guard: IrExpr,
        /// Guest target address.
        target: u64,
    },
    /// Host helper call inserted by another pass; opaque here.
    Dirty,
    /// A callback hook inserted by this tool's pass.
    Hook(Hook),
}

/// Memory endianness of the guest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endness {
    /// Little-endian guest.
    Little,
    /// Big-endian guest.
    Big,
}

/// A translated block of guest IR.
#[derive(Clone, Debug)]
pub struct IrBlock {
    /// Types of temporaries, indexed by [`IrTemp`].
    pub tyenv: Vec<IrType>,
    /// Statements in program order.
    pub stmts: Vec<IrStmt>,
    /// Guest endianness.
    pub endness: Endness,
}

impl IrBlock {
    /// Creates an empty block.
    pub fn new(endness: Endness) -> Self {
        Self {
            tyenv: Vec::new(),
            stmts: Vec::new(),
            endness,
        }
    }

    /// Allocates a fresh temporary of the given type.
    pub fn new_temp(&mut self, ty: IrType) -> IrTemp {
        self.tyenv.push(ty);
        (self.tyenv.len() - 1) as IrTemp
    }

    /// Appends a statement.
    pub fn push(&mut self, stmt: IrStmt) {
        self.stmts.push(stmt);
    }

    /// Computes the type of an expression against this block's environment.
    pub fn type_of(&self, expr: &IrExpr) -> IrType {
        match expr {
            IrExpr::Temp(tmp) => self.tyenv[*tmp as usize],
            IrExpr::Const(c) => c.ty(),
            IrExpr::Unop(_, _) => IrType::I64,
            IrExpr::Binop(op, _, _) => match op {
                BinOp::Add64 => IrType::I64,
                BinOp::CasCmpEq(_) => IrType::I1,
                BinOp::Or(width) | BinOp::Xor(width) => width.ty(),
            },
        }
    }
}
