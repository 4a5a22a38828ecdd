//! Pass selection and the local expression rewrites.
//!
//! Everything here is strictly local: constant folding over two immediate
//! operands and algebraic identities that return one of the existing
//! operands. There is no dataflow and no reachability analysis; in
//! particular `REMOVE_DEAD_CODE` only drops bare-atom expression
//! statements, never statements after a terminator.

use bitflags::bitflags;

use kiln_types::Kind;
use kiln_ir::{Code, Imm, Node, Op1, Op2};

bitflags! {
    /// Pass-selection flags. Unrecognized bits are ignored.
    pub struct Opt: u8 {
        /// Evaluate `Binary(op, Const, Const)` and `Unary(op, Const)` at
        /// compile time.
        const FOLD_CONSTANTS = 0b0000_0001;
        /// Apply local algebraic identities such as `x + 0` and `x * 1`.
        const SIMPLIFY_ALGEBRAIC = 0b0000_0010;
        /// Drop bare-atom expression statements.
        const REMOVE_DEAD_CODE = 0b0000_0100;
        /// All of the above.
        const ALL = 0b0000_0111;
    }
}

impl Default for Opt {
    fn default() -> Self {
        Opt::ALL
    }
}

/// Fold a binary over two constants. `None` when the operands are not
/// both constants, the kinds are not integral, or the result is undefined
/// (division by zero).
pub(crate) fn fold_binary(code: &Code, op: Op2, x: Node, y: Node) -> Option<Imm> {
    let a = x.imm(code)?;
    let b = y.imm(code)?;
    let kind = a.kind();
    if !kind.is_integer() {
        return None;
    }

    if op.is_comparison() {
        let ord = if kind.is_signed() {
            a.as_i64().cmp(&b.as_i64())
        } else {
            a.as_u64().cmp(&b.as_u64())
        };
        let truth = match op {
            Op2::Lss => ord.is_lt(),
            Op2::Leq => ord.is_le(),
            Op2::Neq => ord.is_ne(),
            Op2::Eql => ord.is_eq(),
            Op2::Gtr => ord.is_gt(),
            Op2::Geq => ord.is_ge(),
            _ => unreachable!("comparison checked above"),
        };
        return Some(Imm::from(truth));
    }

    let (av, bv) = (a.as_u64(), b.as_u64());
    let width = kind.bits().max(1);
    // Shift counts wrap at the operand width, matching the target's
    // behavior.
    let shift = (bv as u32) % width;
    let bits = match op {
        Op2::Add => av.wrapping_add(bv),
        Op2::Sub => av.wrapping_sub(bv),
        Op2::Mul => av.wrapping_mul(bv),
        Op2::Div if bv != 0 => {
            if kind.is_signed() {
                a.as_i64().wrapping_div(b.as_i64()) as u64
            } else {
                av / bv
            }
        }
        Op2::Rem if bv != 0 => {
            if kind.is_signed() {
                a.as_i64().wrapping_rem(b.as_i64()) as u64
            } else {
                av % bv
            }
        }
        Op2::And => av & bv,
        Op2::Or => av | bv,
        Op2::Xor => av ^ bv,
        Op2::Shl => av.wrapping_shl(shift),
        Op2::Shr => {
            if kind.is_signed() {
                (a.as_i64().wrapping_shr(shift)) as u64
            } else {
                av.wrapping_shr(shift)
            }
        }
        Op2::Land => (a.as_bool() && b.as_bool()) as u64,
        Op2::Lor => (a.as_bool() || b.as_bool()) as u64,
        _ => return None,
    };
    Some(Imm::new(kind, bits))
}

/// Fold a unary over a constant.
pub(crate) fn fold_unary(code: &Code, op: Op1, kind: Kind, x: Node) -> Option<Imm> {
    let a = x.imm(code)?;
    match op {
        Op1::Xor1 if a.kind().is_integer() => Some(Imm::new(a.kind(), !a.as_u64())),
        Op1::Not1 => Some(Imm::from(!a.as_bool())),
        Op1::Neg1 if a.kind().is_integer() => {
            Some(Imm::new(a.kind(), a.as_u64().wrapping_neg()))
        }
        Op1::Cast if kind.is_integer() && a.kind().is_integer() => {
            let bits = if a.kind().is_signed() {
                a.as_i64() as u64
            } else {
                a.as_u64()
            };
            Some(Imm::new(kind, bits))
        }
        _ => None,
    }
}

/// Local algebraic identities. The result is always one of the existing
/// operands, so no allocation is needed.
pub(crate) fn simplify_binary(code: &Code, op: Op2, x: Node, y: Node) -> Option<Node> {
    if !x.kind().is_integer() {
        return None;
    }
    let x_zero = x.imm(code).is_some_and(|i| i.is_zero());
    let y_zero = y.imm(code).is_some_and(|i| i.is_zero());
    let x_one = x.imm(code).is_some_and(|i| i.as_u64() == 1);
    let y_one = y.imm(code).is_some_and(|i| i.as_u64() == 1);

    match op {
        Op2::Add | Op2::Or | Op2::Xor if y_zero => Some(x),
        Op2::Add | Op2::Or | Op2::Xor if x_zero => Some(y),
        Op2::Sub | Op2::Shl | Op2::Shr if y_zero => Some(x),
        Op2::Mul if y_one => Some(x),
        Op2::Mul if x_one => Some(y),
        Op2::Mul if y_zero => Some(y),
        Op2::Mul if x_zero => Some(x),
        Op2::Div if y_one => Some(x),
        Op2::And | Op2::Or if x == y => Some(x),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_ir::Func;

    #[test]
    fn unrecognized_bits_are_ignored() {
        let opt = Opt::from_bits_truncate(0xFF);
        assert_eq!(opt, Opt::ALL);
    }

    #[test]
    fn folds_integer_arithmetic() {
        let mut f = Func::new("fold", &[], &[]);
        let a = f.new_imm(Imm::new(Kind::Uint64, 6));
        let b = f.new_imm(Imm::new(Kind::Uint64, 7));
        assert_eq!(
            fold_binary(f.code(), Op2::Mul, a, b),
            Some(Imm::new(Kind::Uint64, 42))
        );
        assert_eq!(fold_binary(f.code(), Op2::Div, a, b), Some(Imm::new(Kind::Uint64, 0)));
    }

    #[test]
    fn division_by_zero_does_not_fold() {
        let mut f = Func::new("fold", &[], &[]);
        let a = f.new_imm(Imm::new(Kind::Uint64, 6));
        let zero = f.new_imm(Imm::new(Kind::Uint64, 0));
        assert_eq!(fold_binary(f.code(), Op2::Div, a, zero), None);
        assert_eq!(fold_binary(f.code(), Op2::Rem, a, zero), None);
    }

    #[test]
    fn signed_comparison_folds_signed() {
        let mut f = Func::new("fold", &[], &[]);
        let minus = f.new_imm(Imm::new(Kind::Int32, -5i64 as u64));
        let plus = f.new_imm(Imm::new(Kind::Int32, 3));
        assert_eq!(
            fold_binary(f.code(), Op2::Lss, minus, plus),
            Some(Imm::from(true))
        );
    }

    #[test]
    fn identities_return_operands() {
        let mut f = Func::new("simpl", &[], &[]);
        let x = f.new_var(Kind::Uint64);
        let zero = f.new_imm(Imm::new(Kind::Uint64, 0));
        let one = f.new_imm(Imm::new(Kind::Uint64, 1));
        assert_eq!(simplify_binary(f.code(), Op2::Add, x, zero), Some(x));
        assert_eq!(simplify_binary(f.code(), Op2::Mul, x, one), Some(x));
        assert_eq!(simplify_binary(f.code(), Op2::Mul, x, zero), Some(zero));
        assert_eq!(simplify_binary(f.code(), Op2::Sub, x, zero), Some(x));
        assert_eq!(simplify_binary(f.code(), Op2::Sub, x, one), None);
        assert_eq!(simplify_binary(f.code(), Op2::And, x, x), Some(x));
    }
}
