//! Operator families, one per node arity.
//!
//! The 16-bit `op` field of a node header is interpreted against the family
//! selected by the node's type: expression nodes use [`Op0`]–[`OpN`],
//! statement nodes use [`OpStmt1`]–[`OpStmtN`].

use core::fmt;

use crate::macros::op_family;

/// A header `op` value outside its family's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InvalidOp;

impl fmt::Display for InvalidOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid op")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for InvalidOp {}

op_family! {
    /// Zero-child statements. These four values double as the direct
    /// child-slot encoding (items `0..4`), so they must stay below 4.
    Op0 {
        "Placeholder of an absent or failed statement." 0 Bad "?",
        "Jump to the innermost enclosing loop or switch exit." 1 Break "break",
        "Jump to the innermost enclosing loop's next iteration." 2 Continue "continue",
        "Transfer into the next switch case body." 3 Fallthrough "fallthrough",
    }
}

op_family! {
    /// Unary expression operators.
    Op1 {
        "Bitwise complement." 0 Xor1 "~",
        "Boolean negation." 1 Not1 "!",
        "Arithmetic negation." 2 Neg1 "-",
        "Conversion to the node's kind." 3 Cast "cast",
    }
}

op_family! {
    /// Binary expression operators.
    Op2 {
        "Addition." 0 Add "+",
        "Subtraction." 1 Sub "-",
        "Multiplication." 2 Mul "*",
        "Division." 3 Div "/",
        "Remainder." 4 Rem "%",
        "Bitwise and." 5 And "&",
        "Bitwise or." 6 Or "|",
        "Bitwise xor." 7 Xor "^",
        "Left shift." 8 Shl "<<",
        "Right shift." 9 Shr ">>",
        "Short-circuit and. Rewritten away by the compiler." 10 Land "&&",
        "Short-circuit or. Rewritten away by the compiler." 11 Lor "||",
        "Less than." 12 Lss "<",
        "Less than or equal." 13 Leq "<=",
        "Not equal." 14 Neq "!=",
        "Equal." 15 Eql "==",
        "Greater than." 16 Gtr ">",
        "Greater than or equal." 17 Geq ">=",
    }
}

impl Op2 {
    /// True for the six comparison operators.
    pub const fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Lss | Self::Leq | Self::Neq | Self::Eql | Self::Gtr | Self::Geq
        )
    }

    /// True for operators whose result kind is `Bool` regardless of the
    /// operand kinds.
    pub const fn is_boolean(self) -> bool {
        self.is_comparison() || matches!(self, Self::Land | Self::Lor)
    }
}

op_family! {
    /// Variable-arity expression operators.
    OpN {
        "Function call." 0 Call "call",
        "Plain expression tuple." 1 Tuple "tuple",
    }
}

op_family! {
    /// One-child statements. The `Asm*` rows are the architecture-neutral
    /// conditional jumps emitted by the generic pass; the `X86*` rows only
    /// appear in x86-64 lowered bodies.
    OpStmt1 {
        "Unconditional jump to a label." 0 Goto "goto",
        "Increment by one." 1 Inc "++",
        "Decrement by one." 2 Dec "--",
        "Switch default case." 3 Default "default",
        "Jump if above (unsigned >)." 16 AsmJa "asm_ja",
        "Jump if above or equal (unsigned >=)." 17 AsmJae "asm_jae",
        "Jump if below (unsigned <)." 18 AsmJb "asm_jb",
        "Jump if below or equal (unsigned <=)." 19 AsmJbe "asm_jbe",
        "Jump if equal." 20 AsmJe "asm_je",
        "Jump if greater (signed >)." 21 AsmJg "asm_jg",
        "Jump if greater or equal (signed >=)." 22 AsmJge "asm_jge",
        "Jump if less (signed <)." 23 AsmJl "asm_jl",
        "Jump if less or equal (signed <=)." 24 AsmJle "asm_jle",
        "Jump if not equal." 25 AsmJne "asm_jne",
        "x86-64 unconditional jump." 32 X86Jmp "x86_jmp",
        "x86-64 increment." 33 X86Inc "x86_inc",
        "x86-64 decrement." 34 X86Dec "x86_dec",
        "x86-64 arithmetic negation." 35 X86Neg "x86_neg",
        "x86-64 bitwise complement." 36 X86Not "x86_not",
        "x86-64 jump if above." 37 X86Ja "x86_ja",
        "x86-64 jump if above or equal." 38 X86Jae "x86_jae",
        "x86-64 jump if below." 39 X86Jb "x86_jb",
        "x86-64 jump if below or equal." 40 X86Jbe "x86_jbe",
        "x86-64 jump if equal." 41 X86Je "x86_je",
        "x86-64 jump if greater." 42 X86Jg "x86_jg",
        "x86-64 jump if greater or equal." 43 X86Jge "x86_jge",
        "x86-64 jump if less." 44 X86Jl "x86_jl",
        "x86-64 jump if less or equal." 45 X86Jle "x86_jle",
        "x86-64 jump if not equal." 46 X86Jne "x86_jne",
    }
}

op_family! {
    /// Two-child statements.
    OpStmt2 {
        "Plain assignment." 0 Assign "=",
        "Add and assign." 1 AddAssign "+=",
        "Subtract and assign." 2 SubAssign "-=",
        "Multiply and assign." 3 MulAssign "*=",
        "Divide and assign." 4 DivAssign "/=",
        "Remainder and assign." 5 RemAssign "%=",
        "Bitwise and and assign." 6 AndAssign "&=",
        "Bitwise or and assign." 7 OrAssign "|=",
        "Bitwise xor and assign." 8 XorAssign "^=",
        "Shift left and assign." 9 ShlAssign "<<=",
        "Shift right and assign." 10 ShrAssign ">>=",
        "Conditional jump: children are label and condition." 16 JumpIf "jump_if",
        "Switch case: children are value and body." 17 Case "case",
        "Architecture-neutral flags-setting compare." 18 AsmCmp "asm_cmp",
        "x86-64 move." 32 X86Mov "x86_mov",
        "x86-64 add." 33 X86Add "x86_add",
        "x86-64 subtract." 34 X86Sub "x86_sub",
        "x86-64 multiply." 35 X86Mul "x86_mul",
        "x86-64 divide." 36 X86Div "x86_div",
        "x86-64 bitwise and." 37 X86And "x86_and",
        "x86-64 bitwise or." 38 X86Or "x86_or",
        "x86-64 bitwise xor." 39 X86Xor "x86_xor",
        "x86-64 shift left." 40 X86Shl "x86_shl",
        "x86-64 shift right." 41 X86Shr "x86_shr",
        "x86-64 compare." 42 X86Cmp "x86_cmp",
    }
}

impl OpStmt2 {
    /// True for `=` and the compound assignment operators.
    pub const fn is_assign(self) -> bool {
        (self as u16) <= (Self::ShrAssign as u16)
    }
}

op_family! {
    /// Three-child statements.
    OpStmt3 {
        "Conditional: children are condition, then-branch, else-branch." 0 If "if",
    }
}

op_family! {
    /// Four-child statements.
    OpStmt4 {
        "Loop: children are init, test, post and body." 0 For "for",
    }
}

op_family! {
    /// Variable-arity statements.
    OpStmtN {
        "Statement sequence." 0 Block "block",
        "If/else-if chain: children alternate condition, body." 1 Cond "cond",
        "Switch: children are the value then the cases." 2 Switch "switch",
        "Call with destinations: children are the targets then the call." 3 AssignCall "=",
        "Function return." 4 Return "return",
        "x86-64 return." 16 X86Ret "x86_ret",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_roundtrip() {
        for raw in 0..64u16 {
            if let Ok(op) = OpStmt2::try_from(raw) {
                assert_eq!(u16::from(op), raw);
            }
        }
        assert_eq!(OpStmt2::try_from(18), Ok(OpStmt2::AsmCmp));
        assert_eq!(Op2::try_from(999), Err(InvalidOp));
    }

    #[test]
    fn stmt0_fits_direct_slots() {
        for op in [Op0::Bad, Op0::Break, Op0::Continue, Op0::Fallthrough] {
            assert!((op as u16) < 4);
        }
    }

    #[test]
    fn assign_family() {
        assert!(OpStmt2::Assign.is_assign());
        assert!(OpStmt2::ShrAssign.is_assign());
        assert!(!OpStmt2::JumpIf.is_assign());
        assert!(!OpStmt2::X86Mov.is_assign());
    }
}
