//! S-expression formatter for IR nodes.
//!
//! The surface is stable and seeds the regression tests: statements print
//! as `(<op> <child>…)`, blocks indent their children by four spaces per
//! nesting level, labels print bare as `label_<n>`, vars as
//! `var<id>_<kind-suffix>` with the id in lowercase hex, integer constants
//! in decimal and Bool constants as `true`/`false`.

use alloc::string::String;
use core::fmt::{self, Display, Formatter, Write};

use kiln_types::Kind;

use crate::code::Code;
use crate::expr::{Label, Name, Var};
use crate::header::Type;
use crate::node::Node;
use crate::op::{Op0, OpStmt3, OpStmt4, OpStmtN};

/// Render a node to an owned string.
pub fn to_string(node: Node, code: &Code) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write!(out, "{}", node.display(code));
    out
}

impl Node {
    /// Display adapter carrying the `Code` context the node decodes from.
    pub fn display<'a>(&self, code: &'a Code) -> DisplayNode<'a> {
        DisplayNode {
            node: *self,
            code,
            indent: 0,
        }
    }
}

/// [`Display`] implementation for a node plus its decoding context.
#[derive(Debug, Clone, Copy)]
pub struct DisplayNode<'a> {
    node: Node,
    code: &'a Code,
    indent: usize,
}

impl<'a> DisplayNode<'a> {
    fn at(&self, node: Node, indent: usize) -> DisplayNode<'a> {
        DisplayNode {
            node,
            code: self.code,
            indent,
        }
    }

    fn child(&self, i: u32) -> DisplayNode<'a> {
        self.at(self.node.child(self.code, i), self.indent)
    }

    fn newline(&self, f: &mut Formatter<'_>, indent: usize) -> fmt::Result {
        f.write_char('\n')?;
        for _ in 0..indent * 4 {
            f.write_char(' ')?;
        }
        Ok(())
    }

    fn mnemonic(&self) -> &'static str {
        let op = self.node.op_raw();
        match self.node.ty() {
            Type::Stmt0 => self.node.op0().map(|o| o.mnemonic()),
            Type::Stmt1 => self.node.op_stmt1().map(|o| o.mnemonic()),
            Type::Stmt2 => self.node.op_stmt2().map(|o| o.mnemonic()),
            Type::Stmt3 => OpStmt3::try_from(op).ok().map(|o| o.mnemonic()),
            Type::Stmt4 => OpStmt4::try_from(op).ok().map(|o| o.mnemonic()),
            Type::StmtN => self.node.op_stmt_n().map(|o| o.mnemonic()),
            Type::Unary => self.node.op1().map(|o| o.mnemonic()),
            Type::Binary => self.node.op2().map(|o| o.mnemonic()),
            Type::Tuple | Type::Call => self.node.op_n().map(|o| o.mnemonic()),
            _ => None,
        }
        .unwrap_or("?")
    }

    // `(op child child…)` on one line.
    fn inline_form(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.mnemonic())?;
        for i in 0..self.node.children(self.code) {
            write!(f, " {}", self.child(i))?;
        }
        f.write_char(')')
    }

    // `(op\n    child\n    child…)` with every child indented one level.
    fn block_form(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.mnemonic())?;
        for i in 0..self.node.children(self.code) {
            self.newline(f, self.indent + 1)?;
            write!(f, "{}", self.at(self.node.child(self.code, i), self.indent + 1))?;
        }
        f.write_char(')')
    }

    fn write_const(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let Some(imm) = self.node.imm(self.code) else {
            return f.write_char('?');
        };
        match imm.kind() {
            Kind::Bool => f.write_str(if imm.as_bool() { "true" } else { "false" }),
            Kind::Float32 => write!(f, "{}", f32::from_bits(imm.bits() as u32)),
            Kind::Float64 => write!(f, "{}", f64::from_bits(imm.bits())),
            kind if kind.is_signed() => write!(f, "{}", imm.as_i64()),
            _ => write!(f, "{}", imm.as_u64()),
        }
    }
}

impl Display for DisplayNode<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let node = self.node;
        let code = self.code;
        match node.ty() {
            Type::Var => {
                // Var ids print in lowercase hex: the first local is var1000.
                let var = Var::downcast(node).expect("type checked");
                write!(f, "var{:x}{}", var.id(code), var.kind().suffix())
            }
            Type::Label => {
                let label = Label::downcast(node).expect("type checked");
                write!(f, "label_{}", label.index())
            }
            Type::Const => self.write_const(f),
            Type::Name => {
                let name = Name::downcast(node).expect("type checked");
                write!(f, "\"{}\"", name.to_string(code))
            }
            Type::Ftype => f.write_str("(ftype)"),
            Type::Stmt0 => match node.op0() {
                Some(Op0::Bad) | None => f.write_str("(?)"),
                Some(op) => write!(f, "({})", op.mnemonic()),
            },
            Type::Mem => write!(f, "(mem {})", self.child(0)),
            Type::Stmt1 | Type::Stmt2 | Type::Unary | Type::Binary | Type::Tuple => {
                self.inline_form(f)
            }
            Type::Call => {
                // Child 0 is the function type; the printed form starts at
                // the callee label.
                write!(f, "(call {}", self.child(1))?;
                for i in 2..node.children(code) {
                    write!(f, " {}", self.child(i))?;
                }
                f.write_char(')')
            }
            Type::Stmt3 => {
                // (if cond\n    then[\n    else])
                write!(f, "({} {}", self.mnemonic(), self.child(0))?;
                self.newline(f, self.indent + 1)?;
                write!(f, "{}", self.at(node.child(code, 1), self.indent + 1))?;
                let else_ = node.child(code, 2);
                if else_.is_valid() {
                    self.newline(f, self.indent + 1)?;
                    write!(f, "{}", self.at(else_, self.indent + 1))?;
                }
                f.write_char(')')
            }
            Type::Stmt4 => {
                // (for init test post\n    body)
                write!(
                    f,
                    "({} {} {} {}",
                    self.mnemonic(),
                    self.child(0),
                    self.child(1),
                    self.child(2)
                )?;
                self.newline(f, self.indent + 1)?;
                write!(f, "{}", self.at(node.child(code, 3), self.indent + 1))?;
                f.write_char(')')
            }
            Type::StmtN => match node.op_stmt_n() {
                Some(OpStmtN::Block | OpStmtN::Cond | OpStmtN::Switch) => self.block_form(f),
                Some(OpStmtN::AssignCall) => {
                    // Destinations then the call, all inline: (= dst (call …))
                    self.inline_form(f)
                }
                Some(OpStmtN::Return | OpStmtN::X86Ret) | None => self.inline_form(f),
            },
        }
    }
}
