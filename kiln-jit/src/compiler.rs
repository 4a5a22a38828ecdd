//! The lowering pipeline.
//!
//! [`Compiler::compile`] consumes a [`Func`]'s client-built body and
//! produces its architecture-neutral lowered body: structured control
//! flow is flattened into labels, gotos and the `asm_*` compare/jump
//! pseudo-instructions, and every non-trivial subexpression is hoisted
//! into a fresh variable so evaluation order is explicit.
//! [`Compiler::compile_x64`] then materializes that form into `x86_*`
//! statements.

mod expr;
mod flow;
mod x64;

use kiln_types::Kind;
use kiln_ir::{Arch, Func, Node, Op2, OpStmt1, OpStmt2};
use tracing::{debug, warn};

use crate::error::{Error, ErrorKind};
use crate::optimizer::Opt;

/// Lowers function bodies, accumulating diagnostics as it goes.
///
/// The compiler never panics on malformed input: it records an [`Error`]
/// against the offending node and keeps going. Out-of-memory makes it
/// stop producing output but still terminate. One compiler can be reused
/// across functions; each `compile` call starts fresh.
#[derive(Debug, Default)]
pub struct Compiler {
    // Stacks of destination labels for break/continue/fallthrough. The
    // continue slot is allocated lazily so loops without a `continue`
    // keep the label numbering of their source order.
    break_stack: Vec<Node>,
    continue_stack: Vec<Option<Node>>,
    fallthrough_stack: Vec<Node>,
    nodes: Vec<Node>,
    errors: Vec<Error>,
    flags: Opt,
    good: bool,
}

impl Compiler {
    /// Construct an idle compiler.
    pub fn new() -> Self {
        Self {
            good: true,
            ..Self::default()
        }
    }

    /// True unless an allocation failed during the last run. When false,
    /// the function's holder may be partially written and the function
    /// must be treated as poisoned.
    pub const fn ok(&self) -> bool {
        self.good
    }

    /// Diagnostics recorded by the last run.
    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    /// Produce the architecture-neutral lowered body of `func`.
    ///
    /// Returns `true` when the pass finished without diagnostics. If the
    /// function already has a lowered body the call is a no-op.
    pub fn compile(&mut self, func: &mut Func, flags: Opt) -> bool {
        self.reset(flags);
        if func.get_compiled(Arch::NoArch).is_some() {
            return true;
        }
        debug!(target: "kiln::compile", arch = Arch::NoArch.name(), "lowering function");

        let body = func.body();
        if body.is_valid() {
            self.stmt(func, body);
        } else {
            self.error(body, ErrorKind::MalformedIr("function has no body"));
        }
        self.finish(func, Arch::NoArch)
    }

    /// Shared tail of both passes: wrap the accumulated statements into a
    /// block and install it as the lowered body for `arch`.
    fn finish(&mut self, func: &mut Func, arch: Arch) -> bool {
        let block = func.new_block(&self.nodes);
        self.nodes.clear();
        if !func.ok() {
            self.out_of_memory(block);
        }
        func.set_compiled(arch, block);
        debug!(
            target: "kiln::compile",
            arch = arch.name(),
            errors = self.errors.len(),
            "pass done"
        );
        self.good && self.errors.is_empty()
    }

    fn reset(&mut self, flags: Opt) {
        self.break_stack.clear();
        self.continue_stack.clear();
        self.fallthrough_stack.clear();
        self.nodes.clear();
        self.errors.clear();
        self.flags = flags;
        self.good = true;
    }

    // ---- emission -------------------------------------------------------

    /// Append an already lowered statement to the output. Invalid nodes
    /// coming back from factories signal allocation failure.
    fn add(&mut self, func: &Func, node: Node) {
        if !self.good {
            return;
        }
        if !node.is_valid() {
            if !func.ok() {
                self.out_of_memory(node);
            }
            return;
        }
        if self.nodes.try_reserve(1).is_err() {
            self.good = false;
            return;
        }
        self.nodes.push(node);
    }

    fn error(&mut self, node: Node, kind: ErrorKind) {
        warn!(target: "kiln::compile", ?kind, "compile error");
        if self.errors.try_reserve(1).is_err() {
            self.good = false;
            return;
        }
        self.errors.push(Error::new(node, kind));
    }

    fn out_of_memory(&mut self, node: Node) {
        self.good = false;
        if self.errors.try_reserve(1).is_ok() {
            self.errors.push(Error::new(node, ErrorKind::OutOfMemory));
        }
    }

    // ---- hoisting -------------------------------------------------------

    /// Copy an expression's result to a fresh variable. No-op for the
    /// atoms of compiled IR (vars, constants, labels).
    fn to_var(&mut self, func: &mut Func, node: Node) -> Node {
        if node.is_atom() {
            return node;
        }
        let var = func.new_var(node.kind());
        let assign = func.new_assign(OpStmt2::Assign, var, node);
        self.add(func, assign);
        var
    }

    // ---- conditional jumps ----------------------------------------------

    /// Emit `asm_cmp` + conditional jump transferring to `label` when
    /// `cond` is true (`jump_when_true`) or false (`!jump_when_true`).
    ///
    /// Comparison conditions compare their operands directly; anything
    /// else is compared against `false`, so "jump if false" is a `je`.
    fn jump_if(&mut self, func: &mut Func, cond: Node, label: Node, jump_when_true: bool) {
        let cmp_op = cond.op2().filter(|op| op.is_comparison());
        match cmp_op {
            Some(op) => {
                let x = cond.child(func.code(), 0);
                let y = cond.child(func.code(), 1);
                let x = self.expr(func, x);
                let x = self.to_var(func, x);
                let y = self.expr(func, y);
                let y = self.to_var(func, y);
                let cmp = func.new_stmt2(OpStmt2::AsmCmp, x, y);
                self.add(func, cmp);
                let jcc = func.new_stmt1(cond_code(op, x.kind(), jump_when_true), label);
                self.add(func, jcc);
            }
            None => {
                let c = self.expr(func, cond);
                let c = self.to_var(func, c);
                let cmp = func.new_stmt2(OpStmt2::AsmCmp, c, Node::FALSE);
                self.add(func, cmp);
                let cc = if jump_when_true {
                    OpStmt1::AsmJne
                } else {
                    OpStmt1::AsmJe
                };
                let jcc = func.new_stmt1(cc, label);
                self.add(func, jcc);
            }
        }
    }
}

/// Condition-code selection: signedness comes from the left operand's
/// kind (floats compare like unsigned on x86), and jumping on the false
/// branch negates the code.
fn cond_code(op: Op2, kind: Kind, jump_when_true: bool) -> OpStmt1 {
    use OpStmt1::*;
    let signed = kind.is_signed();
    match (op, jump_when_true) {
        (Op2::Eql, true) | (Op2::Neq, false) => AsmJe,
        (Op2::Eql, false) | (Op2::Neq, true) => AsmJne,
        (Op2::Lss, true) | (Op2::Geq, false) => {
            if signed {
                AsmJl
            } else {
                AsmJb
            }
        }
        (Op2::Leq, true) | (Op2::Gtr, false) => {
            if signed {
                AsmJle
            } else {
                AsmJbe
            }
        }
        (Op2::Gtr, true) | (Op2::Leq, false) => {
            if signed {
                AsmJg
            } else {
                AsmJa
            }
        }
        (Op2::Geq, true) | (Op2::Lss, false) => {
            if signed {
                AsmJge
            } else {
                AsmJae
            }
        }
        // Only comparisons reach this table.
        _ => AsmJne,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cond_code_table() {
        // Unsigned family.
        assert_eq!(cond_code(Op2::Gtr, Kind::Uint64, false), OpStmt1::AsmJbe);
        assert_eq!(cond_code(Op2::Lss, Kind::Uint64, true), OpStmt1::AsmJb);
        assert_eq!(cond_code(Op2::Eql, Kind::Uint64, false), OpStmt1::AsmJne);
        // Signed family.
        assert_eq!(cond_code(Op2::Gtr, Kind::Int32, true), OpStmt1::AsmJg);
        assert_eq!(cond_code(Op2::Leq, Kind::Int32, false), OpStmt1::AsmJg);
        assert_eq!(cond_code(Op2::Lss, Kind::Int8, false), OpStmt1::AsmJge);
        // Equality ignores signedness.
        assert_eq!(cond_code(Op2::Neq, Kind::Int64, true), OpStmt1::AsmJne);
        // Floats use the unsigned family.
        assert_eq!(cond_code(Op2::Lss, Kind::Float64, true), OpStmt1::AsmJb);
    }
}
