//! x86-64 materialization.
//!
//! Consumes a function's architecture-neutral body and rewrites every
//! statement into `x86_*` form: two-address arithmetic, at most one
//! memory operand per instruction, and the `asm_*` compare/jump pairs
//! mapped onto their concrete encodings. Statements with no rule record
//! an error and are dropped; the pass never aborts.

use kiln_ir::{Arch, Func, Node, Op1, Op2, OpStmt1, OpStmt2, OpStmtN, Type};
use tracing::debug;

use crate::error::ErrorKind;
use crate::optimizer::Opt;

use super::{cond_code, Compiler};

impl Compiler {
    /// Produce the x86-64 lowered body of `func`.
    ///
    /// Runs the generic pass first when the function has no
    /// architecture-neutral body yet; a pre-existing x86-64 body makes
    /// the call a no-op. Returns `true` when no diagnostics were
    /// recorded.
    pub fn compile_x64(&mut self, func: &mut Func, flags: Opt) -> bool {
        if !self.compile(func, flags) {
            return false;
        }
        if func.get_compiled(Arch::X64).is_some() {
            return true;
        }
        let Some(body) = func.get_compiled(Arch::NoArch) else {
            self.error(
                Node::INVALID,
                ErrorKind::MalformedIr("missing architecture-neutral body"),
            );
            return false;
        };
        debug!(target: "kiln::compile", arch = Arch::X64.name(), "lowering function");
        self.x64_stmt_list(func, body);
        self.finish(func, Arch::X64)
    }

    fn x64_stmt_list(&mut self, func: &mut Func, block: Node) {
        for i in 0..block.children(func.code()) {
            let child = block.child(func.code(), i);
            self.x64_stmt(func, child);
        }
    }

    fn x64_stmt(&mut self, func: &mut Func, node: Node) {
        match node.ty() {
            Type::Label => self.add(func, node),
            Type::Stmt0 => match node.op0() {
                Some(_) => self.error(
                    node,
                    ErrorKind::UnresolvedControlFlow("keyword survived generic pass"),
                ),
                None => self.error(node, ErrorKind::MalformedIr("op out of range")),
            },
            Type::Stmt1 => self.x64_stmt1(func, node),
            Type::Stmt2 => self.x64_stmt2(func, node),
            Type::StmtN => match node.op_stmt_n() {
                Some(OpStmtN::Block) => self.x64_stmt_list(func, node),
                Some(OpStmtN::Return) => {
                    let values: Vec<Node> = node.children_iter(func.code()).collect();
                    let ret = func.new_stmt_n(OpStmtN::X86Ret, &values);
                    self.add(func, ret);
                }
                Some(OpStmtN::X86Ret) => self.add(func, node),
                Some(_) | None => self.error(node, ErrorKind::UnsupportedLowering),
            },
            _ => self.error(node, ErrorKind::UnsupportedLowering),
        }
    }

    fn x64_stmt1(&mut self, func: &mut Func, node: Node) {
        let child = node.child(func.code(), 0);
        match node.op_stmt1() {
            Some(OpStmt1::Goto) => {
                let jmp = func.new_stmt1(OpStmt1::X86Jmp, child);
                self.add(func, jmp);
            }
            Some(OpStmt1::Inc) => {
                let inc = func.new_stmt1(OpStmt1::X86Inc, child);
                self.add(func, inc);
            }
            Some(OpStmt1::Dec) => {
                let dec = func.new_stmt1(OpStmt1::X86Dec, child);
                self.add(func, dec);
            }
            Some(op) => match asm_to_x86_jcc(op) {
                Some(jcc) => {
                    let stmt = func.new_stmt1(jcc, child);
                    self.add(func, stmt);
                }
                // Already x86 forms pass through; anything else has no rule.
                None if (op as u16) >= (OpStmt1::X86Jmp as u16) => self.add(func, node),
                None => self.error(node, ErrorKind::UnsupportedLowering),
            },
            None => self.error(node, ErrorKind::MalformedIr("op out of range")),
        }
    }

    fn x64_stmt2(&mut self, func: &mut Func, node: Node) {
        match node.op_stmt2() {
            Some(OpStmt2::AsmCmp) => {
                let x = node.child(func.code(), 0);
                let y = node.child(func.code(), 1);
                let y = self.demem(func, x, y);
                let cmp = func.new_stmt2(OpStmt2::X86Cmp, x, y);
                self.add(func, cmp);
            }
            Some(OpStmt2::JumpIf) => self.x64_jump_if(func, node),
            Some(OpStmt2::Assign) => {
                let dst = node.child(func.code(), 0);
                let src = node.child(func.code(), 1);
                self.x64_mov_expand(func, dst, src);
            }
            Some(OpStmt2::RemAssign) => {
                let dst = node.child(func.code(), 0);
                let src = node.child(func.code(), 1);
                self.x64_rem(func, dst, src);
            }
            Some(op) if op.is_assign() => {
                let dst = node.child(func.code(), 0);
                let src = node.child(func.code(), 1);
                let Some(x86) = assign_to_x86(op) else {
                    self.error(node, ErrorKind::UnsupportedLowering);
                    return;
                };
                let src = self.x64_value(func, src);
                let src = self.demem(func, dst, src);
                let stmt = func.new_stmt2(x86, dst, src);
                self.add(func, stmt);
            }
            Some(OpStmt2::Case) => self.error(node, ErrorKind::UnsupportedLowering),
            // Already lowered x86 statements pass through.
            Some(_) => self.add(func, node),
            None => self.error(node, ErrorKind::MalformedIr("op out of range")),
        }
    }

    /// `dst = src` lowers to a move; a one-operator source decomposes
    /// into the two-address form `mov dst, x; op dst, y`.
    fn x64_mov_expand(&mut self, func: &mut Func, dst: Node, src: Node) {
        match src.ty() {
            Type::Var | Type::Const | Type::Label | Type::Mem => {
                let src = self.demem(func, dst, src);
                let mov = func.new_stmt2(OpStmt2::X86Mov, dst, src);
                self.add(func, mov);
            }
            Type::Binary => {
                let Some(x86) = src.op2().and_then(op2_to_x86) else {
                    self.error(src, ErrorKind::UnsupportedLowering);
                    return;
                };
                let x = src.child(func.code(), 0);
                let y = src.child(func.code(), 1);
                let x = self.demem(func, dst, x);
                let mov = func.new_stmt2(OpStmt2::X86Mov, dst, x);
                self.add(func, mov);
                let y = self.demem(func, dst, y);
                let op = func.new_stmt2(x86, dst, y);
                self.add(func, op);
            }
            Type::Unary => {
                let x86 = match src.op1() {
                    Some(Op1::Neg1) => OpStmt1::X86Neg,
                    Some(Op1::Xor1) => OpStmt1::X86Not,
                    // Boolean not and casts need setcc/movzx, outside the
                    // lowered subset.
                    _ => {
                        self.error(src, ErrorKind::UnsupportedLowering);
                        return;
                    }
                };
                let x = src.child(func.code(), 0);
                let x = self.demem(func, dst, x);
                let mov = func.new_stmt2(OpStmt2::X86Mov, dst, x);
                self.add(func, mov);
                let op = func.new_stmt1(x86, dst);
                self.add(func, op);
            }
            _ => self.error(src, ErrorKind::UnsupportedLowering),
        }
    }

    /// `dst %= src` has no single instruction in the lowered subset; it
    /// is synthesized as `t = dst; t /= src; t *= src; dst -= t`.
    fn x64_rem(&mut self, func: &mut Func, dst: Node, src: Node) {
        let src = self.x64_value(func, src);
        let tmp = func.new_var(dst.kind());
        let mov = func.new_stmt2(OpStmt2::X86Mov, tmp, dst);
        self.add(func, mov);
        let div = func.new_stmt2(OpStmt2::X86Div, tmp, src);
        self.add(func, div);
        let mul = func.new_stmt2(OpStmt2::X86Mul, tmp, src);
        self.add(func, mul);
        let sub = func.new_stmt2(OpStmt2::X86Sub, dst, tmp);
        self.add(func, sub);
    }

    /// A `jump_if` reaching this pass (a client-built generic body that
    /// skipped the generic compiler) lowers with the same condition-code
    /// table as the generic pass.
    fn x64_jump_if(&mut self, func: &mut Func, node: Node) {
        let label = node.child(func.code(), 0);
        let cond = node.child(func.code(), 1);
        let cmp_op = cond.op2().filter(|op| op.is_comparison());
        match cmp_op {
            Some(op) => {
                let x = cond.child(func.code(), 0);
                let y = cond.child(func.code(), 1);
                let x = self.x64_value(func, x);
                let y = self.x64_value(func, y);
                let y = self.demem(func, x, y);
                let cmp = func.new_stmt2(OpStmt2::X86Cmp, x, y);
                self.add(func, cmp);
                let cc = asm_to_x86_jcc(cond_code(op, x.kind(), true))
                    .unwrap_or(OpStmt1::X86Jne);
                let jcc = func.new_stmt1(cc, label);
                self.add(func, jcc);
            }
            None => {
                let c = self.x64_value(func, cond);
                let cmp = func.new_stmt2(OpStmt2::X86Cmp, c, Node::FALSE);
                self.add(func, cmp);
                let jcc = func.new_stmt1(OpStmt1::X86Jne, label);
                self.add(func, jcc);
            }
        }
    }

    /// Materialize an expression as a var, constant or single memory
    /// operand, emitting the x86 statements that compute it.
    fn x64_value(&mut self, func: &mut Func, node: Node) -> Node {
        match node.ty() {
            Type::Var | Type::Const | Type::Label | Type::Mem => node,
            Type::Binary => {
                let Some(x86) = node.op2().and_then(op2_to_x86) else {
                    self.error(node, ErrorKind::UnsupportedLowering);
                    return node;
                };
                let x = node.child(func.code(), 0);
                let y = node.child(func.code(), 1);
                let tmp = func.new_var(node.kind());
                let mov = func.new_stmt2(OpStmt2::X86Mov, tmp, x);
                self.add(func, mov);
                let op = func.new_stmt2(x86, tmp, y);
                self.add(func, op);
                tmp
            }
            Type::Unary => {
                let x86 = match node.op1() {
                    Some(Op1::Neg1) => OpStmt1::X86Neg,
                    Some(Op1::Xor1) => OpStmt1::X86Not,
                    _ => {
                        self.error(node, ErrorKind::UnsupportedLowering);
                        return node;
                    }
                };
                let x = node.child(func.code(), 0);
                let tmp = func.new_var(node.kind());
                let mov = func.new_stmt2(OpStmt2::X86Mov, tmp, x);
                self.add(func, mov);
                let op = func.new_stmt1(x86, tmp);
                self.add(func, op);
                tmp
            }
            _ => {
                self.error(node, ErrorKind::UnsupportedLowering);
                node
            }
        }
    }

    /// No instruction takes two memory operands: when `a` is memory and
    /// `b` is too, `b` is forced into a fresh register first.
    fn demem(&mut self, func: &mut Func, a: Node, b: Node) -> Node {
        if matches!(a.ty(), Type::Mem) && matches!(b.ty(), Type::Mem) {
            let tmp = func.new_var(b.kind());
            let mov = func.new_stmt2(OpStmt2::X86Mov, tmp, b);
            self.add(func, mov);
            tmp
        } else {
            b
        }
    }
}

fn assign_to_x86(op: OpStmt2) -> Option<OpStmt2> {
    Some(match op {
        OpStmt2::AddAssign => OpStmt2::X86Add,
        OpStmt2::SubAssign => OpStmt2::X86Sub,
        OpStmt2::MulAssign => OpStmt2::X86Mul,
        OpStmt2::DivAssign => OpStmt2::X86Div,
        OpStmt2::AndAssign => OpStmt2::X86And,
        OpStmt2::OrAssign => OpStmt2::X86Or,
        OpStmt2::XorAssign => OpStmt2::X86Xor,
        OpStmt2::ShlAssign => OpStmt2::X86Shl,
        OpStmt2::ShrAssign => OpStmt2::X86Shr,
        _ => return None,
    })
}

fn op2_to_x86(op: Op2) -> Option<OpStmt2> {
    Some(match op {
        Op2::Add => OpStmt2::X86Add,
        Op2::Sub => OpStmt2::X86Sub,
        Op2::Mul => OpStmt2::X86Mul,
        Op2::Div => OpStmt2::X86Div,
        Op2::And => OpStmt2::X86And,
        Op2::Or => OpStmt2::X86Or,
        Op2::Xor => OpStmt2::X86Xor,
        Op2::Shl => OpStmt2::X86Shl,
        Op2::Shr => OpStmt2::X86Shr,
        _ => return None,
    })
}

fn asm_to_x86_jcc(op: OpStmt1) -> Option<OpStmt1> {
    Some(match op {
        OpStmt1::AsmJa => OpStmt1::X86Ja,
        OpStmt1::AsmJae => OpStmt1::X86Jae,
        OpStmt1::AsmJb => OpStmt1::X86Jb,
        OpStmt1::AsmJbe => OpStmt1::X86Jbe,
        OpStmt1::AsmJe => OpStmt1::X86Je,
        OpStmt1::AsmJg => OpStmt1::X86Jg,
        OpStmt1::AsmJge => OpStmt1::X86Jge,
        OpStmt1::AsmJl => OpStmt1::X86Jl,
        OpStmt1::AsmJle => OpStmt1::X86Jle,
        OpStmt1::AsmJne => OpStmt1::X86Jne,
        _ => return None,
    })
}
