//! Expression lowering.
//!
//! Compiled expressions are at most one operator deep: operands are
//! hoisted to atoms (vars, constants, labels) via `to_var`, calls are
//! always evaluated into a fresh variable, and the short-circuit
//! operators are rewritten into `If` form before any other pass sees
//! them. Nodes whose operands were already atoms are returned untouched,
//! so recompiling lowered IR is the identity.

use kiln_types::Kind;
use kiln_ir::{Func, Node, Op1, Op2, OpStmt2, Type};

use crate::error::ErrorKind;
use crate::optimizer::{self, Opt};

use super::Compiler;

impl Compiler {
    /// Lower one expression, emitting hoisted temporaries as a side
    /// effect, and return the (at most one operator deep) replacement.
    pub(crate) fn expr(&mut self, func: &mut Func, node: Node) -> Node {
        match node.ty() {
            Type::Var | Type::Const | Type::Label => node,
            Type::Unary => self.unary(func, node),
            Type::Binary => self.binary(func, node),
            Type::Mem => self.mem(func, node),
            Type::Call => {
                let call = self.compile_call(func, node);
                self.call_to_var(func, call)
            }
            Type::Tuple => self.tuple(func, node),
            _ => {
                self.error(node, ErrorKind::MalformedIr("expected an expression"));
                node
            }
        }
    }

    fn unary(&mut self, func: &mut Func, node: Node) -> Node {
        let Some(op) = node.op1() else {
            self.error(node, ErrorKind::MalformedIr("op out of range"));
            return node;
        };
        let child = node.child(func.code(), 0);
        let x = self.expr(func, child);
        let x = self.to_var(func, x);

        if self.flags.contains(Opt::FOLD_CONSTANTS) {
            if let Some(imm) = optimizer::fold_unary(func.code(), op, node.kind(), x) {
                return func.new_imm(imm);
            }
        }
        if x == child {
            return node;
        }
        match op {
            Op1::Cast => func.new_cast(node.kind(), x),
            _ => func.new_unary(op, x),
        }
    }

    fn binary(&mut self, func: &mut Func, node: Node) -> Node {
        let Some(op) = node.op2() else {
            self.error(node, ErrorKind::MalformedIr("op out of range"));
            return node;
        };
        let x0 = node.child(func.code(), 0);
        let y0 = node.child(func.code(), 1);

        // Short-circuit rewriting happens before anything else, so later
        // passes only ever see data-flow operators.
        match op {
            Op2::Land => return self.short_circuit(func, x0, y0, true),
            Op2::Lor => return self.short_circuit(func, x0, y0, false),
            _ => {}
        }

        let x = self.expr(func, x0);
        let x = self.to_var(func, x);
        let y = self.expr(func, y0);
        let y = self.to_var(func, y);

        if self.flags.contains(Opt::FOLD_CONSTANTS) {
            if let Some(imm) = optimizer::fold_binary(func.code(), op, x, y) {
                return func.new_imm(imm);
            }
        }
        if self.flags.contains(Opt::SIMPLIFY_ALGEBRAIC) {
            if let Some(simplified) = optimizer::simplify_binary(func.code(), op, x, y) {
                return simplified;
            }
        }
        if x == x0 && y == y0 {
            return node;
        }
        func.new_binary(op, x, y)
    }

    /// `x && y` is `if x { v = y } else { v = false }`;
    /// `x || y` is `if x { v = true } else { v = y }`.
    fn short_circuit(&mut self, func: &mut Func, x: Node, y: Node, is_and: bool) -> Node {
        let var = func.new_var(Kind::Bool);
        let (then_src, else_src) = if is_and {
            (y, Node::FALSE)
        } else {
            (Node::TRUE, y)
        };
        let then = func.new_assign(OpStmt2::Assign, var, then_src);
        let else_ = func.new_assign(OpStmt2::Assign, var, else_src);
        let if_ = func.new_if(x, then, Some(else_));
        self.stmt(func, if_);
        var
    }

    fn mem(&mut self, func: &mut Func, node: Node) -> Node {
        let child = node.child(func.code(), 0);
        let address = self.expr(func, child);
        let address = self.to_var(func, address);
        if address == child {
            return node;
        }
        func.new_mem(node.kind(), address)
    }

    fn tuple(&mut self, func: &mut Func, node: Node) -> Node {
        let Some(op) = node.op_n() else {
            self.error(node, ErrorKind::MalformedIr("op out of range"));
            return node;
        };
        let count = node.children(func.code());
        let mut children = Vec::new();
        if children.try_reserve(count as usize).is_err() {
            self.out_of_memory(node);
            return node;
        }
        let mut changed = false;
        for i in 0..count {
            let child = node.child(func.code(), i);
            let lowered = self.expr(func, child);
            let lowered = self.to_var(func, lowered);
            changed |= lowered != child;
            children.push(lowered);
        }
        if !changed {
            return node;
        }
        func.new_tuple(op, node.kind(), &children)
    }

    /// Lower an expression whose value is discarded (an expression in
    /// statement position). Only the calls inside it, and the control
    /// flow guarding them, are emitted: no temporaries are hoisted and
    /// the unused combination is never stored anywhere.
    pub(crate) fn discard_expr(&mut self, func: &mut Func, node: Node) {
        match node.ty() {
            Type::Var | Type::Const | Type::Label => {}
            Type::Call => {
                let call = self.compile_call(func, node);
                let stmt = func.new_assign_call(&[], call);
                self.add(func, stmt);
            }
            Type::Unary | Type::Mem => {
                let child = node.child(func.code(), 0);
                self.discard_expr(func, child);
            }
            Type::Binary => {
                let x = node.child(func.code(), 0);
                let y = node.child(func.code(), 1);
                match node.op2() {
                    // A discarded short-circuit still guards its right
                    // operand's effects.
                    Some(op @ (Op2::Land | Op2::Lor)) => {
                        let l_end = func.new_label();
                        self.jump_if(func, x, l_end, op == Op2::Lor);
                        self.discard_expr(func, y);
                        self.add(func, l_end);
                    }
                    Some(_) => {
                        self.discard_expr(func, x);
                        self.discard_expr(func, y);
                    }
                    None => self.error(node, ErrorKind::MalformedIr("op out of range")),
                }
            }
            Type::Tuple => {
                let count = node.children(func.code());
                for i in 0..count {
                    let child = node.child(func.code(), i);
                    self.discard_expr(func, child);
                }
            }
            _ => self.error(node, ErrorKind::MalformedIr("expected an expression")),
        }
    }

    /// Lower a call's arguments to atoms, returning the (possibly new)
    /// call node. The caller decides where the result goes.
    pub(crate) fn compile_call(&mut self, func: &mut Func, node: Node) -> Node {
        let count = node.children(func.code());
        if count < 2 {
            self.error(node, ErrorKind::MalformedIr("call without callee"));
            return node;
        }
        let ftype = node.child(func.code(), 0);
        let callee = node.child(func.code(), 1);

        let mut args = Vec::new();
        if args.try_reserve(count as usize - 2).is_err() {
            self.out_of_memory(node);
            return node;
        }
        let mut changed = false;
        for i in 2..count {
            let arg = node.child(func.code(), i);
            let lowered = self.expr(func, arg);
            let lowered = self.to_var(func, lowered);
            changed |= lowered != arg;
            args.push(lowered);
        }
        if !changed {
            return node;
        }
        func.new_call(ftype, callee, &args)
    }

    /// A call in expression position is always evaluated into a fresh
    /// variable.
    fn call_to_var(&mut self, func: &mut Func, call: Node) -> Node {
        let var = func.new_var(call.kind());
        let stmt = func.new_assign_call(&[var], call);
        self.add(func, stmt);
        var
    }
}
