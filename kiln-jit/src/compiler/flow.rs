//! Statement lowering: dispatch, control-flow flattening and the three
//! keyword stacks.
//!
//! Structured statements are rewritten into labeled straight-line
//! sequences whose only control flow is labels, gotos and the `asm_*`
//! compare/jump pairs. Label allocation order matters: it is part of the
//! stable textual surface the regression tests assert.

use itertools::Itertools;
use kiln_ir::{Func, Node, Op0, OpStmt1, OpStmt2, OpStmtN, Type};

use crate::error::ErrorKind;
use crate::optimizer::Opt;

use super::Compiler;

impl Compiler {
    /// Lower one statement, appending its flattened form to the output.
    pub(crate) fn stmt(&mut self, func: &mut Func, node: Node) {
        match node.ty() {
            Type::Stmt0 => self.stmt0(func, node),
            Type::Stmt1 => self.stmt1(func, node),
            Type::Stmt2 => self.stmt2(func, node),
            Type::Stmt3 => self.if_stmt(func, node),
            Type::Stmt4 => self.for_stmt(func, node),
            Type::StmtN => self.stmt_n(func, node),
            Type::Label => self.add(func, node),
            ty if ty.is_expr() => {
                // Expression in statement position: only its call side
                // effects are emitted. A bare atom is dead code, kept
                // verbatim unless the pass is asked to drop it.
                self.discard_expr(func, node);
                if node.is_atom() && !self.flags.contains(Opt::REMOVE_DEAD_CODE) {
                    self.add(func, node);
                }
            }
            _ => self.error(node, ErrorKind::MalformedIr("not a statement")),
        }
    }

    fn stmt0(&mut self, func: &mut Func, node: Node) {
        match node.op0() {
            Some(Op0::Break) => match self.break_stack.last().copied() {
                Some(label) => {
                    let goto = func.new_goto(label);
                    self.add(func, goto);
                }
                None => self.error(
                    node,
                    ErrorKind::UnresolvedControlFlow("break outside loop or switch"),
                ),
            },
            Some(Op0::Continue) => {
                if self.continue_stack.is_empty() {
                    self.error(
                        node,
                        ErrorKind::UnresolvedControlFlow("continue outside loop"),
                    );
                    return;
                }
                // The label is allocated on first use so loops without a
                // continue keep their label numbering.
                let label = match self.continue_stack.last().copied().flatten() {
                    Some(label) => label,
                    None => {
                        let label = func.new_label();
                        if let Some(slot) = self.continue_stack.last_mut() {
                            *slot = Some(label);
                        }
                        label
                    }
                };
                let goto = func.new_goto(label);
                self.add(func, goto);
            }
            Some(Op0::Fallthrough) => match self.fallthrough_stack.last().copied() {
                Some(label) => {
                    let goto = func.new_goto(label);
                    self.add(func, goto);
                }
                None => self.error(
                    node,
                    ErrorKind::UnresolvedControlFlow("fallthrough outside switch"),
                ),
            },
            _ => self.error(node, ErrorKind::MalformedIr("bad statement")),
        }
    }

    fn stmt1(&mut self, func: &mut Func, node: Node) {
        match node.op_stmt1() {
            Some(OpStmt1::Goto) => self.add(func, node),
            Some(op @ (OpStmt1::Inc | OpStmt1::Dec)) => {
                let target = node.child(func.code(), 0);
                let lowered = self.expr(func, target);
                if lowered == target {
                    self.add(func, node);
                } else {
                    let stmt = func.new_stmt1(op, lowered);
                    self.add(func, stmt);
                }
            }
            Some(OpStmt1::Default) => {
                self.error(node, ErrorKind::MalformedIr("default outside switch"))
            }
            // Already lowered forms pass through untouched.
            Some(_) => self.add(func, node),
            None => self.error(node, ErrorKind::MalformedIr("op out of range")),
        }
    }

    fn stmt2(&mut self, func: &mut Func, node: Node) {
        match node.op_stmt2() {
            Some(op) if op.is_assign() => self.assign_stmt(func, node, op),
            Some(OpStmt2::JumpIf) => {
                let label = node.child(func.code(), 0);
                let cond = node.child(func.code(), 1);
                self.jump_if(func, cond, label, true);
            }
            Some(OpStmt2::Case) => {
                self.error(node, ErrorKind::MalformedIr("case outside switch"))
            }
            Some(_) => self.add(func, node),
            None => self.error(node, ErrorKind::MalformedIr("op out of range")),
        }
    }

    /// Ordering rule: the source is simplified before the destination, so
    /// the source's side effects land before the destination's address
    /// computation.
    fn assign_stmt(&mut self, func: &mut Func, node: Node, op: OpStmt2) {
        let dst0 = node.child(func.code(), 0);
        let src0 = node.child(func.code(), 1);

        // `dst = call(…)` compiles straight into an assign-call rather
        // than bouncing through an extra temporary.
        if op == OpStmt2::Assign
            && matches!(src0.ty(), Type::Call)
            && matches!(dst0.ty(), Type::Var)
        {
            let call = self.compile_call(func, src0);
            let stmt = func.new_assign_call(&[dst0], call);
            self.add(func, stmt);
            return;
        }

        let src = self.expr(func, src0);
        let dst = self.expr(func, dst0);
        if src == src0 && dst == dst0 {
            self.add(func, node);
        } else {
            let stmt = func.new_assign(op, dst, src);
            self.add(func, stmt);
        }
    }

    fn stmt_n(&mut self, func: &mut Func, node: Node) {
        match node.op_stmt_n() {
            Some(OpStmtN::Block) => {
                for i in 0..node.children(func.code()) {
                    let child = node.child(func.code(), i);
                    self.stmt(func, child);
                }
            }
            Some(OpStmtN::Cond) => self.cond_stmt(func, node),
            Some(OpStmtN::Switch) => self.switch_stmt(func, node),
            Some(OpStmtN::AssignCall) => self.assign_call_stmt(func, node),
            Some(OpStmtN::Return) => self.return_stmt(func, node),
            Some(OpStmtN::X86Ret) => self.add(func, node),
            None => self.error(node, ErrorKind::MalformedIr("op out of range")),
        }
    }

    /// `If(c, t, e)` becomes
    /// `jump_if_not(c, l_else); t…; goto l_end; l_else; e…; l_end`.
    fn if_stmt(&mut self, func: &mut Func, node: Node) {
        let cond = node.child(func.code(), 0);
        let then = node.child(func.code(), 1);
        let else_ = node.child(func.code(), 2);

        if else_.is_valid() {
            let l_else = func.new_label();
            let l_end = func.new_label();
            self.jump_if(func, cond, l_else, false);
            self.stmt(func, then);
            let goto = func.new_goto(l_end);
            self.add(func, goto);
            self.add(func, l_else);
            self.stmt(func, else_);
            self.add(func, l_end);
        } else {
            let l_end = func.new_label();
            self.jump_if(func, cond, l_end, false);
            self.stmt(func, then);
            self.add(func, l_end);
        }
    }

    /// Test-at-bottom loop:
    /// `init; goto l_test; l_body; body…; post; l_test; jump_if(test, l_body); l_break`.
    fn for_stmt(&mut self, func: &mut Func, node: Node) {
        let init = node.child(func.code(), 0);
        let test = node.child(func.code(), 1);
        let post = node.child(func.code(), 2);
        let body = node.child(func.code(), 3);

        let l_body = func.new_label();
        let l_test = func.new_label();
        let l_break = func.new_label();

        self.break_stack.push(l_break);
        self.continue_stack.push(None);

        if init.is_valid() {
            self.stmt(func, init);
        }
        if test.is_valid() {
            let goto = func.new_goto(l_test);
            self.add(func, goto);
        }
        self.add(func, l_body);
        self.stmt(func, body);
        // A continue lands between the body and the post statement.
        if let Some(Some(l_continue)) = self.continue_stack.last().copied() {
            self.add(func, l_continue);
        }
        if post.is_valid() {
            self.stmt(func, post);
        }
        if test.is_valid() {
            self.add(func, l_test);
            self.jump_if(func, test, l_body, true);
        } else {
            let goto = func.new_goto(l_body);
            self.add(func, goto);
        }
        self.add(func, l_break);

        self.break_stack.pop();
        self.continue_stack.pop();
    }

    /// Each case compiles to compare + jump-if-not-equal to the next
    /// section; a default in the middle is skipped over with a goto and
    /// entered through its body label once every compare has failed.
    /// Cases break implicitly; `fallthrough` transfers to the next body.
    fn switch_stmt(&mut self, func: &mut Func, node: Node) {
        let count = node.children(func.code());
        if count == 0 {
            self.error(node, ErrorKind::MalformedIr("switch without value"));
            return;
        }
        let l_break = func.new_label();
        self.break_stack.push(l_break);

        let value = node.child(func.code(), 0);
        let value = self.expr(func, value);
        let value = self.to_var(func, value);

        let cases = count - 1;
        let mut section_label: Option<Node> = None;
        let mut body_label: Option<Node> = None;
        let mut default_body: Option<Node> = None;

        for i in 0..cases {
            let case = node.child(func.code(), 1 + i);
            let is_last = i + 1 == cases;
            if let Some(label) = section_label.take() {
                self.add(func, label);
            }
            let this_body = body_label.take();

            if case.op_stmt2() == Some(OpStmt2::Case) {
                let case_value = case.child(func.code(), 0);
                let body = case.child(func.code(), 1);

                let failure = if !is_last {
                    let label = func.new_label();
                    section_label = Some(label);
                    label
                } else {
                    default_body.unwrap_or(l_break)
                };
                let case_value = self.expr(func, case_value);
                let case_value = self.to_var(func, case_value);
                let cmp = func.new_stmt2(OpStmt2::AsmCmp, value, case_value);
                self.add(func, cmp);
                let jne = func.new_stmt1(OpStmt1::AsmJne, failure);
                self.add(func, jne);

                if let Some(label) = this_body {
                    self.add(func, label);
                }
                self.case_body(func, body, is_last, l_break, &mut body_label);
            } else if case.op_stmt1() == Some(OpStmt1::Default) {
                if default_body.is_some() {
                    self.error(case, ErrorKind::MalformedIr("duplicate default"));
                }
                let body = case.child(func.code(), 0);
                if !is_last {
                    let label = func.new_label();
                    section_label = Some(label);
                    let goto = func.new_goto(label);
                    self.add(func, goto);
                }
                let label = this_body.unwrap_or_else(|| func.new_label());
                default_body = Some(label);
                self.add(func, label);
                self.case_body(func, body, is_last, l_break, &mut body_label);
            } else {
                self.error(case, ErrorKind::MalformedIr("expected case or default"));
            }
        }

        self.add(func, l_break);
        self.break_stack.pop();
    }

    /// Compile one case body with its fallthrough target on the stack,
    /// then break implicitly unless this is the last case.
    fn case_body(
        &mut self,
        func: &mut Func,
        body: Node,
        is_last: bool,
        l_break: Node,
        body_label: &mut Option<Node>,
    ) {
        let fallthrough = if !is_last {
            let label = func.new_label();
            *body_label = Some(label);
            label
        } else {
            l_break
        };
        self.fallthrough_stack.push(fallthrough);
        self.stmt(func, body);
        self.fallthrough_stack.pop();
        if !is_last {
            let goto = func.new_goto(l_break);
            self.add(func, goto);
        }
    }

    /// Same shape as a chain of ifs sharing one end label. No peephole
    /// for a literal `true` arm.
    fn cond_stmt(&mut self, func: &mut Func, node: Node) {
        let count = node.children(func.code());
        if count % 2 != 0 {
            self.error(
                node,
                ErrorKind::MalformedIr("cond wants condition/body pairs"),
            );
            return;
        }
        let l_end = func.new_label();
        let pairs = count / 2;
        let mut section_label: Option<Node> = None;

        for (i, (ci, bi)) in (0..count).tuples().enumerate() {
            let cond = node.child(func.code(), ci);
            let body = node.child(func.code(), bi);
            let is_last = i as u32 + 1 == pairs;

            if let Some(label) = section_label.take() {
                self.add(func, label);
            }
            let failure = if is_last {
                l_end
            } else {
                let label = func.new_label();
                section_label = Some(label);
                label
            };
            self.jump_if(func, cond, failure, false);
            self.stmt(func, body);
            if !is_last {
                let goto = func.new_goto(l_end);
                self.add(func, goto);
            }
        }
        self.add(func, l_end);
    }

    /// Each returned value is routed through the function's result vars;
    /// the emitted `return` always lists exactly those vars.
    fn return_stmt(&mut self, func: &mut Func, node: Node) {
        let count = node.children(func.code());
        if count as usize != func.results().len() {
            self.error(
                node,
                ErrorKind::MalformedIr("wrong number of return values"),
            );
            return;
        }
        for i in 0..count {
            let value = node.child(func.code(), i);
            let value = self.expr(func, value);
            let result = func.result(i as usize);
            if value != result {
                let assign = func.new_assign(OpStmt2::Assign, result, value);
                self.add(func, assign);
            }
        }
        let results = func.results().to_vec();
        let ret = func.new_return(&results);
        self.add(func, ret);
    }

    /// Multi-destination calls evaluate the call once into fresh result
    /// vars, then assign componentwise. A single destination compiles in
    /// place.
    fn assign_call_stmt(&mut self, func: &mut Func, node: Node) {
        let count = node.children(func.code());
        let call = node.child(func.code(), count.wrapping_sub(1));
        if count == 0 || !matches!(call.ty(), Type::Call) {
            self.error(node, ErrorKind::MalformedIr("assign-call without call"));
            return;
        }
        let call = self.compile_call(func, call);
        let dsts = count - 1;

        if dsts == 0 {
            let stmt = func.new_assign_call(&[], call);
            self.add(func, stmt);
        } else if dsts == 1 {
            let dst = node.child(func.code(), 0);
            let stmt = func.new_assign_call(&[dst], call);
            self.add(func, stmt);
        } else {
            let mut fresh = Vec::new();
            if fresh.try_reserve(dsts as usize).is_err() {
                self.out_of_memory(node);
                return;
            }
            for i in 0..dsts {
                let dst = node.child(func.code(), i);
                fresh.push(func.new_var(dst.kind()));
            }
            let stmt = func.new_assign_call(&fresh, call);
            self.add(func, stmt);
            for (i, tmp) in fresh.iter().enumerate() {
                let dst = node.child(func.code(), i as u32);
                let assign = func.new_assign(OpStmt2::Assign, dst, *tmp);
                self.add(func, assign);
            }
        }
    }
}
