use alloc::vec::Vec;

use kiln_types::{Id, Kind};

use crate::code::{Code, Offset};
use crate::expr::FuncType;
use crate::header::{Header, Type};
use crate::node::Node;
use crate::op::{Op1, Op2, OpN, OpStmt1, OpStmt2, OpStmt3, OpStmt4, OpStmtN};
use crate::{pack, Imm};

/// Architecture tag selecting which lowered body of a [`Func`] to read or
/// write.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Arch {
    /// Architecture-neutral lowered form.
    #[default]
    NoArch = 0,
    /// x86-64 lowered form.
    X64 = 1,
}

impl Arch {
    /// Number of architecture tags.
    pub const COUNT: usize = 2;

    /// Lowercase name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::NoArch => "noarch",
            Self::X64 => "x64",
        }
    }
}

/// A function under construction: a [`Code`] holder, its name and type,
/// parameter and result variables, the client-built body, and one lowered
/// body per [`Arch`].
///
/// All IR nodes of the function are allocated into the holder through the
/// `new_*` factories. A factory that fails to allocate rolls its partial
/// write back, marks the holder out-of-memory and returns
/// [`Node::INVALID`]; the sticky flag is observable through [`Func::ok`].
#[derive(Debug, Clone)]
pub struct Func {
    code: Code,
    name: Node,
    ftype: Node,
    entry: Node,
    params: Vec<Node>,
    results: Vec<Node>,
    body: Node,
    compiled: [Node; Arch::COUNT],
    next_id: Id,
    next_label: u32,
}

impl Func {
    /// Construct a function, allocating its name, type, entry label
    /// (`label_0`) and parameter/result variables into a fresh holder.
    ///
    /// Variable ids are sequential from [`Id::FIRST`]: parameters first,
    /// then results, then locals in creation order.
    pub fn new(name: &str, params: &[Kind], results: &[Kind]) -> Func {
        let mut func = Func {
            code: Code::new(),
            name: Node::INVALID,
            ftype: Node::INVALID,
            entry: Node::INVALID,
            params: Vec::new(),
            results: Vec::new(),
            body: Node::INVALID,
            compiled: [Node::INVALID; Arch::COUNT],
            next_id: Id::FIRST,
            next_label: 0,
        };
        func.name = func.new_name(name);
        func.ftype = func.new_ftype(params, results);
        func.entry = func.new_label();
        if func.params.try_reserve(params.len()).is_err()
            || func.results.try_reserve(results.len()).is_err()
        {
            func.code.set_oom();
            return func;
        }
        for &kind in params {
            let var = func.new_var(kind);
            func.params.push(var);
        }
        for &kind in results {
            let var = func.new_var(kind);
            func.results.push(var);
        }
        func
    }

    /// False once any allocation into the holder has failed. A function
    /// that is not ok is poisoned: its holder may be partially written.
    pub const fn ok(&self) -> bool {
        self.code.ok()
    }

    /// The code holder.
    pub const fn code(&self) -> &Code {
        &self.code
    }

    /// Mutable access to the code holder, for the assembler's label
    /// resolution.
    pub fn code_mut(&mut self) -> &mut Code {
        &mut self.code
    }

    /// The function's name node.
    pub const fn name(&self) -> Node {
        self.name
    }

    /// The function's type node.
    pub const fn ftype(&self) -> Node {
        self.ftype
    }

    /// The function's own entry label, `label_0`. Calls to the function
    /// use this label as the callee.
    pub const fn label(&self) -> Node {
        self.entry
    }

    /// The i-th parameter variable.
    pub fn param(&self, i: usize) -> Node {
        self.params.get(i).copied().unwrap_or(Node::INVALID)
    }

    /// The i-th result variable.
    pub fn result(&self, i: usize) -> Node {
        self.results.get(i).copied().unwrap_or(Node::INVALID)
    }

    /// All parameter variables.
    pub fn params(&self) -> &[Node] {
        &self.params
    }

    /// All result variables.
    pub fn results(&self) -> &[Node] {
        &self.results
    }

    /// The client-built body.
    pub const fn body(&self) -> Node {
        self.body
    }

    /// Install the client-built body.
    pub fn set_body(&mut self, body: Node) {
        self.body = body;
    }

    /// The lowered body for `arch`, if one has been produced.
    pub fn get_compiled(&self, arch: Arch) -> Option<Node> {
        let node = self.compiled[arch as usize];
        node.is_valid().then_some(node)
    }

    /// Replace the lowered body for `arch`.
    pub fn set_compiled(&mut self, arch: Arch, body: Node) {
        self.compiled[arch as usize] = body;
    }

    // ---- factories ------------------------------------------------------

    /// Allocate a fresh variable of the given kind.
    pub fn new_var(&mut self, kind: Kind) -> Node {
        let id = self.next_id;
        self.next_id = id.next();
        let header = Header::new(Type::Var, kind, 0);
        match pack::item_from_var(kind, id) {
            Some(item) => Node::direct(header, item),
            None => {
                let offset = self.code.len();
                let ok =
                    self.code.append_item(header.item()) && self.code.append_item(id.val());
                self.commit(offset, header, ok)
            }
        }
    }

    /// Allocate a fresh label. Indices are sequential per function,
    /// starting at 0 (the function's own entry).
    pub fn new_label(&mut self) -> Node {
        let index = self.next_label;
        if index > u16::MAX as u32 {
            return Node::INVALID;
        }
        self.next_label = index + 1;
        let header = Header::new(Type::Label, Kind::Ptr, index as u16);
        let offset = self.code.len();
        let ok = self.code.append_item(header.item()) && self.code.append_u64(0);
        self.commit(offset, header, ok)
    }

    /// Materialize a constant. Values that fit the direct slot encoding
    /// never touch the holder.
    pub fn new_imm(&mut self, imm: Imm) -> Node {
        match Node::from_imm(imm) {
            Some(node) => node,
            None => {
                let header = Header::new(Type::Const, imm.kind(), 0);
                let offset = self.code.len();
                let ok =
                    self.code.append_item(header.item()) && imm.write_indirect(&mut self.code);
                self.commit(offset, header, ok)
            }
        }
    }

    /// Allocate a persistent string. Fails (returning [`Node::INVALID`])
    /// for strings longer than 65 535 bytes.
    pub fn new_name(&mut self, s: &str) -> Node {
        let bytes = s.as_bytes();
        if bytes.len() > u16::MAX as usize {
            return Node::INVALID;
        }
        let header = Header::new(Type::Name, Kind::Void, bytes.len() as u16);
        let offset = self.code.len();
        let mut ok = self.code.append_item(header.item());
        for chunk in bytes.chunks(4) {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            ok = ok && self.code.append_item(u32::from_le_bytes(word));
        }
        self.commit(offset, header, ok)
    }

    /// Allocate a function type node. At most 255 parameters and 255
    /// results.
    pub fn new_ftype(&mut self, params: &[Kind], results: &[Kind]) -> Node {
        if params.len() > 0xFF || results.len() > 0xFF {
            return Node::INVALID;
        }
        let kind = results.first().copied().unwrap_or(Kind::Void);
        let op = params.len() as u16 | (results.len() as u16) << 8;
        let header = Header::new(Type::Ftype, kind, op);
        let offset = self.code.len();
        let mut ok = self.code.append_item(header.item());
        for &k in params.iter().chain(results) {
            ok = ok && self.code.append_item(k as u32);
        }
        self.commit(offset, header, ok)
    }

    /// Unary expression. The node kind is `Bool` for `!`, otherwise the
    /// operand's kind; use [`Func::new_cast`] for conversions.
    pub fn new_unary(&mut self, op: Op1, x: Node) -> Node {
        let kind = match op {
            Op1::Not1 => Kind::Bool,
            _ => x.kind(),
        };
        self.new_node(Header::new(Type::Unary, kind, op as u16), &[x])
    }

    /// Conversion of `x` to `kind`.
    pub fn new_cast(&mut self, kind: Kind, x: Node) -> Node {
        self.new_node(Header::new(Type::Unary, kind, Op1::Cast as u16), &[x])
    }

    /// Binary expression. Comparisons and short-circuit operators are
    /// `Bool`; everything else takes the left operand's kind.
    pub fn new_binary(&mut self, op: Op2, x: Node, y: Node) -> Node {
        let kind = if op.is_boolean() { Kind::Bool } else { x.kind() };
        self.new_node(Header::new(Type::Binary, kind, op as u16), &[x, y])
    }

    /// Memory dereference of one address expression.
    pub fn new_mem(&mut self, kind: Kind, address: Node) -> Node {
        self.new_node(Header::new(Type::Mem, kind, 0), &[address])
    }

    /// Call expression: children are the function type, the callee label
    /// and the arguments. The node kind is the callee's first result kind.
    pub fn new_call(&mut self, ftype: Node, callee: Node, args: &[Node]) -> Node {
        let kind = match FuncType::downcast(ftype) {
            Some(ft) if ft.result_count() > 0 => ft.result_kind(&self.code, 0),
            Some(_) => Kind::Void,
            None => Kind::Bad,
        };
        let header = Header::new(Type::Call, kind, OpN::Call as u16);
        self.new_list(header, &[&[ftype, callee], args])
    }

    /// Variable-arity expression.
    pub fn new_tuple(&mut self, op: OpN, kind: Kind, children: &[Node]) -> Node {
        self.new_list(Header::new(Type::Tuple, kind, op as u16), &[children])
    }

    /// One-child statement.
    pub fn new_stmt1(&mut self, op: OpStmt1, child: Node) -> Node {
        self.new_node(Header::new(Type::Stmt1, Kind::Void, op as u16), &[child])
    }

    /// Unconditional jump.
    pub fn new_goto(&mut self, label: Node) -> Node {
        self.new_stmt1(OpStmt1::Goto, label)
    }

    /// Increment by one.
    pub fn new_inc(&mut self, expr: Node) -> Node {
        self.new_stmt1(OpStmt1::Inc, expr)
    }

    /// Decrement by one.
    pub fn new_dec(&mut self, expr: Node) -> Node {
        self.new_stmt1(OpStmt1::Dec, expr)
    }

    /// Switch default case.
    pub fn new_default(&mut self, body: Node) -> Node {
        self.new_stmt1(OpStmt1::Default, body)
    }

    /// Two-child statement.
    pub fn new_stmt2(&mut self, op: OpStmt2, x: Node, y: Node) -> Node {
        self.new_node(Header::new(Type::Stmt2, Kind::Void, op as u16), &[x, y])
    }

    /// Assignment; `op` must be `=` or a compound assignment.
    pub fn new_assign(&mut self, op: OpStmt2, dst: Node, src: Node) -> Node {
        debug_assert!(op.is_assign());
        self.new_stmt2(op, dst, src)
    }

    /// Conditional jump: children are the target label and the condition.
    pub fn new_jump_if(&mut self, label: Node, cond: Node) -> Node {
        self.new_stmt2(OpStmt2::JumpIf, label, cond)
    }

    /// Switch case: children are the compared value and the body.
    pub fn new_case(&mut self, value: Node, body: Node) -> Node {
        self.new_stmt2(OpStmt2::Case, value, body)
    }

    /// Conditional statement. A missing else branch is stored as the
    /// `BadStmt` placeholder.
    pub fn new_if(&mut self, cond: Node, then: Node, else_: Option<Node>) -> Node {
        let else_ = else_.unwrap_or(Node::INVALID);
        self.new_node(
            Header::new(Type::Stmt3, Kind::Void, OpStmt3::If as u16),
            &[cond, then, else_],
        )
    }

    /// Loop statement. Absent init/test/post slots are passed as
    /// [`Node::INVALID`].
    pub fn new_for(&mut self, init: Node, test: Node, post: Node, body: Node) -> Node {
        self.new_node(
            Header::new(Type::Stmt4, Kind::Void, OpStmt4::For as u16),
            &[init, test, post, body],
        )
    }

    /// Statement sequence.
    pub fn new_block(&mut self, stmts: &[Node]) -> Node {
        self.new_stmt_n(OpStmtN::Block, stmts)
    }

    /// If/else-if chain; children alternate condition, body.
    pub fn new_cond(&mut self, clauses: &[Node]) -> Node {
        self.new_stmt_n(OpStmtN::Cond, clauses)
    }

    /// Switch statement: the compared value followed by the cases.
    pub fn new_switch(&mut self, value: Node, cases: &[Node]) -> Node {
        let header = Header::new(Type::StmtN, Kind::Void, OpStmtN::Switch as u16);
        self.new_list(header, &[&[value], cases])
    }

    /// Call with destinations: the target variables followed by the call.
    pub fn new_assign_call(&mut self, dsts: &[Node], call: Node) -> Node {
        let header = Header::new(Type::StmtN, Kind::Void, OpStmtN::AssignCall as u16);
        self.new_list(header, &[dsts, &[call]])
    }

    /// Function return.
    pub fn new_return(&mut self, values: &[Node]) -> Node {
        self.new_stmt_n(OpStmtN::Return, values)
    }

    /// Variable-arity statement.
    pub fn new_stmt_n(&mut self, op: OpStmtN, children: &[Node]) -> Node {
        self.new_list(Header::new(Type::StmtN, Kind::Void, op as u16), &[children])
    }

    // ---- writers --------------------------------------------------------

    fn new_node(&mut self, header: Header, children: &[Node]) -> Node {
        let offset = self.code.len();
        let ok = self.code.append_item(header.item()) && self.append_children(offset, children);
        self.commit(offset, header, ok)
    }

    fn new_list(&mut self, header: Header, parts: &[&[Node]]) -> Node {
        let offset = self.code.len();
        let count: u32 = parts.iter().map(|p| p.len() as u32).sum();
        let mut ok = self.code.append_item(header.item()) && self.code.append_item(count);
        for part in parts {
            ok = ok && self.append_children(offset, part);
        }
        self.commit(offset, header, ok)
    }

    fn append_children(&mut self, offset: Offset, children: &[Node]) -> bool {
        children
            .iter()
            .all(|child| self.code.append_item(child.slot_item(offset)))
    }

    fn commit(&mut self, offset: Offset, header: Header, ok: bool) -> Node {
        if ok && self.code.ok() {
            Node::indirect(header, offset)
        } else {
            self.code.truncate(offset);
            self.code.set_oom();
            Node::INVALID
        }
    }
}
