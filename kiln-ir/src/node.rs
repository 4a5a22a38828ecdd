use kiln_types::Kind;

use crate::code::{Code, Offset};
use crate::header::{Header, Type};
use crate::op::{Op0, Op1, Op2, OpN, OpStmt1, OpStmt2, OpStmt3, OpStmt4, OpStmtN};
use crate::unpack::{self, ChildSlot};
use crate::Imm;

/// Payload of a [`Node`]: either self-describing or a byte offset into the
/// node's `Code` holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Slot {
    /// The node is fully described by header plus this item; no `Code`
    /// context is needed. The value is the node's child-slot encoding.
    Direct(u32),
    /// Byte offset of the node's header inside its `Code` holder.
    Offset(Offset),
}

/// Lightweight handle to one IR node.
///
/// A `Node` is a `Copy` value of header plus payload. It deliberately does
/// not carry a reference to its `Code`: operations that read children or
/// tail data take the holder as an explicit context argument, which keeps
/// handles free of lifetimes while the holder is still being appended to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Node {
    header: Header,
    slot: Slot,
}

impl Node {
    /// The invalid node, returned by failed factories. Encodes as the
    /// `BadStmt` child slot.
    pub const INVALID: Node = Node {
        header: Header::INVALID,
        slot: Slot::Direct(0),
    };

    /// The `break` statement. Always direct.
    pub const BREAK: Node = Node::stmt0(Op0::Break);

    /// The `continue` statement. Always direct.
    pub const CONTINUE: Node = Node::stmt0(Op0::Continue);

    /// The `fallthrough` statement. Always direct.
    pub const FALLTHROUGH: Node = Node::stmt0(Op0::Fallthrough);

    /// The Bool constant `true`. Always direct.
    pub const TRUE: Node = match Node::imm_direct(Imm::new(Kind::Bool, 1)) {
        Some(node) => node,
        None => Node::INVALID,
    };

    /// The Bool constant `false`. Always direct.
    pub const FALSE: Node = match Node::imm_direct(Imm::new(Kind::Bool, 0)) {
        Some(node) => node,
        None => Node::INVALID,
    };

    /// Construct a zero-child statement. These are always direct.
    pub const fn stmt0(op: Op0) -> Node {
        Node {
            header: Header::new(Type::Stmt0, Kind::Void, op as u16),
            slot: Slot::Direct(op as u16 as u32),
        }
    }

    /// Construct a direct constant, if the value fits a direct slot.
    pub fn from_imm(imm: Imm) -> Option<Node> {
        imm.direct_item().map(|item| Node {
            header: Header::new(Type::Const, imm.kind(), 0),
            slot: Slot::Direct(item),
        })
    }

    // Const-context twin of `from_imm`, for the TRUE/FALSE constants.
    const fn imm_direct(imm: Imm) -> Option<Node> {
        let kind = imm.kind();
        if kind.is_float() || matches!(kind, Kind::Bad | Kind::Void) {
            return None;
        }
        let payload = (imm.bits() as u32) & ((1 << crate::pack::CONST_PAYLOAD_BITS) - 1);
        if payload as u64 != imm.bits() {
            return None;
        }
        Some(Node {
            header: Header::new(Type::Const, kind, 0),
            slot: Slot::Direct(1 | (kind as u32) << 1 | payload << 5),
        })
    }

    pub(crate) const fn direct(header: Header, item: u32) -> Node {
        Node {
            header,
            slot: Slot::Direct(item),
        }
    }

    pub(crate) const fn indirect(header: Header, offset: Offset) -> Node {
        Node {
            header,
            slot: Slot::Offset(offset),
        }
    }

    /// Node header.
    pub const fn header(&self) -> Header {
        self.header
    }

    /// Node type.
    pub const fn ty(&self) -> Type {
        self.header.ty()
    }

    /// Node kind.
    pub const fn kind(&self) -> Kind {
        self.header.kind()
    }

    /// Raw 16-bit op field.
    pub const fn op_raw(&self) -> u16 {
        self.header.op()
    }

    /// True unless this is the invalid node / `BadStmt` placeholder.
    pub const fn is_valid(&self) -> bool {
        !matches!(self.ty(), Type::Stmt0) || self.op_raw() != Op0::Bad as u16
    }

    /// True if the node needs no `Code` context.
    pub const fn is_direct(&self) -> bool {
        matches!(self.slot, Slot::Direct(_))
    }

    /// Byte offset of an indirect node inside its holder.
    pub const fn offset(&self) -> Option<Offset> {
        match self.slot {
            Slot::Direct(_) => None,
            Slot::Offset(offset) => Some(offset),
        }
    }

    /// True for expression nodes (`Var..=Const`).
    pub const fn is_expr(&self) -> bool {
        self.ty().is_expr()
    }

    /// True for the atoms of compiled IR: vars, constants and labels.
    pub const fn is_atom(&self) -> bool {
        matches!(self.ty(), Type::Var | Type::Const | Type::Label)
    }

    /// Unified tree API: number of children.
    pub fn children(&self, code: &Code) -> u32 {
        match self.slot {
            Slot::Direct(_) => 0,
            Slot::Offset(offset) => match self.ty().fixed_children() {
                Some(n) => n,
                None => code.get(offset.wrapping_add(4)),
            },
        }
    }

    /// Unified tree API: the i-th child, decoded from its slot item.
    /// Out-of-range indices and corrupt slots yield [`Node::INVALID`].
    pub fn child(&self, code: &Code, i: u32) -> Node {
        if i >= self.children(code) {
            return Node::INVALID;
        }
        let offset = match self.slot {
            Slot::Direct(_) => return Node::INVALID,
            Slot::Offset(offset) => offset,
        };
        // Child slots start after the header, or after the header and the
        // count item for list types.
        let skip = if self.ty().is_list() { 2 } else { 1 };
        let item = code.get(offset.wrapping_add(4 * (i + skip)));

        match unpack::classify(item) {
            ChildSlot::Stmt0(op) => Node::direct(Header::new(Type::Stmt0, Kind::Void, op), item),
            ChildSlot::Const(kind, item) => {
                Node::direct(Header::new(Type::Const, kind, 0), item)
            }
            ChildSlot::Var(kind, item) => Node::direct(Header::new(Type::Var, kind, 0), item),
            ChildSlot::Offset(delta) => {
                let child_offset = offset.wrapping_add(delta);
                let header_item = code.get(child_offset);
                if Header::is_header_item(header_item) {
                    Node::indirect(Header::from_item(header_item), child_offset)
                } else {
                    Node::INVALID
                }
            }
            ChildSlot::Invalid => Node::INVALID,
        }
    }

    /// Iterate over the children, in order.
    pub fn children_iter<'a>(&self, code: &'a Code) -> Children<'a> {
        Children {
            node: *self,
            code,
            next: 0,
            count: self.children(code),
        }
    }

    /// Size of the node's record, in code items: one header, plus the
    /// count item for list types, plus one slot per child, plus the
    /// per-type tail.
    pub fn size_in_items(&self, code: &Code) -> u32 {
        let children = self.children(code);
        let mut len = 1 + children;
        match self.ty() {
            Type::Var => {
                if !self.is_direct() {
                    len += 1; // id item
                }
            }
            Type::Const => {
                if !self.is_direct() {
                    len += self.kind().bits().div_ceil(32).max(1);
                }
            }
            Type::Label => len += 2, // 64-bit address slot
            Type::Name => len += (self.op_raw() as u32).div_ceil(4),
            Type::Ftype => {
                let op = self.op_raw() as u32;
                len += (op & 0xFF) + (op >> 8);
            }
            ty if ty.is_list() => len += 1, // child count item
            _ => {}
        }
        len
    }

    /// Size of the node's record, in bytes.
    pub fn len_bytes(&self, code: &Code) -> u32 {
        self.size_in_items(code) * 4
    }

    /// The item this node contributes when written into a parent's child
    /// slot at `parent_offset`.
    pub(crate) fn slot_item(&self, parent_offset: Offset) -> u32 {
        match self.slot {
            Slot::Direct(item) => item,
            Slot::Offset(offset) => offset.wrapping_sub(parent_offset),
        }
    }

    /// Downcast the op field. `None` when the type does not match or the
    /// op is out of range for its family.
    pub fn op0(&self) -> Option<Op0> {
        matches!(self.ty(), Type::Stmt0).then(|| Op0::try_from(self.op_raw()).ok())?
    }

    /// See [`Self::op0`].
    pub fn op1(&self) -> Option<Op1> {
        matches!(self.ty(), Type::Unary).then(|| Op1::try_from(self.op_raw()).ok())?
    }

    /// See [`Self::op0`].
    pub fn op2(&self) -> Option<Op2> {
        matches!(self.ty(), Type::Binary).then(|| Op2::try_from(self.op_raw()).ok())?
    }

    /// See [`Self::op0`].
    pub fn op_n(&self) -> Option<OpN> {
        matches!(self.ty(), Type::Tuple | Type::Call).then(|| OpN::try_from(self.op_raw()).ok())?
    }

    /// See [`Self::op0`].
    pub fn op_stmt1(&self) -> Option<OpStmt1> {
        matches!(self.ty(), Type::Stmt1).then(|| OpStmt1::try_from(self.op_raw()).ok())?
    }

    /// See [`Self::op0`].
    pub fn op_stmt2(&self) -> Option<OpStmt2> {
        matches!(self.ty(), Type::Stmt2).then(|| OpStmt2::try_from(self.op_raw()).ok())?
    }

    /// See [`Self::op0`].
    pub fn op_stmt3(&self) -> Option<OpStmt3> {
        matches!(self.ty(), Type::Stmt3).then(|| OpStmt3::try_from(self.op_raw()).ok())?
    }

    /// See [`Self::op0`].
    pub fn op_stmt4(&self) -> Option<OpStmt4> {
        matches!(self.ty(), Type::Stmt4).then(|| OpStmt4::try_from(self.op_raw()).ok())?
    }

    /// See [`Self::op0`].
    pub fn op_stmt_n(&self) -> Option<OpStmtN> {
        matches!(self.ty(), Type::StmtN).then(|| OpStmtN::try_from(self.op_raw()).ok())?
    }

    /// Decode this node as a constant value.
    pub fn imm(&self, code: &Code) -> Option<Imm> {
        if !matches!(self.ty(), Type::Const) {
            return None;
        }
        Some(match self.slot {
            Slot::Direct(item) => Imm::from_direct(item),
            Slot::Offset(offset) => {
                Imm::parse_indirect(self.kind(), code, offset.wrapping_add(4))
            }
        })
    }
}

impl Default for Node {
    fn default() -> Self {
        Node::INVALID
    }
}

/// Iterator over a node's children.
#[derive(Debug, Clone)]
pub struct Children<'a> {
    node: Node,
    code: &'a Code,
    next: u32,
    count: u32,
}

impl Iterator for Children<'_> {
    type Item = Node;

    fn next(&mut self) -> Option<Node> {
        if self.next >= self.count {
            return None;
        }
        let child = self.node.child(self.code, self.next);
        self.next += 1;
        Some(child)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let rem = (self.count - self.next) as usize;
        (rem, Some(rem))
    }
}

impl ExactSizeIterator for Children<'_> {}
