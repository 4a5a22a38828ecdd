//! Typed views over [`Node`] for the variants that carry tail data.
//!
//! Downcasting is by type tag: `downcast` returns `None` when the node's
//! type does not match, never panics.

use alloc::string::String;
use alloc::vec::Vec;

use kiln_types::{Id, Kind};

use crate::code::Code;
use crate::header::Type;
use crate::node::Node;
use crate::pack;

/// A local variable reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Var(Node);

impl Var {
    /// Downcast a node. `None` unless the node is a `VAR`.
    pub fn downcast(node: Node) -> Option<Var> {
        matches!(node.ty(), Type::Var).then_some(Var(node))
    }

    /// The underlying node.
    pub const fn node(&self) -> Node {
        self.0
    }

    /// Kind of the variable.
    pub const fn kind(&self) -> Kind {
        self.0.kind()
    }

    /// The variable id. Direct vars decode it from their slot item;
    /// indirect vars read their single tail item.
    pub fn id(&self, code: &Code) -> Id {
        match self.0.offset() {
            None => pack::var_id_from_item(self.0.slot_item(0)),
            Some(offset) => Id::new(code.get(offset.wrapping_add(4))),
        }
    }
}

/// A jump-target placeholder with a reserved 64-bit address slot.
///
/// The label's per-function index lives in the header op field; the
/// address slot is filled by the assembler once the label's byte position
/// is known. The slot stores `position + 1`, so an untouched (all-zero)
/// slot reads as unresolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(Node);

impl Label {
    /// Downcast a node. `None` unless the node is a `LABEL`.
    pub fn downcast(node: Node) -> Option<Label> {
        matches!(node.ty(), Type::Label).then_some(Label(node))
    }

    /// The underlying node.
    pub const fn node(&self) -> Node {
        self.0
    }

    /// Per-function index; `label_0` is the function's own entry.
    pub const fn index(&self) -> u32 {
        self.0.op_raw() as u32
    }

    /// Resolved byte position, if the assembler has marked this label.
    pub fn resolved(&self, code: &Code) -> Option<u64> {
        let offset = self.0.offset()?;
        code.get_u64(offset.wrapping_add(4)).checked_sub(1)
    }

    /// Record the label's byte position inside an emitted buffer.
    pub fn resolve(&self, code: &mut Code, position: u64) {
        if let Some(offset) = self.0.offset() {
            code.set_u64(offset.wrapping_add(4), position.wrapping_add(1));
        }
    }
}

/// A persistent UTF-8 string, used for function and global names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Name(Node);

impl Name {
    /// Downcast a node. `None` unless the node is a `NAME`.
    pub fn downcast(node: Node) -> Option<Name> {
        matches!(node.ty(), Type::Name).then_some(Name(node))
    }

    /// The underlying node.
    pub const fn node(&self) -> Node {
        self.0
    }

    /// String length in bytes.
    pub const fn len(&self) -> u16 {
        self.0.op_raw()
    }

    /// True for the empty string.
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read the string contents out of the holder.
    pub fn to_string(&self, code: &Code) -> String {
        let mut bytes = Vec::with_capacity(self.len() as usize);
        if let Some(offset) = self.0.offset() {
            let items = (self.len() as u32).div_ceil(4);
            for i in 0..items {
                let word = code.get(offset.wrapping_add(4 * (i + 1)));
                bytes.extend_from_slice(&word.to_le_bytes());
            }
        }
        bytes.truncate(self.len() as usize);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

/// A function type: parameter kinds and result kinds.
///
/// The counts are packed into the op field (parameters in the low byte,
/// results in the high byte); the tail holds one item per kind, parameters
/// first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncType(Node);

impl FuncType {
    /// Downcast a node. `None` unless the node is an `FTYPE`.
    pub fn downcast(node: Node) -> Option<FuncType> {
        matches!(node.ty(), Type::Ftype).then_some(FuncType(node))
    }

    /// The underlying node.
    pub const fn node(&self) -> Node {
        self.0
    }

    /// Number of parameters.
    pub const fn param_count(&self) -> u32 {
        (self.0.op_raw() & 0xFF) as u32
    }

    /// Number of results.
    pub const fn result_count(&self) -> u32 {
        (self.0.op_raw() >> 8) as u32
    }

    /// Kind of the i-th parameter, `Bad` when out of range.
    pub fn param_kind(&self, code: &Code, i: u32) -> Kind {
        if i >= self.param_count() {
            return Kind::Bad;
        }
        self.kind_at(code, i)
    }

    /// Kind of the i-th result, `Bad` when out of range.
    pub fn result_kind(&self, code: &Code, i: u32) -> Kind {
        if i >= self.result_count() {
            return Kind::Bad;
        }
        self.kind_at(code, self.param_count() + i)
    }

    fn kind_at(&self, code: &Code, slot: u32) -> Kind {
        match self.0.offset() {
            Some(offset) => {
                Kind::from_u8(code.get(offset.wrapping_add(4 * (slot + 1))) as u8)
            }
            None => Kind::Bad,
        }
    }
}
