//! Compile diagnostics.

use kiln_ir::Node;

/// What went wrong while lowering a statement or expression.
///
/// Out-of-memory is kept apart from the logical errors: it may have left
/// the function's holder partially written, so callers must treat the
/// whole [`Func`](kiln_ir::Func) as poisoned when they see it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    /// A code append or buffer growth failed. Sticky: the pass keeps
    /// terminating but stops producing output.
    #[error("out of memory")]
    OutOfMemory,
    /// A node whose shape violates its type's arity or whose op is out of
    /// range for its family.
    #[error("malformed IR: {0}")]
    MalformedIr(&'static str),
    /// `break`, `continue` or `fallthrough` with no matching enclosing
    /// construct.
    #[error("unresolved control flow: {0}")]
    UnresolvedControlFlow(&'static str),
    /// A statement with no rule in the x86-64 pass. The statement is
    /// dropped from the lowered body.
    #[error("no x86-64 lowering for this statement")]
    UnsupportedLowering,
}

/// A diagnostic attached to the node that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{kind}")]
pub struct Error {
    node: Node,
    kind: ErrorKind,
}

impl Error {
    /// Attach a kind to the offending node.
    pub const fn new(node: Node, kind: ErrorKind) -> Self {
        Self { node, kind }
    }

    /// The offending node.
    pub const fn node(&self) -> Node {
        self.node
    }

    /// The error kind.
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }
}
