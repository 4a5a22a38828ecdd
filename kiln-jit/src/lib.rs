//! Lowering pipeline and register allocation for the Kiln JIT.
//!
//! [`Compiler`] consumes a [`kiln_ir::Func`]'s client-built body and
//! produces progressively lower forms: an architecture-neutral body
//! first, then x86-64. [`reg::Allocator`] colors a register interference
//! graph with Chaitin's algorithm. [`asm::Assembler`] collects emitted
//! bytes and back-patches label displacements.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(unused_must_use)]

pub mod asm;
mod compiler;
pub mod error;
mod optimizer;
pub mod reg;

pub use compiler::Compiler;
pub use error::{Error, ErrorKind};
pub use optimizer::Opt;

#[doc(no_inline)]
pub use kiln_ir as ir;
