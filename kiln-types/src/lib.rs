//! Atomic value types shared by the Kiln JIT crates.
//!
//! These are the leaf types of the system: the semantic/bit-width tag
//! [`Kind`], the local-variable identifier [`Id`], and the bitsets used by
//! liveness analysis and register allocation ([`BitSet`], [`IdSet`]).

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(unused_must_use)]

extern crate alloc;

mod bitset;
mod id;
mod idset;
mod kind;

pub use bitset::{BitSet, Ones};
pub use id::Id;
pub use idset::IdSet;
pub use kind::Kind;
