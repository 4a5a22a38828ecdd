//! # The `op_family!` macro
//!
//! Every operator family (one per node arity) is generated from a single
//! table: a docstring, the 16-bit value stored in the node header's `op`
//! field, the variant name, and the mnemonic the textual formatter prints.
//!
//! ```rust,ignore
//! op_family! {
//!     /// Binary operators.
//!     Op2 {
//!         "Integer addition." 0 Add "+",
//!         "Integer subtraction." 1 Sub "-",
//!         // ...
//!     }
//! }
//! ```
//!
//! From each table the macro derives the enum itself, `TryFrom<u16>`
//! (yielding [`InvalidOp`](crate::InvalidOp) for reserved values), the
//! `mnemonic` method and a `Display` impl writing the mnemonic.

macro_rules! op_family {
    (
        $(#[$family_doc:meta])*
        $Family:ident {
            $( $doc:literal $val:literal $Variant:ident $mnemonic:literal, )+
        }
    ) => {
        $(#[$family_doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[repr(u16)]
        pub enum $Family {
            $(
                #[doc = $doc]
                $Variant = $val,
            )+
        }

        impl $Family {
            /// Mnemonic printed by the s-expression formatter.
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $( Self::$Variant => $mnemonic, )+
                }
            }
        }

        impl core::convert::TryFrom<u16> for $Family {
            type Error = $crate::InvalidOp;

            fn try_from(value: u16) -> Result<Self, Self::Error> {
                match value {
                    $( $val => Ok(Self::$Variant), )+
                    _ => Err($crate::InvalidOp),
                }
            }
        }

        impl From<$Family> for u16 {
            fn from(op: $Family) -> u16 {
                op as u16
            }
        }

        impl core::fmt::Display for $Family {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(self.mnemonic())
            }
        }
    };
}

pub(crate) use op_family;
