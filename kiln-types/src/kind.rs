use core::fmt;

use strum::EnumIter;

/// Semantic type and bit-width tag attached to every IR node.
///
/// The discriminant is stored in the 8-bit `kind` field of a packed node
/// header, and its numeric order is the total order used by formatters.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Kind {
    /// Sentinel of invalid nodes. Never appears in well-formed IR.
    #[default]
    Bad = 0,
    /// No value.
    Void = 1,
    /// Single-bit truth value.
    Bool = 2,
    /// Signed 8-bit integer.
    Int8 = 3,
    /// Signed 16-bit integer.
    Int16 = 4,
    /// Signed 32-bit integer.
    Int32 = 5,
    /// Signed 64-bit integer.
    Int64 = 6,
    /// Unsigned 8-bit integer.
    Uint8 = 7,
    /// Unsigned 16-bit integer.
    Uint16 = 8,
    /// Unsigned 32-bit integer.
    Uint32 = 9,
    /// Unsigned 64-bit integer.
    Uint64 = 10,
    /// IEEE 754 single precision.
    Float32 = 11,
    /// IEEE 754 double precision.
    Float64 = 12,
    /// IEEE 754 quadruple precision.
    Float128 = 13,
    /// Untyped machine pointer.
    Ptr = 14,
}

impl Kind {
    /// Decode a kind from the 8-bit header field. Unknown values map to
    /// [`Kind::Bad`].
    pub const fn from_u8(val: u8) -> Self {
        match val {
            1 => Self::Void,
            2 => Self::Bool,
            3 => Self::Int8,
            4 => Self::Int16,
            5 => Self::Int32,
            6 => Self::Int64,
            7 => Self::Uint8,
            8 => Self::Uint16,
            9 => Self::Uint32,
            10 => Self::Uint64,
            11 => Self::Float32,
            12 => Self::Float64,
            13 => Self::Float128,
            14 => Self::Ptr,
            _ => Self::Bad,
        }
    }

    /// Storage width of a value of this kind, in bits.
    pub const fn bits(self) -> u32 {
        match self {
            Self::Bad | Self::Void => 0,
            Self::Bool => 1,
            Self::Int8 | Self::Uint8 => 8,
            Self::Int16 | Self::Uint16 => 16,
            Self::Int32 | Self::Uint32 | Self::Float32 => 32,
            Self::Int64 | Self::Uint64 | Self::Float64 | Self::Ptr => 64,
            Self::Float128 => 128,
        }
    }

    /// True for `Int8..Int64`.
    pub const fn is_signed(self) -> bool {
        matches!(self, Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64)
    }

    /// True for `Uint8..Uint64`, `Bool` and `Ptr`.
    pub const fn is_unsigned(self) -> bool {
        matches!(
            self,
            Self::Bool
                | Self::Uint8
                | Self::Uint16
                | Self::Uint32
                | Self::Uint64
                | Self::Ptr
        )
    }

    /// True for any integer kind, signed or unsigned.
    pub const fn is_integer(self) -> bool {
        self.is_signed() || self.is_unsigned()
    }

    /// True for the floating point kinds.
    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64 | Self::Float128)
    }

    /// Suffix appended to variable names by the textual formatter, e.g.
    /// `var1000_ul` for a `Uint64` var.
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Bad => "_?",
            Self::Void => "_v",
            Self::Bool => "_t",
            Self::Int8 => "_b",
            Self::Int16 => "_w",
            Self::Int32 => "_i",
            Self::Int64 => "_l",
            Self::Uint8 => "_ub",
            Self::Uint16 => "_uw",
            Self::Uint32 => "_ui",
            Self::Uint64 => "_ul",
            Self::Float32 => "_f",
            Self::Float64 => "_d",
            Self::Float128 => "_q",
            Self::Ptr => "_p",
        }
    }

    /// Lowercase name, e.g. `"uint64"`.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bad => "bad",
            Self::Void => "void",
            Self::Bool => "bool",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Uint8 => "uint8",
            Self::Uint16 => "uint16",
            Self::Uint32 => "uint32",
            Self::Uint64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Float128 => "float128",
            Self::Ptr => "ptr",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn from_u8_roundtrip() {
        for kind in Kind::iter() {
            assert_eq!(Kind::from_u8(kind as u8), kind);
        }
        assert_eq!(Kind::from_u8(0xff), Kind::Bad);
    }

    #[test]
    fn widths() {
        for kind in Kind::iter() {
            let bits = kind.bits();
            if kind.is_integer() && kind != Kind::Bool {
                assert!(bits.is_power_of_two() && (8..=64).contains(&bits));
            }
        }
        assert_eq!(Kind::Uint64.bits(), 64);
        assert_eq!(Kind::Float128.bits(), 128);
    }

    #[test]
    fn signedness_partition() {
        for kind in Kind::iter() {
            assert!(!(kind.is_signed() && kind.is_unsigned()));
            assert!(!(kind.is_integer() && kind.is_float()));
        }
    }
}
