//! Bit-level decoding of a single base call, shared by the BCL and CBCL readers.

use std::fmt;

/// A called base. A no-call is represented as `None` wherever a `Base` is optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Base {
    A,
    C,
    G,
    T,
}

impl Base {
    /// The two lowest bits select the base
    #[inline]
    fn from_bits(b: u8) -> Base {
        match b & 0b11 {
            0 => Base::A,
            1 => Base::C,
            2 => Base::G,
            _ => Base::T,
        }
    }

    #[inline]
    pub fn as_byte(self) -> u8 {
        match self {
            Base::A => b'A',
            Base::C => b'C',
            Base::G => b'G',
            Base::T => b'T',
        }
    }
}

impl fmt::Display for Base {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_byte() as char)
    }
}

/// byte representation of an optional base call, `N` for a no-call
#[inline]
pub fn call_to_byte(call: Option<Base>) -> u8 {
    call.map_or(b'N', Base::as_byte)
}

/// Decode one byte of a BCL file: zero is a no-call, otherwise the low two
/// bits are the base and the upper six the quality.
#[inline]
pub fn decode_bcl_byte(b: u8) -> Option<Base> {
    if b == 0 {
        None
    } else {
        Some(Base::from_bits(b))
    }
}

/// Decode the call at `position` from a CBCL byte holding two clusters.
/// Even positions live in the low nibble, odd positions in the high nibble.
/// Inside a nibble the layout is the same as a BCL byte: zero is a no-call,
/// otherwise the low two bits are the base.
#[inline]
pub fn decode_packed(b: u8, position: usize) -> Option<Base> {
    let nibble = if position % 2 == 1 { b >> 4 } else { b & 0x0f };
    decode_bcl_byte(nibble)
}
