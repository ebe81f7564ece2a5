//! Quantised block definitions and layout constants.

use bytemuck::{Pod, Zeroable};
use half::f16;

/// Scalars per quantised block. Every quantised path requires the inner
/// dimension to be a multiple of this.
pub const QK: usize = 32;

/// Non-linear dequantisation table for [`BlockIq4Nl`]: nibble values index
/// into this fixed signed sequence.
pub const IQ4NL_QUANTS: [i8; 16] = [
    -127, -104, -83, -65, -49, -35, -22, -10, 1, 13, 25, 38, 53, 69, 89, 113,
];

/// An 8-bit quantisation block: 32 signed bytes sharing one f16 scale.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockQ8_0 {
    /// The block-specific scale factor.
    pub d: f16,
    /// The quantised 8-bit signed weights.
    pub qs: [i8; QK],
}

/// A 4-bit quantisation block. Each byte packs two nibbles biased by 8:
/// the low nibbles are lanes 0..16, the high nibbles lanes 16..32.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockQ4_0 {
    pub d: f16,
    pub qs: [u8; QK / 2],
}

/// A 5-bit quantisation block: nibbles as in q4_0 plus a 32-bit bank of
/// fifth bits, bit `i` belonging to lane `i`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockQ5_0 {
    pub d: f16,
    pub qh: [u8; 4],
    pub qs: [u8; QK / 2],
}

/// A 4-bit non-linear block: same byte layout as q4_0, but nibbles are
/// indices into [`IQ4NL_QUANTS`] rather than biased values.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockIq4Nl {
    pub d: f16,
    pub qs: [u8; QK / 2],
}

// Compile-time checks against the wire layout.
const _: () = assert!(std::mem::size_of::<BlockQ8_0>() == 34);
const _: () = assert!(std::mem::size_of::<BlockQ4_0>() == 18);
const _: () = assert!(std::mem::size_of::<BlockQ5_0>() == 22);
const _: () = assert!(std::mem::size_of::<BlockIq4Nl>() == 18);
