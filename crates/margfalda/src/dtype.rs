//! Element-type tags shared with the host.

/// Storage type of an operand, as tagged by the host's tensor metadata.
///
/// The discriminants match the host's on-disk enumeration so the tags can
/// be passed straight through from loaded model metadata.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    F32 = 0,
    F16 = 1,
    Q4_0 = 2,
    Q5_0 = 6,
    Q8_0 = 8,
    Iq4Nl = 20,
    BF16 = 30,
}
