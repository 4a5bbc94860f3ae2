use core::fmt::Display;
use core::fmt::Formatter;
use core::num::NonZeroU16;

/// Opaque handle assigned to an attribute by the BLE stack when the attribute table is
/// registered.  Handle `0x0000` is reserved by ATT, hence the non-zero representation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttributeHandle(pub NonZeroU16);

impl AttributeHandle {
  pub fn from_raw(raw: u16) -> Option<Self> {
    NonZeroU16::new(raw).map(Self)
  }

  pub fn raw(&self) -> u16 {
    self.0.get()
  }
}

impl Display for AttributeHandle {
  fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
    write!(f, "0x{:04x}", self.0.get())
  }
}
