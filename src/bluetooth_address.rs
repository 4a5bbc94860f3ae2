use core::fmt::{Display, Formatter};

/// 48-bit device address, most significant byte first (the order it is usually printed in).
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BluetoothAddress(pub [u8; 6]);

impl BluetoothAddress {
  /// Build from the little-endian byte order most controllers report addresses in.
  pub fn from_le_bytes(mut bytes: [u8; 6]) -> Self {
    bytes.reverse();
    Self(bytes)
  }
}

impl Display for BluetoothAddress {
  fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
    let [a, b, c, d, e, g] = self.0;
    write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
  }
}
