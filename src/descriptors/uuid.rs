use core::fmt::{Display, Formatter};

/// Bluetooth SIG base UUID (`00000000-0000-1000-8000-00805F9B34FB`) that 16-bit UUIDs are
/// aliases into.
const BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805f9b34fb;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UUID {
  /// For use only with SIG defined services (i.e. registered and publicly well known services).
  Short(u16),

  /// All other BLE UUIDs must be 128-bit
  Long(u128),
}

impl UUID {
  /// Full 128-bit form, expanding short UUIDs into the SIG base UUID.
  pub fn as_u128(&self) -> u128 {
    match *self {
      UUID::Short(u) => (u128::from(u) << 96) | BASE_UUID,
      UUID::Long(u) => u,
    }
  }

  /// Number of bytes this UUID occupies on the air.
  pub fn encoded_len(&self) -> usize {
    match self {
      UUID::Short(_) => 2,
      UUID::Long(_) => 16,
    }
  }

  /// Little-endian wire form, as used by ATT and advertising payloads.
  pub fn to_le_bytes(&self) -> heapless::Vec<u8, 16> {
    let mut out = heapless::Vec::new();
    let written = match self {
      UUID::Short(u) => out.extend_from_slice(&u.to_le_bytes()),
      UUID::Long(u) => out.extend_from_slice(&u.to_le_bytes()),
    };
    debug_assert!(written.is_ok());
    out
  }

  /// Whether two UUIDs use the same on-air width and so may share an AD record.
  pub fn same_width(&self, other: &UUID) -> bool {
    self.encoded_len() == other.encoded_len()
  }
}

impl Display for UUID {
  fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
    match *self {
      UUID::Short(u) => write!(f, "0x{u:04x}"),
      UUID::Long(u) => write!(
        f,
        "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
        (u >> 96) as u32,
        (u >> 80) as u16,
        (u >> 64) as u16,
        (u >> 48) as u16,
        u & 0xffff_ffff_ffff,
      ),
    }
  }
}
