//! Wire formats for the temperature and unit characteristics.

use core::fmt::{Display, Formatter};

/// Length of an encoded [Measurement].
pub const MEASUREMENT_LEN: usize = 3;

/// Unit in which temperatures are reported.  On the wire this is a single ASCII byte.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Unit {
  #[default]
  Celsius,
  Fahrenheit,
}

impl Unit {
  pub const fn tag(self) -> u8 {
    match self {
      Unit::Celsius => b'C',
      Unit::Fahrenheit => b'F',
    }
  }

  pub const fn from_tag(tag: u8) -> Option<Unit> {
    match tag {
      b'C' => Some(Unit::Celsius),
      b'F' => Some(Unit::Fahrenheit),
      _ => None,
    }
  }

  /// Interpret a byte written by a peer.  Anything other than `'F'` selects Celsius.
  pub const fn coerce(tag: u8) -> Unit {
    match Self::from_tag(tag) {
      Some(unit) => unit,
      None => Unit::Celsius,
    }
  }
}

impl TryFrom<u8> for Unit {
  type Error = DecodeError;

  fn try_from(value: u8) -> Result<Self, Self::Error> {
    Unit::from_tag(value).ok_or(DecodeError::UnknownUnit(value))
  }
}

impl Display for Unit {
  fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
    write!(f, "{}", self.tag() as char)
  }
}

/// A temperature in tenths of a degree, tagged with the unit it is expressed in.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Measurement {
  pub temperature: i16,
  pub unit: Unit,
}

impl Measurement {
  pub const fn new(temperature: i16, unit: Unit) -> Self {
    Self { temperature, unit }
  }

  /// Little-endian temperature followed by the unit tag.
  pub fn encode(&self) -> [u8; MEASUREMENT_LEN] {
    let [lo, hi] = self.temperature.to_le_bytes();
    [lo, hi, self.unit.tag()]
  }

  pub fn decode(raw: &[u8]) -> Result<Self, DecodeError> {
    match *raw {
      [lo, hi, tag] => Ok(Self {
        temperature: i16::from_le_bytes([lo, hi]),
        unit: Unit::try_from(tag)?,
      }),
      _ => Err(DecodeError::WrongLength {
        expected: MEASUREMENT_LEN,
        actual: raw.len(),
      }),
    }
  }
}

impl Display for Measurement {
  fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
    let abs = self.temperature.unsigned_abs();
    let sign = if self.temperature < 0 { "-" } else { "" };
    write!(f, "{sign}{}.{} {}", abs / 10, abs % 10, self.unit)
  }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DecodeError {
  WrongLength { expected: usize, actual: usize },
  UnknownUnit(u8),
}

impl Display for DecodeError {
  fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
    match self {
      DecodeError::WrongLength { expected, actual } => {
        write!(f, "expected {expected} bytes, got {actual}")
      }
      DecodeError::UnknownUnit(tag) => write!(f, "unknown unit tag 0x{tag:02x}"),
    }
  }
}

/// Convert a Celsius reading to Fahrenheit as `C * 9 / 5 + 32`.  The arithmetic is done in
/// 32 bits and the result saturates into `i16`.  The `+ 32` offset is applied to the raw
/// value as-is, so for tenth-degree inputs it adds 3.2 degrees rather than 32.
pub fn to_fahrenheit(celsius: i16) -> i16 {
  let fahrenheit = i32::from(celsius) * 9 / 5 + 32;
  fahrenheit.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

/// Characteristic Presentation Format descriptor value.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PresentationFormat {
  pub format: u8,
  pub exponent: i8,
  pub unit: u16,
  pub namespace: u8,
  pub description: u16,
}

/// Signed 16-bit, exponent -2, degrees Celsius, Bluetooth SIG namespace.
pub const TEMPERATURE_FORMAT: PresentationFormat = PresentationFormat {
  format: 0x0E,
  exponent: -2,
  unit: 0x272F,
  namespace: 0x01,
  description: 0x0000,
};

impl PresentationFormat {
  pub const ENCODED_LEN: usize = 7;

  pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
    let [unit_lo, unit_hi] = self.unit.to_le_bytes();
    let [desc_lo, desc_hi] = self.description.to_le_bytes();
    [
      self.format,
      self.exponent as u8,
      unit_lo,
      unit_hi,
      self.namespace,
      desc_lo,
      desc_hi,
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn encodes_little_endian_with_tag() {
    assert_eq!(Measurement::new(1234, Unit::Celsius).encode(), [0xD2, 0x04, b'C']);
    assert_eq!(Measurement::new(-2, Unit::Fahrenheit).encode(), [0xFE, 0xFF, b'F']);
  }

  #[test]
  fn decode_rejects_bad_input() {
    assert_eq!(
      Measurement::decode(&[0xD2, 0x04, b'F']),
      Ok(Measurement::new(1234, Unit::Fahrenheit))
    );
    assert_eq!(
      Measurement::decode(&[0xD2, 0x04]),
      Err(DecodeError::WrongLength { expected: 3, actual: 2 })
    );
    assert_eq!(
      Measurement::decode(&[0xD2, 0x04, b'K']),
      Err(DecodeError::UnknownUnit(b'K'))
    );
  }

  #[test]
  fn unknown_unit_bytes_coerce_to_celsius() {
    assert_eq!(Unit::coerce(b'F'), Unit::Fahrenheit);
    assert_eq!(Unit::coerce(b'C'), Unit::Celsius);
    assert_eq!(Unit::coerce(b'f'), Unit::Celsius);
    assert_eq!(Unit::coerce(0), Unit::Celsius);
  }

  #[test]
  fn fahrenheit_conversion() {
    assert_eq!(to_fahrenheit(0), 32);
    assert_eq!(to_fahrenheit(1000), 1832);
    assert_eq!(to_fahrenheit(1234), 2253);
    assert_eq!(to_fahrenheit(9999), 18030);
    assert_eq!(to_fahrenheit(i16::MAX), i16::MAX);
    assert_eq!(to_fahrenheit(i16::MIN), i16::MIN);
  }

  #[test]
  fn presentation_format_bytes() {
    assert_eq!(
      TEMPERATURE_FORMAT.encode(),
      [0x0E, 0xFE, 0x2F, 0x27, 0x01, 0x00, 0x00]
    );
  }

  #[test]
  fn display_in_degrees() {
    assert_eq!(Measurement::new(1234, Unit::Celsius).to_string(), "123.4 C");
    assert_eq!(Measurement::new(-5, Unit::Fahrenheit).to_string(), "-0.5 F");
  }
}
