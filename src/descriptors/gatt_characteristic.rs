use core::ops::RangeInclusive;

use crate::descriptors::gatt_descriptor::GattDescriptor;
use crate::descriptors::uuid::UUID;
use enumset::EnumSet;

#[derive(Debug, PartialEq)]
pub struct GattCharacteristic<'a> {
  pub uuid: UUID,
  pub properties: EnumSet<GattCharacteristicProperty>,
  pub permissions: EnumSet<GattCharacteristicPermission>,

  /// Bounds on the value length.  Writes outside of these bounds are rejected before they
  /// reach application state.
  pub value_len: ValueLength,

  /// Descriptors declared for this characteristic, in registration order.  A characteristic
  /// with [GattCharacteristicProperty::Notify] or [GattCharacteristicProperty::Indicate] must
  /// list its Client Characteristic Configuration descriptor here so that it is assigned a
  /// handle like every other attribute.
  pub descriptors: &'a [GattDescriptor],
}

impl<'a> GattCharacteristic<'a> {
  /// Attributes consumed in the table: the declaration, the value, and each descriptor.
  pub fn attribute_count(&self) -> u16 {
    2 + self.descriptors.len() as u16
  }

  pub fn descriptor(&self, uuid: UUID) -> Option<&'a GattDescriptor> {
    self.descriptors.iter().find(|d| d.uuid == uuid)
  }
}

impl<'a> Default for GattCharacteristic<'a> {
  fn default() -> Self {
    Self {
      uuid: UUID::Long(0),
      properties: EnumSet::new(),
      permissions: EnumSet::new(),
      value_len: ValueLength::ANY,
      descriptors: &[],
    }
  }
}

/// Inclusive `[min, max]` bounds for an attribute value, in bytes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ValueLength {
  pub min: u16,
  pub max: u16,
}

impl ValueLength {
  /// ATT caps attribute values at 512 bytes.
  pub const ANY: ValueLength = ValueLength { min: 0, max: 512 };

  pub const fn exactly(len: u16) -> Self {
    Self { min: len, max: len }
  }

  pub const fn between(min: u16, max: u16) -> Self {
    Self { min, max }
  }

  pub fn contains(&self, len: usize) -> bool {
    self.as_range().contains(&len)
  }

  pub fn as_range(&self) -> RangeInclusive<usize> {
    usize::from(self.min)..=usize::from(self.max)
  }
}

#[derive(Debug, enumset::EnumSetType)]
pub enum GattCharacteristicProperty {
  Broadcast,
  ExtendedProps,

  /// Requires a Client Characteristic Configuration descriptor in
  /// [GattCharacteristic::descriptors].
  Indicate,

  /// Requires a Client Characteristic Configuration descriptor in
  /// [GattCharacteristic::descriptors].
  Notify,

  Read,
  Write,
  WriteSigned,
  WriteNoResponse,
}

#[derive(Debug, enumset::EnumSetType)]
pub enum GattCharacteristicPermission {
  Read,
  ReadEncrypted,
  Write,
  WriteEncrypted,
  WriteEncryptedMitm,
  WriteSigned,
  WriteSignedMitm,
}

impl GattCharacteristicPermission {
  pub fn grants_write(self) -> bool {
    !matches!(self, Self::Read | Self::ReadEncrypted)
  }
}
