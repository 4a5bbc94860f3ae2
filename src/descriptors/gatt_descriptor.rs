use enumset::EnumSet;
use crate::descriptors::gatt_characteristic::ValueLength;
use crate::descriptors::uuid::UUID;
use crate::prelude::GattCharacteristicPermission;

/// Client Characteristic Configuration.
pub const CLIENT_CHARACTERISTIC_CONFIGURATION: UUID = UUID::Short(0x2902);

/// Characteristic User Description.
pub const CHARACTERISTIC_USER_DESCRIPTION: UUID = UUID::Short(0x2901);

/// Characteristic Presentation Format.
pub const CHARACTERISTIC_PRESENTATION_FORMAT: UUID = UUID::Short(0x2904);

#[derive(Debug, PartialEq)]
pub struct GattDescriptor {
  pub uuid: UUID,
  pub permissions: EnumSet<GattDescriptorPermission>,
  pub value_len: ValueLength,
}

impl Default for GattDescriptor {
  fn default() -> Self {
    Self {
      uuid: UUID::Long(0),
      permissions: EnumSet::new(),
      value_len: ValueLength::ANY,
    }
  }
}

pub type GattDescriptorPermission = GattCharacteristicPermission;
