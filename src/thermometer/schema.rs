//! Static description of the thermometer GATT service.

use enumset::enum_set;

use crate::descriptors::*;
use crate::thermometer::measurement::{PresentationFormat, MEASUREMENT_LEN};

pub const THERMOMETER_SERVICE_UUID: UUID = UUID::Long(0x9941f656_8e3e_11eb_8dcd_0242ac130003);

/// Bluetooth SIG "Temperature" characteristic.
pub const TEMPERATURE_UUID: UUID = UUID::Short(0x2A6E);

pub const UNIT_UUID: UUID = UUID::Long(0x9941fb38_8e3e_11eb_8dcd_0242ac130003);

pub const UNIT_DESCRIPTION: &str = "Temperature unit";

/// Handles the stack has to reserve for [thermometer_service].
pub const ATTRIBUTE_COUNT: u16 = 8;

pub static TEMPERATURE_DESCRIPTORS: [GattDescriptor; 2] = [
  GattDescriptor {
    uuid: CLIENT_CHARACTERISTIC_CONFIGURATION,
    permissions: enum_set!(GattDescriptorPermission::Read | GattDescriptorPermission::Write),
    value_len: ValueLength::exactly(2),
  },
  GattDescriptor {
    uuid: CHARACTERISTIC_PRESENTATION_FORMAT,
    permissions: enum_set!(GattDescriptorPermission::Read),
    value_len: ValueLength::exactly(PresentationFormat::ENCODED_LEN as u16),
  },
];

pub static UNIT_DESCRIPTORS: [GattDescriptor; 1] = [GattDescriptor {
  uuid: CHARACTERISTIC_USER_DESCRIPTION,
  permissions: enum_set!(GattDescriptorPermission::Read),
  value_len: ValueLength::exactly(UNIT_DESCRIPTION.len() as u16),
}];

pub fn thermometer_service() -> GattService<'static> {
  GattService {
    uuid: THERMOMETER_SERVICE_UUID,
    service_type: GattServiceType::Primary,
    characteristics: vec![
      GattCharacteristic {
        uuid: TEMPERATURE_UUID,
        properties: enum_set!(GattCharacteristicProperty::Read | GattCharacteristicProperty::Notify),
        permissions: enum_set!(GattCharacteristicPermission::Read),
        value_len: ValueLength::exactly(MEASUREMENT_LEN as u16),
        descriptors: &TEMPERATURE_DESCRIPTORS,
      },
      GattCharacteristic {
        uuid: UNIT_UUID,
        properties: enum_set!(GattCharacteristicProperty::Read | GattCharacteristicProperty::Write),
        permissions: enum_set!(GattCharacteristicPermission::Read | GattCharacteristicPermission::Write),
        value_len: ValueLength::exactly(1),
        descriptors: &UNIT_DESCRIPTORS,
      },
    ],
  }
}
