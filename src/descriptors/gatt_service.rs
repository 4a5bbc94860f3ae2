use crate::descriptors::gatt_characteristic::GattCharacteristic;
use crate::descriptors::uuid::UUID;

#[derive(Debug, PartialEq)]
pub struct GattService<'a> {
  pub uuid: UUID,
  pub service_type: GattServiceType,
  pub characteristics: Vec<GattCharacteristic<'a>>,
}

impl<'a> GattService<'a> {
  /// Number of attribute table entries the stack must reserve for this service, including
  /// the service declaration itself.
  pub fn attribute_count(&self) -> u16 {
    1 + self
      .characteristics
      .iter()
      .map(GattCharacteristic::attribute_count)
      .sum::<u16>()
  }

  pub fn characteristic(&self, uuid: UUID) -> Option<&GattCharacteristic<'a>> {
    self.characteristics.iter().find(|c| c.uuid == uuid)
  }
}

impl<'a> Default for GattService<'a> {
  fn default() -> Self {
    Self {
      uuid: UUID::Long(0),
      service_type: GattServiceType::Primary,
      characteristics: Vec::new(),
    }
  }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GattServiceType {
  Primary,
  Secondary,
}
