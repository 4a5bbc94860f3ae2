//! Resolution of stack-assigned handles to the attributes the dispatcher serves.

use core::fmt::{Display, Formatter};

use enumset::EnumSet;

use crate::descriptors::*;
use crate::thermometer::schema::{TEMPERATURE_UUID, UNIT_UUID};

/// Attributes with behaviour attached.  Declarations are served by the stack itself.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum AttributeId {
  TemperatureValue,
  TemperatureConfig,
  TemperatureFormat,
  UnitValue,
  UnitDescription,
}

impl AttributeId {
  pub const ALL: [AttributeId; 5] = [
    AttributeId::TemperatureValue,
    AttributeId::TemperatureConfig,
    AttributeId::TemperatureFormat,
    AttributeId::UnitValue,
    AttributeId::UnitDescription,
  ];

  pub fn uuid(self) -> UUID {
    match (self.characteristic(), self.descriptor()) {
      (_, Some(descriptor)) => descriptor,
      (characteristic, None) => characteristic,
    }
  }

  /// Characteristic owning this attribute.
  fn characteristic(self) -> UUID {
    match self {
      AttributeId::TemperatureValue
      | AttributeId::TemperatureConfig
      | AttributeId::TemperatureFormat => TEMPERATURE_UUID,
      AttributeId::UnitValue | AttributeId::UnitDescription => UNIT_UUID,
    }
  }

  fn descriptor(self) -> Option<UUID> {
    match self {
      AttributeId::TemperatureValue | AttributeId::UnitValue => None,
      AttributeId::TemperatureConfig => Some(CLIENT_CHARACTERISTIC_CONFIGURATION),
      AttributeId::TemperatureFormat => Some(CHARACTERISTIC_PRESENTATION_FORMAT),
      AttributeId::UnitDescription => Some(CHARACTERISTIC_USER_DESCRIPTION),
    }
  }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct AttributeEntry {
  pub id: AttributeId,
  pub handle: AttributeHandle,
  pub value_len: ValueLength,
  pub permissions: EnumSet<GattCharacteristicPermission>,
}

impl AttributeEntry {
  pub fn is_writable(&self) -> bool {
    self.permissions.iter().any(GattCharacteristicPermission::grants_write)
  }
}

/// Handles assigned at registration.  Built once from the `ServerStarted` mapping and
/// read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredHandles {
  pub temperature_value: AttributeHandle,
  pub temperature_config: AttributeHandle,
  pub temperature_format: AttributeHandle,
  pub unit_value: AttributeHandle,
  pub unit_description: AttributeHandle,
  entries: [AttributeEntry; 5],
}

impl RegisteredHandles {
  pub fn resolve(
    service: &GattService<'_>,
    mapping: &[(UUID, AttributeHandle)],
  ) -> Result<Self, RegistrationError> {
    let resolve = |id| -> Result<AttributeEntry, RegistrationError> {
      let (value_len, permissions) = schema_entry(service, id)?;
      let handle = unique_handle(mapping, id)?;
      Ok(AttributeEntry { id, handle, value_len, permissions })
    };
    let [a, b, c, d, e] = AttributeId::ALL;
    let entries = [resolve(a)?, resolve(b)?, resolve(c)?, resolve(d)?, resolve(e)?];

    for (i, second) in entries.iter().enumerate() {
      if let Some(first) = entries[..i].iter().find(|entry| entry.handle == second.handle) {
        return Err(RegistrationError::DuplicateHandle {
          handle: second.handle,
          first: first.id,
          second: second.id,
        });
      }
    }

    Ok(Self {
      temperature_value: entries[0].handle,
      temperature_config: entries[1].handle,
      temperature_format: entries[2].handle,
      unit_value: entries[3].handle,
      unit_description: entries[4].handle,
      entries,
    })
  }

  pub fn entry(&self, id: AttributeId) -> &AttributeEntry {
    match id {
      AttributeId::TemperatureValue => &self.entries[0],
      AttributeId::TemperatureConfig => &self.entries[1],
      AttributeId::TemperatureFormat => &self.entries[2],
      AttributeId::UnitValue => &self.entries[3],
      AttributeId::UnitDescription => &self.entries[4],
    }
  }

  pub fn lookup(&self, handle: AttributeHandle) -> Option<&AttributeEntry> {
    self.entries.iter().find(|e| e.handle == handle)
  }

  pub fn entries(&self) -> &[AttributeEntry] {
    &self.entries
  }
}

fn schema_entry(
  service: &GattService<'_>,
  id: AttributeId,
) -> Result<(ValueLength, EnumSet<GattCharacteristicPermission>), RegistrationError> {
  let characteristic = service
    .characteristic(id.characteristic())
    .ok_or(RegistrationError::MissingSchema(id))?;
  match id.descriptor() {
    None => Ok((characteristic.value_len, characteristic.permissions)),
    Some(uuid) => characteristic
      .descriptor(uuid)
      .map(|d| (d.value_len, d.permissions))
      .ok_or(RegistrationError::MissingSchema(id)),
  }
}

fn unique_handle(
  mapping: &[(UUID, AttributeHandle)],
  id: AttributeId,
) -> Result<AttributeHandle, RegistrationError> {
  let uuid = id.uuid();
  let mut matches = mapping.iter().filter(|(u, _)| *u == uuid).map(|(_, h)| *h);
  let handle = matches.next().ok_or(RegistrationError::MissingHandle(id))?;
  if matches.next().is_some() {
    return Err(RegistrationError::AmbiguousUuid(uuid));
  }
  Ok(handle)
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RegistrationError {
  /// The service handed to the stack lacks this attribute.
  MissingSchema(AttributeId),

  /// The stack reported no handle for this attribute.
  MissingHandle(AttributeId),

  /// The stack reported several handles for one UUID.
  AmbiguousUuid(UUID),

  /// Two attributes were assigned the same handle.
  DuplicateHandle {
    handle: AttributeHandle,
    first: AttributeId,
    second: AttributeId,
  },
}

impl Display for RegistrationError {
  fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
    match self {
      RegistrationError::MissingSchema(id) => write!(f, "{id:?} is missing from the service"),
      RegistrationError::MissingHandle(id) => write!(f, "no handle registered for {id:?}"),
      RegistrationError::AmbiguousUuid(uuid) => write!(f, "several handles registered for {uuid}"),
      RegistrationError::DuplicateHandle { handle, first, second } => {
        write!(f, "{first:?} and {second:?} share handle {handle}")
      }
    }
  }
}
