//! Routes reads and writes on registered handles to the measurement state.

use std::sync::Arc;

use log::warn;

use crate::att_error::AttError;
use crate::descriptors::{AttributeHandle, GattCharacteristicPermission};
use crate::thermometer::handles::{AttributeEntry, AttributeId, RegisteredHandles};
use crate::thermometer::measurement::{Unit, TEMPERATURE_FORMAT};
use crate::thermometer::schema::UNIT_DESCRIPTION;
use crate::thermometer::state::{SharedMeasurement, TemperatureSource};

/// Longest attribute value served by the thermometer.
pub const MAX_VALUE_LEN: usize = 20;

pub type AttributeValue = heapless::Vec<u8, MAX_VALUE_LEN>;

/// Effect of an accepted write, for the caller to act on.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
  Unit { unit: Unit, changed: bool },
  ClientConfiguration { notify: bool },
}

pub struct AccessDispatcher<S> {
  handles: RegisteredHandles,
  state: Arc<SharedMeasurement<S>>,
}

impl<S: TemperatureSource> AccessDispatcher<S> {
  pub fn new(handles: RegisteredHandles, state: Arc<SharedMeasurement<S>>) -> Self {
    Self { handles, state }
  }

  pub fn handles(&self) -> &RegisteredHandles {
    &self.handles
  }

  /// Serve a read starting at `offset`.  `notify_state` is the current subscription, which
  /// the Client Characteristic Configuration reflects.
  pub fn read(
    &self,
    handle: AttributeHandle,
    offset: u16,
    notify_state: bool,
  ) -> Result<AttributeValue, AttError> {
    let entry = self.entry(handle)?;
    if !entry
      .permissions
      .iter()
      .any(|p| matches!(p, GattCharacteristicPermission::Read | GattCharacteristicPermission::ReadEncrypted))
    {
      return Err(AttError::ReadNotPermitted);
    }

    let full = self.full_value(entry.id, notify_state)?;
    let offset = usize::from(offset);
    if offset > full.len() {
      return Err(AttError::InvalidOffset);
    }
    AttributeValue::from_slice(&full[offset..]).map_err(|_| AttError::Unlikely)
  }

  /// Apply a write.  Every check happens before anything is mutated.
  pub fn write(
    &self,
    handle: AttributeHandle,
    offset: u16,
    value: &[u8],
  ) -> Result<WriteOutcome, AttError> {
    let entry = self.entry(handle)?;
    if offset != 0 {
      return Err(AttError::InvalidOffset);
    }
    if !entry.is_writable() {
      return Err(AttError::WriteNotPermitted);
    }
    if !entry.value_len.contains(value.len()) {
      return Err(AttError::InvalidAttributeValueLength);
    }

    match entry.id {
      AttributeId::UnitValue => {
        let requested = Unit::coerce(value[0]);
        match self.state.write_unit(requested) {
          Ok(changed) => Ok(WriteOutcome::Unit { unit: requested, changed }),
          Err(e) => {
            // Contention stays local; the peer sees an accepted write.
            warn!("Dropping unit write of {requested}: {e}");
            Ok(WriteOutcome::Unit { unit: self.state.last_known().unit, changed: false })
          }
        }
      }
      AttributeId::TemperatureConfig => Ok(WriteOutcome::ClientConfiguration {
        notify: decode_client_configuration(value)?,
      }),
      AttributeId::TemperatureValue
      | AttributeId::TemperatureFormat
      | AttributeId::UnitDescription => Err(AttError::WriteNotPermitted),
    }
  }

  fn entry(&self, handle: AttributeHandle) -> Result<&AttributeEntry, AttError> {
    self.handles.lookup(handle).ok_or(AttError::InvalidHandle)
  }

  fn full_value(&self, id: AttributeId, notify_state: bool) -> Result<AttributeValue, AttError> {
    let encoded = match id {
      AttributeId::TemperatureValue => AttributeValue::from_slice(&self.state.read_measurement().encode()),
      AttributeId::TemperatureConfig => AttributeValue::from_slice(&encode_client_configuration(notify_state)),
      AttributeId::TemperatureFormat => AttributeValue::from_slice(&TEMPERATURE_FORMAT.encode()),
      AttributeId::UnitValue => AttributeValue::from_slice(&[self.state.unit().tag()]),
      AttributeId::UnitDescription => AttributeValue::from_slice(UNIT_DESCRIPTION.as_bytes()),
    };
    encoded.map_err(|_| AttError::Unlikely)
  }
}

pub fn encode_client_configuration(notify: bool) -> [u8; 2] {
  u16::from(notify).to_le_bytes()
}

/// `0x0001` (notify) and `0x0002` (indicate) enable updates, `0x0000` disables them.
pub fn decode_client_configuration(value: &[u8]) -> Result<bool, AttError> {
  let raw: [u8; 2] = value.try_into().map_err(|_| AttError::InvalidAttributeValueLength)?;
  match u16::from_le_bytes(raw) {
    0x0000 => Ok(false),
    0x0001 | 0x0002 => Ok(true),
    _ => Err(AttError::CccdImproperlyConfigured),
  }
}

#[cfg(test)]
mod tests {
  use core::time::Duration;

  use super::*;
  use crate::descriptors::*;
  use crate::thermometer::schema::*;

  fn handle(raw: u16) -> AttributeHandle {
    AttributeHandle::from_raw(raw).unwrap()
  }

  fn dispatcher(sample: i16) -> AccessDispatcher<impl TemperatureSource> {
    let mapping = [
      (TEMPERATURE_UUID, handle(3)),
      (CLIENT_CHARACTERISTIC_CONFIGURATION, handle(4)),
      (CHARACTERISTIC_PRESENTATION_FORMAT, handle(5)),
      (UNIT_UUID, handle(7)),
      (CHARACTERISTIC_USER_DESCRIPTION, handle(8)),
    ];
    let handles = RegisteredHandles::resolve(&thermometer_service(), &mapping).unwrap();
    let state = SharedMeasurement::new(move || sample, Duration::from_millis(100));
    AccessDispatcher::new(handles, Arc::new(state))
  }

  #[test]
  fn reads_every_attribute() {
    let d = dispatcher(1234);
    assert_eq!(d.read(handle(3), 0, false).unwrap().as_slice(), &[0xD2, 0x04, b'C']);
    assert_eq!(d.read(handle(4), 0, false).unwrap().as_slice(), &[0x00, 0x00]);
    assert_eq!(d.read(handle(4), 0, true).unwrap().as_slice(), &[0x01, 0x00]);
    assert_eq!(
      d.read(handle(5), 0, false).unwrap().as_slice(),
      &[0x0E, 0xFE, 0x2F, 0x27, 0x01, 0x00, 0x00]
    );
    assert_eq!(d.read(handle(7), 0, false).unwrap().as_slice(), b"C");
    assert_eq!(d.read(handle(8), 0, false).unwrap().as_slice(), b"Temperature unit");
  }

  #[test]
  fn reads_honour_offsets() {
    let d = dispatcher(0);
    assert_eq!(d.read(handle(8), 12, false).unwrap().as_slice(), b"unit");
    assert_eq!(d.read(handle(8), 16, false).unwrap().as_slice(), b"");
    assert_eq!(d.read(handle(8), 17, false), Err(AttError::InvalidOffset));
  }

  #[test]
  fn unknown_handles_are_rejected() {
    let d = dispatcher(0);
    assert_eq!(d.read(handle(6), 0, false), Err(AttError::InvalidHandle));
    assert_eq!(d.write(handle(42), 0, b"F"), Err(AttError::InvalidHandle));
  }

  #[test]
  fn unit_write_switches_and_converts() {
    let d = dispatcher(1234);
    assert_eq!(
      d.write(handle(7), 0, b"F"),
      Ok(WriteOutcome::Unit { unit: Unit::Fahrenheit, changed: true })
    );
    assert_eq!(d.read(handle(7), 0, false).unwrap().as_slice(), b"F");
    assert_eq!(d.read(handle(3), 0, false).unwrap().as_slice(), &[0xCD, 0x08, b'F']);

    assert_eq!(
      d.write(handle(7), 0, b"x"),
      Ok(WriteOutcome::Unit { unit: Unit::Celsius, changed: true })
    );
    assert_eq!(
      d.write(handle(7), 0, b"C"),
      Ok(WriteOutcome::Unit { unit: Unit::Celsius, changed: false })
    );
  }

  #[test]
  fn bad_writes_leave_state_untouched() {
    let d = dispatcher(0);
    assert_eq!(d.write(handle(7), 0, b""), Err(AttError::InvalidAttributeValueLength));
    assert_eq!(d.write(handle(7), 0, b"FF"), Err(AttError::InvalidAttributeValueLength));
    assert_eq!(d.write(handle(7), 1, b"F"), Err(AttError::InvalidOffset));
    assert_eq!(d.write(handle(3), 0, &[0, 0, b'C']), Err(AttError::WriteNotPermitted));
    assert_eq!(d.write(handle(5), 0, &[0; 7]), Err(AttError::WriteNotPermitted));
    assert_eq!(d.write(handle(8), 0, b"x"), Err(AttError::WriteNotPermitted));
    assert_eq!(d.read(handle(7), 0, false).unwrap().as_slice(), b"C");
  }

  #[test]
  fn contended_unit_write_is_absorbed() {
    let d = dispatcher(1234);
    let outcome = d.state.with_lock_held(|| d.write(handle(7), 0, b"F"));
    assert_eq!(outcome, Ok(WriteOutcome::Unit { unit: Unit::Celsius, changed: false }));
    assert_eq!(d.read(handle(7), 0, false).unwrap().as_slice(), b"C");

    assert_eq!(
      d.write(handle(7), 0, b"F"),
      Ok(WriteOutcome::Unit { unit: Unit::Fahrenheit, changed: true })
    );
  }

  #[test]
  fn client_configuration_writes() {
    let d = dispatcher(0);
    assert_eq!(
      d.write(handle(4), 0, &[0x01, 0x00]),
      Ok(WriteOutcome::ClientConfiguration { notify: true })
    );
    assert_eq!(
      d.write(handle(4), 0, &[0x02, 0x00]),
      Ok(WriteOutcome::ClientConfiguration { notify: true })
    );
    assert_eq!(
      d.write(handle(4), 0, &[0x00, 0x00]),
      Ok(WriteOutcome::ClientConfiguration { notify: false })
    );
    assert_eq!(d.write(handle(4), 0, &[0x03, 0x00]), Err(AttError::CccdImproperlyConfigured));
    assert_eq!(d.write(handle(4), 0, &[0x01]), Err(AttError::InvalidAttributeValueLength));
  }
}
