use core::fmt::{Display, Formatter};
use core::time::Duration;

use crate::advertisement::ADVERTISING_INTERVAL_RANGE;
use crate::gatt_connection::ConnectionParams;

/// Longest device name that still fits the complete local name record of a 31 byte scan
/// response (2 bytes of record header).
pub const MAX_DEVICE_NAME_LEN: usize = 29;

/// GAP appearance for a generic sensor.
pub const APPEARANCE_GENERIC_SENSOR: u16 = 0x0540;

/// Runtime configuration for the thermometer peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThermometerConfig {
  /// GAP device name, also sent as the complete local name in the scan response.
  pub device_name: String,

  /// GAP appearance value.
  pub appearance: u16,

  /// Interval between periodic temperature notifications while a central is subscribed.
  pub notify_period: Duration,

  /// Upper bound on how long any access waits for the measurement lock.
  pub lock_timeout: Duration,

  /// `(min, max)` advertising interval.  `None` leaves the stack's default.
  pub advertising_interval: Option<(Duration, Duration)>,

  /// TX power level in dBm advertised in the primary payload.  `None` omits the record.
  pub tx_power_level: Option<i8>,

  /// Parameters requested from the central right after it connects.  `None` leaves the
  /// central's choice alone.
  pub connection_params: Option<ConnectionParams>,
}

impl Default for ThermometerConfig {
  fn default() -> Self {
    Self {
      device_name: "Thermometer".to_owned(),
      appearance: APPEARANCE_GENERIC_SENSOR,
      notify_period: Duration::from_millis(5000),
      lock_timeout: Duration::from_millis(100),
      advertising_interval: Some((Duration::from_millis(20), Duration::from_millis(40))),
      tx_power_level: Some(0),
      connection_params: Some(ConnectionParams::default()),
    }
  }
}

impl ThermometerConfig {
  pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
    self.device_name = name.into();
    self
  }

  pub fn with_appearance(mut self, appearance: u16) -> Self {
    self.appearance = appearance;
    self
  }

  pub fn with_notify_period(mut self, period: Duration) -> Self {
    self.notify_period = period;
    self
  }

  pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
    self.lock_timeout = timeout;
    self
  }

  pub fn with_advertising_interval(mut self, interval: Option<(Duration, Duration)>) -> Self {
    self.advertising_interval = interval;
    self
  }

  pub fn with_tx_power_level(mut self, dbm: Option<i8>) -> Self {
    self.tx_power_level = dbm;
    self
  }

  pub fn with_connection_params(mut self, params: Option<ConnectionParams>) -> Self {
    self.connection_params = params;
    self
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.device_name.is_empty() {
      return Err(ConfigError::EmptyName);
    }
    if self.device_name.len() > MAX_DEVICE_NAME_LEN {
      return Err(ConfigError::NameTooLong {
        len: self.device_name.len(),
        max: MAX_DEVICE_NAME_LEN,
      });
    }
    if self.notify_period.is_zero() {
      return Err(ConfigError::ZeroNotifyPeriod);
    }
    if self.lock_timeout.is_zero() {
      return Err(ConfigError::ZeroLockTimeout);
    }
    if let Some((min, max)) = self.advertising_interval {
      if min > max || !ADVERTISING_INTERVAL_RANGE.contains(&min) || !ADVERTISING_INTERVAL_RANGE.contains(&max) {
        return Err(ConfigError::InvalidAdvertisingInterval { min, max });
      }
    }
    Ok(())
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
  EmptyName,
  NameTooLong { len: usize, max: usize },
  ZeroNotifyPeriod,
  ZeroLockTimeout,
  InvalidAdvertisingInterval { min: Duration, max: Duration },
}

impl Display for ConfigError {
  fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
    match self {
      ConfigError::EmptyName => write!(f, "device name must not be empty"),
      ConfigError::NameTooLong { len, max } => {
        write!(f, "device name is {len} bytes, at most {max} fit the scan response")
      }
      ConfigError::ZeroNotifyPeriod => write!(f, "notify period must be non-zero"),
      ConfigError::ZeroLockTimeout => write!(f, "lock timeout must be non-zero"),
      ConfigError::InvalidAdvertisingInterval { min, max } => {
        write!(f, "advertising interval {min:?}..={max:?} is outside {ADVERTISING_INTERVAL_RANGE:?}")
      }
    }
  }
}
