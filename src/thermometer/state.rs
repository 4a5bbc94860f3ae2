//! Measurement state shared between the stack callback and the periodic notifier.

use core::fmt::{Display, Formatter};
use core::num::ParseIntError;
use core::time::Duration;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use log::warn;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::thermometer::measurement::{to_fahrenheit, Measurement, Unit};

/// Upper bound (exclusive) of raw samples, in tenths of a degree Celsius.
pub const SAMPLE_CEILING: i16 = 10_000;

/// Produces raw temperature samples in tenths of a degree Celsius.
pub trait TemperatureSource: Send {
  fn sample_decicelsius(&mut self) -> i16;
}

impl<F> TemperatureSource for F
where
  F: FnMut() -> i16 + Send,
{
  fn sample_decicelsius(&mut self) -> i16 {
    (self)()
  }
}

/// Placeholder sensor drawing uniformly from `[0, SAMPLE_CEILING)`.
#[derive(Debug)]
pub struct RandomSource {
  rng: StdRng,
}

impl RandomSource {
  pub fn new() -> Self {
    Self { rng: StdRng::from_entropy() }
  }

  pub fn seeded(seed: u64) -> Self {
    Self { rng: StdRng::seed_from_u64(seed) }
  }
}

impl Default for RandomSource {
  fn default() -> Self {
    Self::new()
  }
}

impl TemperatureSource for RandomSource {
  fn sample_decicelsius(&mut self) -> i16 {
    self.rng.gen_range(0..SAMPLE_CEILING)
  }
}

/// Linux exposes the SoC temperature here, in millidegrees Celsius.
pub const THERMAL_ZONE_PATH: &str = "/sys/class/thermal/thermal_zone0/temp";

#[derive(Debug)]
pub enum ThermalZoneError {
  Io(io::Error),
  Parse(ParseIntError),
}

impl Display for ThermalZoneError {
  fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
    match self {
      ThermalZoneError::Io(e) => write!(f, "read failed: {e}"),
      ThermalZoneError::Parse(e) => write!(f, "not an integer: {e}"),
    }
  }
}

/// Reads a sysfs thermal zone.  A failed read repeats the last good sample.
#[derive(Debug, Clone)]
pub struct ThermalZoneSource {
  path: PathBuf,
  last_good: i16,
}

impl ThermalZoneSource {
  pub fn new() -> Self {
    Self::at(THERMAL_ZONE_PATH)
  }

  pub fn at(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into(), last_good: 0 }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn read_decicelsius(&self) -> Result<i16, ThermalZoneError> {
    let raw = std::fs::read_to_string(&self.path).map_err(ThermalZoneError::Io)?;
    let millidegrees: i64 = raw.trim().parse().map_err(ThermalZoneError::Parse)?;
    Ok((millidegrees / 100).clamp(i64::from(i16::MIN), i64::from(i16::MAX)) as i16)
  }
}

impl Default for ThermalZoneSource {
  fn default() -> Self {
    Self::new()
  }
}

impl TemperatureSource for ThermalZoneSource {
  fn sample_decicelsius(&mut self) -> i16 {
    match self.read_decicelsius() {
      Ok(value) => {
        self.last_good = value;
        value
      }
      Err(e) => {
        warn!("Thermal zone {}: {e}", self.path.display());
        self.last_good
      }
    }
  }
}

/// The measurement lock could not be taken within the configured bound.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LockTimeout {
  pub waited: Duration,
}

impl Display for LockTimeout {
  fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
    write!(f, "measurement lock not acquired within {:?}", self.waited)
  }
}

struct Inner<S> {
  source: S,
  measurement: Measurement,
}

/// Temperature and unit behind a lock with a bounded wait.
///
/// Every successful access also publishes the measurement to a packed atomic snapshot so
/// that a reader that times out on the lock still gets a consistent last-known value.
pub struct SharedMeasurement<S> {
  inner: Mutex<Inner<S>>,
  snapshot: AtomicU32,
  lock_timeout: Duration,
}

impl<S: TemperatureSource> SharedMeasurement<S> {
  pub fn new(source: S, lock_timeout: Duration) -> Self {
    let initial = Measurement::default();
    Self {
      inner: Mutex::new(Inner { source, measurement: initial }),
      snapshot: AtomicU32::new(pack(initial)),
      lock_timeout,
    }
  }

  pub fn lock_timeout(&self) -> Duration {
    self.lock_timeout
  }

  /// Draw a fresh sample, convert it to the current unit and store it.
  pub fn sample(&self) -> Result<Measurement, LockTimeout> {
    let mut inner = self.lock()?;
    let raw = inner.source.sample_decicelsius();
    let temperature = match inner.measurement.unit {
      Unit::Celsius => raw,
      Unit::Fahrenheit => to_fahrenheit(raw),
    };
    inner.measurement.temperature = temperature;
    let measurement = inner.measurement;
    self.publish(measurement);
    Ok(measurement)
  }

  /// Like [Self::sample] but falls back to the last published value when the lock is
  /// contended.
  pub fn read_measurement(&self) -> Measurement {
    self.sample().unwrap_or_else(|e| {
      warn!("Serving stale measurement: {e}");
      self.last_known()
    })
  }

  /// Last measurement published by any access, without touching the lock.
  pub fn last_known(&self) -> Measurement {
    unpack(self.snapshot.load(Ordering::Acquire))
  }

  pub fn unit(&self) -> Unit {
    match self.lock() {
      Ok(inner) => inner.measurement.unit,
      Err(_) => self.last_known().unit,
    }
  }

  /// Select the unit for subsequent samples.  Returns whether the unit actually changed.
  pub fn write_unit(&self, unit: Unit) -> Result<bool, LockTimeout> {
    let mut inner = self.lock()?;
    let changed = inner.measurement.unit != unit;
    inner.measurement.unit = unit;
    self.publish(inner.measurement);
    Ok(changed)
  }

  #[cfg(test)]
  pub(crate) fn with_lock_held<R>(&self, f: impl FnOnce() -> R) -> R {
    let _guard = self.inner.lock();
    f()
  }

  fn lock(&self) -> Result<parking_lot::MutexGuard<'_, Inner<S>>, LockTimeout> {
    self
      .inner
      .try_lock_for(self.lock_timeout)
      .ok_or(LockTimeout { waited: self.lock_timeout })
  }

  fn publish(&self, measurement: Measurement) {
    self.snapshot.store(pack(measurement), Ordering::Release);
  }
}

fn pack(measurement: Measurement) -> u32 {
  u32::from(measurement.temperature as u16) | (u32::from(measurement.unit.tag()) << 16)
}

fn unpack(packed: u32) -> Measurement {
  Measurement {
    temperature: packed as u16 as i16,
    unit: Unit::coerce((packed >> 16) as u8),
  }
}
