//! The thermometer GATT application.

pub mod advertising;
pub mod dispatcher;
pub mod handles;
pub mod link;
pub mod measurement;
pub mod notifier;
pub mod schema;
pub mod server;
pub mod state;

pub use measurement::{Measurement, Unit};
pub use server::{serve, start, RunningThermometer, ThermometerError, ThermometerServer};
pub use state::{RandomSource, TemperatureSource, ThermalZoneSource};
