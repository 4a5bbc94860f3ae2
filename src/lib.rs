//! A BLE thermometer peripheral built on a small set of stack-agnostic GATT server traits.
//!
//! [thermometer::serve] drives any [peripheral::Peripheral] implementation; [loopback] provides
//! an in-process one.

pub mod gatt_connection;
pub mod descriptors;
pub mod peripheral;
pub mod bluetooth_error;
pub mod gap_advertiser;
pub mod gatt_server_cb;
pub mod att_error;
pub mod bluetooth_address;
pub mod mtu;
pub mod advertisement;
pub mod config;
pub mod thermometer;
pub mod loopback;

pub mod prelude {
  pub use crate::descriptors::*;
  pub use crate::advertisement::*;
  pub use crate::gap_advertiser::*;
  pub use crate::gatt_server_cb::*;
  pub use crate::peripheral::*;
  pub use crate::gatt_connection::*;
  pub use crate::bluetooth_error::*;
  pub use crate::att_error::*;
  pub use crate::bluetooth_address::*;
  pub use crate::mtu::*;
  pub use crate::config::*;
}
