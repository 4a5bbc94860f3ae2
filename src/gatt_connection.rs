use core::fmt::Debug;
use core::time::Duration;

use crate::att_error::AttError;
use crate::bluetooth_address::BluetoothAddress;
use crate::descriptors::AttributeHandle;

/// Represents a GATT connection from the peripheral perspective, specifically used as the API
/// to allow the BLE peripheral device to respond to connected clients.
pub trait GattConnection {
  type SystemError: Debug + Send + 'static;
  type Responder: GattResponder + Debug;
  type Writer: GattWriter + Debug + Clone + Send + 'static;

  /// Access the connected peer's Bluetooth address.
  fn peer_address(&self) -> &BluetoothAddress;

  /// Obtain a writer for server-initiated updates on `handle`.  Stacks that deliver
  /// subscriptions through [crate::gatt_server_cb::GattServerEvent::Subscribe] hand out the
  /// same kind of writer there; this accessor exists for stacks that surface CCC writes as
  /// ordinary write requests.
  fn writer(&self, handle: AttributeHandle) -> Self::Writer;

  /// Ask the central to move the link to new connection parameters.  The central has the
  /// final say, so success only means the request was issued.
  fn request_connection_params(&self, params: &ConnectionParams) -> Result<(), Self::SystemError>;
}

/// Link layer timing preferences for an established connection.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
  pub interval_min: Duration,
  pub interval_max: Duration,

  /// Number of connection events the peripheral may skip.
  pub latency: u16,

  pub supervision_timeout: Duration,
}

impl Default for ConnectionParams {
  fn default() -> Self {
    Self {
      interval_min: Duration::from_millis(20),
      interval_max: Duration::from_millis(40),
      latency: 0,
      supervision_timeout: Duration::from_secs(4),
    }
  }
}

/// Contextually aware type that manages how requests are mapped to responses internal to the
/// BLE implementation.
pub trait GattResponder {
  type SystemError: Debug;

  /// Send response to read or write request.
  fn respond(&mut self, response: Result<Response<'_>, AttError>) -> Result<(), Self::SystemError>;
}

#[derive(Debug)]
pub struct Response<'a> {
  pub offset: u16,
  pub value: &'a [u8],
}

impl<'a> Response<'a> {
  pub fn new(offset: u16, value: &'a [u8]) -> Self {
    Self { offset, value }
  }

  pub fn complete(value: &'a [u8]) -> Self {
    Self::new(0, value)
  }
}

/// Contextually aware type that manages server-initiated writes.
pub trait GattWriter {
  type SystemError: Debug;

  /// Write to a particular characteristic or descriptor.  This trait should only be
  /// given to customers after server-initiated writes have been enabled by the client.  Note
  /// that the caller doesn't have control over whether this is a notify or indicate write
  /// as the internal state can automatically determine the correct kind.
  fn write(&mut self, value: &[u8]) -> Result<(), Self::SystemError>;
}
