use core::fmt::Debug;

use crate::descriptors::gatt_service::GattService;
use crate::gap_advertiser::GapAdvertiser;
use crate::gatt_connection::GattConnection;
use crate::gatt_server_cb::GattServerCallback;

/// A BLE peripheral stack able to host one GATT server.  Implementations map onto a
/// platform library (BlueZ, NimBLE, an in-process loopback) and do no validation of their
/// own beyond what the platform demands.
pub trait Peripheral {
  type SystemError: Debug + Send + 'static;

  /// Keeps the configured server alive.  Dropping it shuts the server down.
  type Handle;
  type Advertiser: GapAdvertiser + Debug + Clone + Send + 'static;
  type Connection: GattConnection + Debug + Clone + Send + 'static;

  /// Name exposed through the built-in GAP characteristics.  Advertised names are carried
  /// separately in the advertisement payload.
  fn set_name(&mut self, name: &str) -> Result<(), Self::SystemError>;

  /// GAP appearance value, e.g. 0x0540 for a generic sensor.
  fn set_appearance(&mut self, appearance: u16) -> Result<(), Self::SystemError>;

  /// Registers `services` and hands every later event to `callback`.  The stack reserves
  /// [GattService::attribute_count] handles per service and reports the assignment through
  /// [crate::gatt_server_cb::GattServerEvent::ServerStarted].  Nothing is connectable until
  /// [GapAdvertiser::request_start] is called.
  fn configure_gatt_server(
    self,
    services: &[GattService<'_>],
    callback: impl GattServerCallback<Self> + Send + 'static,
  ) -> Result<Self::Handle, Self::SystemError>;
}
