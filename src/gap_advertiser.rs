use crate::advertisement::AdvertisementRequest;

/// Controls advertising for a configured server.  Outcomes arrive asynchronously as
/// [crate::gatt_server_cb::GattServerEvent::AdvertisingStarted],
/// [crate::gatt_server_cb::GattServerEvent::AdvertisingStopped] or
/// [crate::gatt_server_cb::GattServerEvent::AdvertisingStartFail].
pub trait GapAdvertiser {
  /// Start advertising.  Most stacks stop advertising by themselves once a central connects,
  /// so this must be called again after a disconnect.
  fn request_start(&self, request: AdvertisementRequest);

  fn request_stop(&self);
}
