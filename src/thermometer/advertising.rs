use crate::advertisement::*;
use crate::config::ThermometerConfig;
use crate::thermometer::schema::THERMOMETER_SERVICE_UUID;

/// Undirected, connectable, general-discoverable advertising that runs until a central
/// connects.  The primary payload carries the service UUID and TX power; the name goes in
/// the scan response.
pub fn thermometer_advertisement(config: &ThermometerConfig) -> Result<AdvertisementRequest, PushError> {
  let mut payload = AdvertisementPayloadBuilder::new()
    .set_discover_mode(DiscoverMode::General)
    .set_classic_not_supported(true)
    .push_service_uuids(&[THERMOMETER_SERVICE_UUID], true)?;
  if let Some(dbm) = config.tx_power_level {
    payload = payload.push_tx_power_level(dbm)?;
  }

  let scan_response = ScanResponsePayloadBuilder::new()
    .push_complete_local_name(&config.device_name)?
    .build_scan_response()?;

  let (interval_min, interval_max) = match config.advertising_interval {
    Some((min, max)) => (Some(min), Some(max)),
    None => (None, None),
  };

  Ok(AdvertisementRequest {
    params: AdvertisementParams {
      connect_mode: ConnectMode::Undirected,
      interval_min,
      interval_max,
      duration: None,
    },
    payload: payload.build()?,
    scan_response_payload: Some(scan_response),
  })
}
