//! Runs the thermometer against the in-process stack and plays a short central session.
//!
//! `RUST_LOG=debug cargo run --example loopback_thermometer` shows the server side too.

use std::error::Error;
use std::path::Path;
use std::time::Duration;

use ble_thermometer::loopback::LoopbackPeripheral;
use ble_thermometer::prelude::*;
use ble_thermometer::thermometer::schema::{TEMPERATURE_UUID, UNIT_UUID};
use ble_thermometer::thermometer::state::THERMAL_ZONE_PATH;
use ble_thermometer::thermometer::{self, Measurement, RandomSource, TemperatureSource, ThermalZoneSource};
use log::info;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

  let (peripheral, mut central) = LoopbackPeripheral::new();
  let config = ThermometerConfig::default().with_notify_period(Duration::from_secs(1));

  // Real CPU temperature where the board exposes one, random values otherwise.
  let mut thermal = Path::new(THERMAL_ZONE_PATH).exists().then(ThermalZoneSource::new);
  let mut random = RandomSource::new();
  let source = move || match thermal.as_mut() {
    Some(zone) => zone.sample_decicelsius(),
    None => random.sample_decicelsius(),
  };
  let running = thermometer::start(peripheral, config, source)?;

  let advertisement = central
    .next_advertisement()
    .await
    .ok_or("peripheral never advertised")?;
  println!("Advertising: {:02x?}", &*advertisement.payload);

  central.connect().await?;
  let temperature = central
    .handle_of(TEMPERATURE_UUID)
    .ok_or("temperature characteristic not registered")?;
  let unit = central.handle_of(UNIT_UUID).ok_or("unit characteristic not registered")?;

  let value = central.read(temperature).await?;
  println!("Read: {}", Measurement::decode(&value).map_err(|e| e.to_string())?);

  central.subscribe(temperature).await?;
  for _ in 0..3 {
    let notification = central.next_notification().await.ok_or("server stopped")?;
    println!("Notified: {}", Measurement::decode(&notification.value).map_err(|e| e.to_string())?);
  }

  info!("Switching to Fahrenheit");
  central.write(unit, b"F").await?;
  for _ in 0..3 {
    let notification = central.next_notification().await.ok_or("server stopped")?;
    println!("Notified: {}", Measurement::decode(&notification.value).map_err(|e| e.to_string())?);
  }

  central.unsubscribe(temperature).await?;
  central.disconnect(BluetoothError::ClosedByPeer(RemoteShutdownReason::NoneGiven)).await?;
  central
    .next_advertisement()
    .await
    .ok_or("peripheral did not resume advertising")?;
  println!("Advertising again, shutting down.");

  drop(running);
  Ok(())
}
