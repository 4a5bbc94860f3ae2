use std::sync::atomic::{AtomicI16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ble_thermometer::loopback::{CentralError, LoopbackCentral, LoopbackError, LoopbackPeripheral};
use ble_thermometer::prelude::*;
use ble_thermometer::thermometer::schema::*;
use ble_thermometer::thermometer::{self, Measurement, RandomSource, RunningThermometer, ThermometerError, Unit};
use tokio::time::Instant;

struct Harness {
  central: LoopbackCentral,
  running: RunningThermometer<LoopbackPeripheral>,
  sample: Arc<AtomicI16>,
  temperature: AttributeHandle,
  config: AttributeHandle,
  format: AttributeHandle,
  unit: AttributeHandle,
  description: AttributeHandle,
}

impl Harness {
  async fn start() -> Self {
    Self::start_with(ThermometerConfig::default()).await
  }

  async fn start_with(config: ThermometerConfig) -> Self {
    let _ = env_logger::builder().is_test(true).try_init();

    let sample = Arc::new(AtomicI16::new(1234));
    let source = {
      let sample = Arc::clone(&sample);
      move || sample.load(Ordering::SeqCst)
    };
    let (peripheral, mut central) = LoopbackPeripheral::new();
    let running = thermometer::start(peripheral, config, source).unwrap();
    assert!(central.next_advertisement().await.is_some());

    Self {
      temperature: central.handle_of(TEMPERATURE_UUID).unwrap(),
      config: central.handle_of(CLIENT_CHARACTERISTIC_CONFIGURATION).unwrap(),
      format: central.handle_of(CHARACTERISTIC_PRESENTATION_FORMAT).unwrap(),
      unit: central.handle_of(UNIT_UUID).unwrap(),
      description: central.handle_of(CHARACTERISTIC_USER_DESCRIPTION).unwrap(),
      central,
      running,
      sample,
    }
  }

  async fn connected() -> Self {
    let harness = Self::start().await;
    harness.central.connect().await.unwrap();
    harness
  }

  async fn subscribed() -> Self {
    let mut harness = Self::connected().await;
    harness.central.subscribe(harness.temperature).await.unwrap();
    assert!(harness.central.try_next_notification().is_some());
    harness
  }

  async fn assert_quiet_for(&mut self, period: Duration) {
    tokio::time::sleep(period).await;
    assert_eq!(self.central.try_next_notification(), None);
  }
}

#[tokio::test(start_paused = true)]
async fn advertises_service_and_identity() {
  let (peripheral, mut central) = LoopbackPeripheral::new();
  let _running = thermometer::start(peripheral, ThermometerConfig::default(), RandomSource::seeded(1)).unwrap();

  let advertisement = central.next_advertisement().await.unwrap();
  assert_eq!(&advertisement.payload[..3], &[0x02, 0x01, 0x06]);
  assert_eq!(&advertisement.payload[3..5], &[0x11, 0x07]);
  assert_eq!(
    &advertisement.payload[5..21],
    &0x9941f656_8e3e_11eb_8dcd_0242ac130003u128.to_le_bytes()
  );
  assert_eq!(advertisement.params.connect_mode, ConnectMode::Undirected);
  assert_eq!(advertisement.params.duration, None);
  assert_eq!(advertisement.params.interval_min, Some(Duration::from_millis(20)));
  assert_eq!(advertisement.params.interval_max, Some(Duration::from_millis(40)));

  let scan_response = advertisement.scan_response_payload.unwrap();
  assert_eq!(&scan_response[2..], b"Thermometer");
  assert_eq!(central.device_name().as_deref(), Some("Thermometer"));
  assert_eq!(central.appearance(), Some(0x0540));
}

#[tokio::test(start_paused = true)]
async fn handles_follow_declaration_order() {
  let harness = Harness::start().await;
  let raw = |h: AttributeHandle| h.raw();
  assert_eq!(
    [
      raw(harness.temperature),
      raw(harness.config),
      raw(harness.format),
      raw(harness.unit),
      raw(harness.description)
    ],
    [3, 4, 5, 7, 8]
  );
}

#[tokio::test(start_paused = true)]
async fn reads_every_attribute() {
  let harness = Harness::connected().await;
  let central = &harness.central;

  assert_eq!(central.read(harness.temperature).await, Ok(vec![0xD2, 0x04, b'C']));
  assert_eq!(central.read(harness.config).await, Ok(vec![0x00, 0x00]));
  assert_eq!(
    central.read(harness.format).await,
    Ok(vec![0x0E, 0xFE, 0x2F, 0x27, 0x01, 0x00, 0x00])
  );
  assert_eq!(central.read(harness.unit).await, Ok(vec![b'C']));
  assert_eq!(central.read(harness.description).await, Ok(b"Temperature unit".to_vec()));
}

#[tokio::test(start_paused = true)]
async fn every_read_takes_a_fresh_sample() {
  let harness = Harness::connected().await;
  assert_eq!(harness.central.read(harness.temperature).await, Ok(vec![0xD2, 0x04, b'C']));

  harness.sample.store(-15, Ordering::SeqCst);
  assert_eq!(harness.central.read(harness.temperature).await, Ok(vec![0xF1, 0xFF, b'C']));
}

#[tokio::test(start_paused = true)]
async fn fahrenheit_reads_are_converted() {
  let harness = Harness::connected().await;
  harness.central.write(harness.unit, b"F").await.unwrap();

  assert_eq!(harness.central.read(harness.unit).await, Ok(vec![b'F']));
  let value = harness.central.read(harness.temperature).await.unwrap();
  assert_eq!(
    Measurement::decode(&value),
    Ok(Measurement::new(2253, Unit::Fahrenheit))
  );
}

#[tokio::test(start_paused = true)]
async fn unknown_unit_bytes_select_celsius() {
  let harness = Harness::connected().await;
  harness.central.write(harness.unit, b"F").await.unwrap();
  harness.central.write(harness.unit, b"K").await.unwrap();

  assert_eq!(harness.central.read(harness.unit).await, Ok(vec![b'C']));
}

#[tokio::test(start_paused = true)]
async fn unit_writes_of_wrong_length_change_nothing() {
  let harness = Harness::connected().await;
  let central = &harness.central;

  assert_eq!(
    central.write(harness.unit, b"FF").await,
    Err(CentralError::Att(AttError::InvalidAttributeValueLength))
  );
  assert_eq!(
    central.write(harness.unit, b"").await,
    Err(CentralError::Att(AttError::InvalidAttributeValueLength))
  );
  assert_eq!(central.read(harness.unit).await, Ok(vec![b'C']));
}

#[tokio::test(start_paused = true)]
async fn unit_write_without_response_still_applies() {
  let harness = Harness::connected().await;
  harness.central.write_command(harness.unit, b"F").await.unwrap();
  assert_eq!(harness.central.read(harness.unit).await, Ok(vec![b'F']));

  // Rejections are silent for write commands.
  harness.central.write_command(harness.unit, b"CC").await.unwrap();
  assert_eq!(harness.central.read(harness.unit).await, Ok(vec![b'F']));
}

#[tokio::test(start_paused = true)]
async fn protocol_errors_for_unsupported_operations() {
  let harness = Harness::connected().await;
  let central = &harness.central;
  let unknown = AttributeHandle::from_raw(6).unwrap();

  assert_eq!(central.read(unknown).await, Err(CentralError::Att(AttError::InvalidHandle)));
  assert_eq!(
    central.write(harness.temperature, &[0, 0, b'C']).await,
    Err(CentralError::Att(AttError::WriteNotPermitted))
  );
  assert_eq!(
    central.write(harness.description, b"x").await,
    Err(CentralError::Att(AttError::WriteNotPermitted))
  );
  assert_eq!(
    central.write_at(harness.unit, 1, b"F").await,
    Err(CentralError::Att(AttError::InvalidOffset))
  );
  assert_eq!(
    central.prepare_write(harness.unit, 0, b"F").await,
    Err(CentralError::Att(AttError::RequestNotSupported))
  );
  assert_eq!(
    central.execute_write(harness.unit, ExecWriteAction::Commit).await,
    Err(CentralError::Att(AttError::RequestNotSupported))
  );
  assert_eq!(
    central.read_at(harness.description, 17).await,
    Err(CentralError::Att(AttError::InvalidOffset))
  );
  assert_eq!(central.read(harness.unit).await, Ok(vec![b'C']));
}

#[tokio::test(start_paused = true)]
async fn long_reads_follow_offsets() {
  let harness = Harness::connected().await;
  assert_eq!(
    harness.central.read_at(harness.description, 12).await,
    Ok(b"unit".to_vec())
  );
  assert_eq!(
    harness.central.read_long(harness.description).await,
    Ok(b"Temperature unit".to_vec())
  );
}

#[tokio::test(start_paused = true)]
async fn requests_before_connecting_are_refused() {
  let harness = Harness::start().await;
  assert_eq!(
    harness.central.read(harness.temperature).await,
    Err(CentralError::NotConnected)
  );
  assert_eq!(harness.central.connection_params(), None);
}

#[tokio::test(start_paused = true)]
async fn connecting_requests_connection_parameters() {
  let harness = Harness::connected().await;
  assert_eq!(
    harness.central.connection_params(),
    Some(ConnectionParams {
      interval_min: Duration::from_millis(20),
      interval_max: Duration::from_millis(40),
      latency: 0,
      supervision_timeout: Duration::from_secs(4),
    })
  );
}

#[tokio::test(start_paused = true)]
async fn subscribing_notifies_once_then_every_period() {
  let mut harness = Harness::connected().await;
  let started = Instant::now();

  harness.central.subscribe(harness.temperature).await.unwrap();
  let immediate = harness.central.try_next_notification().unwrap();
  assert_eq!(immediate.handle, harness.temperature);
  assert_eq!(immediate.value, vec![0xD2, 0x04, b'C']);
  assert_eq!(harness.central.try_next_notification(), None);

  harness.sample.store(100, Ordering::SeqCst);
  let periodic = harness.central.next_notification().await.unwrap();
  assert_eq!(periodic.value, vec![0x64, 0x00, b'C']);
  assert!(started.elapsed() >= Duration::from_secs(5));

  harness.central.next_notification().await.unwrap();
  assert!(started.elapsed() >= Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn resubscribing_while_subscribed_sends_nothing_extra() {
  let mut harness = Harness::subscribed().await;
  harness.central.subscribe(harness.temperature).await.unwrap();
  assert_eq!(harness.central.try_next_notification(), None);
}

#[tokio::test(start_paused = true)]
async fn unsubscribing_stops_notifications_until_resubscribed() {
  let mut harness = Harness::subscribed().await;

  harness.central.unsubscribe(harness.temperature).await.unwrap();
  harness.assert_quiet_for(Duration::from_secs(30)).await;

  harness.central.subscribe(harness.temperature).await.unwrap();
  assert!(harness.central.try_next_notification().is_some());
  assert!(harness.central.next_notification().await.is_some());
}

#[tokio::test(start_paused = true)]
async fn subscribing_to_another_characteristic_disables_updates() {
  let mut harness = Harness::subscribed().await;

  harness.central.subscribe(harness.unit).await.unwrap();
  harness.assert_quiet_for(Duration::from_secs(30)).await;
  assert_eq!(harness.central.read(harness.config).await, Ok(vec![0x00, 0x00]));
}

#[tokio::test(start_paused = true)]
async fn client_configuration_writes_drive_subscription() {
  let mut harness = Harness::connected().await;

  harness.central.write(harness.config, &[0x01, 0x00]).await.unwrap();
  assert_eq!(
    harness.central.try_next_notification().map(|n| n.handle),
    Some(harness.temperature)
  );
  assert_eq!(harness.central.read(harness.config).await, Ok(vec![0x01, 0x00]));
  assert!(harness.central.next_notification().await.is_some());

  harness.central.write(harness.config, &[0x00, 0x00]).await.unwrap();
  assert_eq!(harness.central.read(harness.config).await, Ok(vec![0x00, 0x00]));
  harness.assert_quiet_for(Duration::from_secs(30)).await;

  assert_eq!(
    harness.central.write(harness.config, &[0x03, 0x00]).await,
    Err(CentralError::Att(AttError::CccdImproperlyConfigured))
  );
  assert_eq!(
    harness.central.write(harness.config, &[0x01]).await,
    Err(CentralError::Att(AttError::InvalidAttributeValueLength))
  );
  harness.assert_quiet_for(Duration::from_secs(30)).await;
}

#[tokio::test(start_paused = true)]
async fn unit_change_without_subscription_sends_nothing() {
  let mut harness = Harness::connected().await;
  harness.central.write(harness.unit, b"F").await.unwrap();
  harness.assert_quiet_for(Duration::from_secs(30)).await;
}

#[tokio::test(start_paused = true)]
async fn rewriting_the_same_unit_sends_nothing() {
  let mut harness = Harness::subscribed().await;
  harness.central.write(harness.unit, b"C").await.unwrap();
  assert_eq!(harness.central.try_next_notification(), None);
}

#[tokio::test(start_paused = true)]
async fn disconnecting_stops_notifications_and_resumes_advertising() {
  let mut harness = Harness::subscribed().await;

  harness.central.disconnect(BluetoothError::ClosedByPeer(RemoteShutdownReason::NoneGiven)).await.unwrap();
  assert!(harness.central.next_advertisement().await.is_some());
  harness.assert_quiet_for(Duration::from_secs(30)).await;

  harness.central.connect().await.unwrap();
  assert_eq!(harness.central.read(harness.config).await, Ok(vec![0x00, 0x00]));
  harness.assert_quiet_for(Duration::from_secs(30)).await;
}

#[tokio::test(start_paused = true)]
async fn failed_connection_restarts_advertising() {
  let mut harness = Harness::start().await;
  harness.central.fail_connection(BluetoothError::FailedToEstablish).await.unwrap();
  assert!(harness.central.next_advertisement().await.is_some());
  harness.central.connect().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn expired_advertising_restarts() {
  let mut harness = Harness::start().await;
  harness.central.expire_advertising().await.unwrap();
  assert!(harness.central.next_advertisement().await.is_some());
}

#[tokio::test(start_paused = true)]
async fn mtu_changes_are_tracked() {
  let harness = Harness::connected().await;
  harness.central.change_mtu(64).await.unwrap();
  assert_eq!(harness.central.mtu().usable_value(), 61);
  assert_eq!(
    harness.central.read_long(harness.description).await,
    Ok(b"Temperature unit".to_vec())
  );
}

#[tokio::test(start_paused = true)]
async fn thermometer_session() {
  let mut harness = Harness::connected().await;
  let central = &mut harness.central;

  central.subscribe(harness.temperature).await.unwrap();
  let first = central.try_next_notification().unwrap();
  assert_eq!(first.value, vec![0xD2, 0x04, b'C']);

  central.write(harness.unit, b"F").await.unwrap();
  let converted = central.try_next_notification().unwrap();
  assert_eq!(
    Measurement::decode(&converted.value),
    Ok(Measurement::new(2253, Unit::Fahrenheit))
  );

  central.disconnect(BluetoothError::ClosedLocally).await.unwrap();
  assert!(central.next_advertisement().await.is_some());
  assert!(harness.running.try_failure().is_none());
}

#[tokio::test(start_paused = true)]
async fn undersized_attribute_table_fails_registration() {
  let (peripheral, _central) = LoopbackPeripheral::new();
  let result = thermometer::start(
    peripheral.with_capacity(ATTRIBUTE_COUNT - 1),
    ThermometerConfig::default(),
    RandomSource::seeded(3),
  );
  assert!(matches!(
    result.err(),
    Some(ThermometerError::System(LoopbackError::TableFull { required: 8, capacity: 7 }))
  ));
}

#[tokio::test(start_paused = true)]
async fn invalid_config_is_rejected_before_registration() {
  let (peripheral, central) = LoopbackPeripheral::new();
  let config = ThermometerConfig::default().with_notify_period(Duration::ZERO);
  let result = thermometer::start(peripheral, config, RandomSource::seeded(4));
  assert!(matches!(
    result.err(),
    Some(ThermometerError::Config(ConfigError::ZeroNotifyPeriod))
  ));
  assert_eq!(central.device_name(), None);
}

#[tokio::test(start_paused = true)]
async fn stack_shutdown_ends_serving() {
  let harness = Harness::connected().await;
  harness.central.inject_shutdown().unwrap();
  let result = harness.running.wait().await;
  assert!(matches!(
    result,
    Err(ThermometerError::StackShutdown(LoopbackError::ServerGone))
  ));
}

#[tokio::test(start_paused = true)]
async fn custom_period_and_name() {
  let config = ThermometerConfig::default()
    .with_device_name("Porch")
    .with_notify_period(Duration::from_secs(1))
    .with_connection_params(None);
  let mut harness = Harness::start_with(config).await;
  assert_eq!(harness.central.device_name().as_deref(), Some("Porch"));

  harness.central.connect().await.unwrap();
  assert_eq!(harness.central.connection_params(), None);
  harness.central.subscribe(harness.temperature).await.unwrap();
  harness.central.try_next_notification().unwrap();

  let started = Instant::now();
  harness.central.next_notification().await.unwrap();
  assert!(started.elapsed() >= Duration::from_secs(1));
  assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn random_source_stays_in_range() {
  let (peripheral, mut central) = LoopbackPeripheral::new();
  let _running = thermometer::start(peripheral, ThermometerConfig::default(), RandomSource::new()).unwrap();
  central.next_advertisement().await.unwrap();
  central.connect().await.unwrap();

  let temperature = central.handle_of(TEMPERATURE_UUID).unwrap();
  for _ in 0..50 {
    let value = central.read(temperature).await.unwrap();
    let measurement = Measurement::decode(&value).unwrap();
    assert!((0..10_000).contains(&measurement.temperature));
  }
}
