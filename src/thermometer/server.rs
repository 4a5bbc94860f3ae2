//! The GATT server callback tying the thermometer together, and the entry points that hand
//! it to a [Peripheral].

use core::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

use log::{debug, error, info, trace, warn};
use tokio::sync::oneshot;

use crate::advertisement::{AdvertisementRequest, PushError};
use crate::att_error::AttError;
use crate::config::{ConfigError, ThermometerConfig};
use crate::descriptors::{AttributeHandle, GattService, UUID};
use crate::gap_advertiser::GapAdvertiser;
use crate::gatt_connection::{GattConnection, GattResponder, Response};
use crate::gatt_server_cb::*;
use crate::peripheral::Peripheral;
use crate::thermometer::advertising::thermometer_advertisement;
use crate::thermometer::dispatcher::{AccessDispatcher, WriteOutcome};
use crate::thermometer::handles::{RegisteredHandles, RegistrationError};
use crate::thermometer::link::{LinkAction, LinkStateMachine, SubscriptionAction};
use crate::thermometer::notifier::{push_measurement, PeriodicNotifier};
use crate::thermometer::schema::thermometer_service;
use crate::thermometer::state::{SharedMeasurement, TemperatureSource};

type ResponderOf<P> = <<P as Peripheral>::Connection as GattConnection>::Responder;
type WriterOf<P> = <<P as Peripheral>::Connection as GattConnection>::Writer;

/// Validate `config`, register the thermometer service on `peripheral` and serve until a
/// fatal error occurs.
pub async fn serve<P, S>(
  peripheral: P,
  config: ThermometerConfig,
  source: S,
) -> Result<(), ThermometerError<P::SystemError>>
where
  P: Peripheral + Debug + 'static,
  S: TemperatureSource + 'static,
{
  start(peripheral, config, source)?.wait().await
}

/// Like [serve] but returns as soon as the server is registered with the stack.
pub fn start<P, S>(
  mut peripheral: P,
  config: ThermometerConfig,
  source: S,
) -> Result<RunningThermometer<P>, ThermometerError<P::SystemError>>
where
  P: Peripheral + Debug + 'static,
  S: TemperatureSource + 'static,
{
  config.validate().map_err(ThermometerError::Config)?;
  let advertisement = thermometer_advertisement(&config).map_err(ThermometerError::Advertisement)?;

  peripheral
    .set_name(&config.device_name)
    .map_err(ThermometerError::System)?;
  peripheral
    .set_appearance(config.appearance)
    .map_err(ThermometerError::System)?;

  let (failure_tx, failure_rx) = oneshot::channel();
  let server = ThermometerServer::<P, S>::new(config, advertisement, source, failure_tx);
  let service = thermometer_service();
  debug!("Registering {} attributes", service.attribute_count());
  let handle = peripheral
    .configure_gatt_server(&[service], server)
    .map_err(ThermometerError::System)?;

  Ok(RunningThermometer { handle, failure: failure_rx })
}

/// A registered thermometer.  Dropping it drops the stack handle, which shuts the server down.
pub struct RunningThermometer<P: Peripheral> {
  handle: P::Handle,
  failure: oneshot::Receiver<ThermometerError<P::SystemError>>,
}

impl<P: Peripheral> RunningThermometer<P> {
  pub fn handle(&self) -> &P::Handle {
    &self.handle
  }

  /// The fatal error the server stopped with, if it has stopped.
  pub fn try_failure(&mut self) -> Option<ThermometerError<P::SystemError>> {
    self.failure.try_recv().ok()
  }

  /// Wait for a fatal error.  Resolves to `Ok` if the stack drops the server without one.
  pub async fn wait(self) -> Result<(), ThermometerError<P::SystemError>> {
    let RunningThermometer { handle, failure } = self;
    let result = failure.await;
    drop(handle);
    match result {
      Ok(e) => Err(e),
      Err(_) => Ok(()),
    }
  }
}

/// Everything that stops the thermometer.
#[derive(Debug)]
pub enum ThermometerError<E: Debug> {
  Config(ConfigError),
  Advertisement(PushError),
  System(E),
  Registration(RegistrationError),
  StackShutdown(E),
  Advertising(AdvStartFailedReason<E>),
}

impl<E: Debug> Display for ThermometerError<E> {
  fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
    match self {
      ThermometerError::Config(e) => write!(f, "invalid configuration: {e}"),
      ThermometerError::Advertisement(e) => write!(f, "cannot build advertisement: {e}"),
      ThermometerError::System(e) => write!(f, "stack error: {e:?}"),
      ThermometerError::Registration(e) => write!(f, "registration failed: {e}"),
      ThermometerError::StackShutdown(e) => write!(f, "stack shut down: {e:?}"),
      ThermometerError::Advertising(e) => write!(f, "advertising failed to start: {e}"),
    }
  }
}

impl<E: Debug> std::error::Error for ThermometerError<E> {}

/// The single owned context handed to the stack as the GATT server callback.
pub struct ThermometerServer<P: Peripheral, S> {
  config: ThermometerConfig,
  advertisement: AdvertisementRequest,
  service: GattService<'static>,
  state: Arc<SharedMeasurement<S>>,
  dispatcher: Option<AccessDispatcher<S>>,
  advertiser: Option<P::Advertiser>,
  link: LinkStateMachine<P::Connection>,
  notifier: PeriodicNotifier,
  failure_tx: Option<oneshot::Sender<ThermometerError<P::SystemError>>>,
}

impl<P, S> ThermometerServer<P, S>
where
  P: Peripheral,
  S: TemperatureSource + 'static,
{
  pub fn new(
    config: ThermometerConfig,
    advertisement: AdvertisementRequest,
    source: S,
    failure_tx: oneshot::Sender<ThermometerError<P::SystemError>>,
  ) -> Self {
    let state = Arc::new(SharedMeasurement::new(source, config.lock_timeout));
    let notifier = PeriodicNotifier::new(config.notify_period);
    Self {
      config,
      advertisement,
      service: thermometer_service(),
      state,
      dispatcher: None,
      advertiser: None,
      link: LinkStateMachine::new(),
      notifier,
      failure_tx: Some(failure_tx),
    }
  }

  fn fail(&mut self, error: ThermometerError<P::SystemError>) {
    error!("Thermometer stopping: {error}");
    self.notifier.disarm();
    if let Some(tx) = self.failure_tx.take() {
      let _ = tx.send(error);
    }
  }

  fn apply(&self, action: LinkAction) {
    match (action, &self.advertiser) {
      (LinkAction::Advertise, Some(advertiser)) => {
        info!("Starting advertising as {:?}", self.config.device_name);
        advertiser.request_start(self.advertisement.clone());
      }
      (LinkAction::Advertise, None) => warn!("Cannot advertise before registration"),
      (LinkAction::Stay, _) => {}
    }
  }

  fn temperature_handle(&self) -> Option<AttributeHandle> {
    self.dispatcher.as_ref().map(|d| d.handles().temperature_value)
  }

  fn on_server_started(&mut self, advertiser: P::Advertiser, handle_mapping: &[(UUID, AttributeHandle)]) {
    let handles = match RegisteredHandles::resolve(&self.service, handle_mapping) {
      Ok(handles) => handles,
      Err(e) => return self.fail(ThermometerError::Registration(e)),
    };
    info!(
      "Server started: temperature={} unit={}",
      handles.temperature_value, handles.unit_value
    );
    for entry in handles.entries() {
      debug!("{:?} -> {}", entry.id, entry.handle);
    }

    self.dispatcher = Some(AccessDispatcher::new(handles, Arc::clone(&self.state)));
    self.advertiser = Some(advertiser);
    let action = self.link.stack_ready();
    self.apply(action);
  }

  fn on_connected(&mut self, connection: &P::Connection) {
    info!("Accepted connection from {}", connection.peer_address());
    self.notifier.disarm();
    self.link.connected(connection.clone());

    if let Some(params) = &self.config.connection_params {
      if let Err(e) = connection.request_connection_params(params) {
        warn!("Connection parameter request failed: {e:?}");
      }
    }
  }

  fn on_link_lost(&mut self, action: LinkAction) {
    self.notifier.disarm();
    self.apply(action);
  }

  fn on_read(
    &self,
    handle: AttributeHandle,
    offset: u16,
    responder: &mut ResponderOf<P>,
  ) {
    let result = match &self.dispatcher {
      Some(dispatcher) => dispatcher.read(handle, offset, self.link.notify_state()),
      None => Err(AttError::InvalidHandle),
    };

    let usable = usize::from(self.link.mtu().usable_value());
    let response = match &result {
      Ok(value) => {
        debug!("Read {handle} offset={offset}: {:02x?}", value.as_slice());
        Ok(Response::new(offset, &value[..value.len().min(usable)]))
      }
      Err(e) => {
        warn!("Rejected read of {handle} offset={offset}: {e}");
        Err(*e)
      }
    };
    if let Err(e) = responder.respond(response) {
      error!("Responder failed: {e:?}");
    }
  }

  fn on_write(
    &mut self,
    connection: &P::Connection,
    handle: AttributeHandle,
    responder: Option<&mut ResponderOf<P>>,
    action: WriteAction,
    offset: u16,
    value: &[u8],
  ) {
    let result = match (action, &self.dispatcher) {
      (WriteAction::Prepare, _) => Err(AttError::RequestNotSupported),
      (WriteAction::Normal, Some(dispatcher)) => dispatcher.write(handle, offset, value),
      (WriteAction::Normal, None) => Err(AttError::InvalidHandle),
    };

    let response = match &result {
      Ok(_) => Ok(Response::complete(&[])),
      Err(e) => {
        warn!("Rejected write to {handle} offset={offset}: {e}, value={value:02x?}");
        Err(*e)
      }
    };
    if let Some(responder) = responder {
      if let Err(e) = responder.respond(response) {
        error!("Responder failed: {e:?}");
      }
    }

    match result {
      Ok(WriteOutcome::Unit { unit, changed }) => {
        info!("Unit set to {unit} (changed={changed})");
        if changed {
          self.push_now(connection);
        }
      }
      Ok(WriteOutcome::ClientConfiguration { notify }) => {
        if let Some(temperature) = self.temperature_handle() {
          self.on_subscription(connection, temperature, notify, None);
        }
      }
      Err(_) => {}
    }
  }

  fn on_subscription(
    &mut self,
    connection: &P::Connection,
    handle: AttributeHandle,
    enabled: bool,
    writer: Option<WriterOf<P>>,
  ) {
    let Some(temperature) = self.temperature_handle() else {
      warn!("Subscription change on {handle} before registration");
      return;
    };
    if handle != temperature {
      debug!("Subscription change on {handle} treated as disable");
    }
    let enabled = enabled && handle == temperature;

    match self.link.subscription_changed(enabled) {
      SubscriptionAction::NotifyAndArm => {
        info!("{} subscribed to temperature", connection.peer_address());
        let mut writer = writer.unwrap_or_else(|| connection.writer(temperature));
        push_measurement(&self.state, &mut writer);
        self.notifier.arm(Arc::clone(&self.state), writer);
      }
      SubscriptionAction::Disarm => {
        info!("{} unsubscribed from temperature", connection.peer_address());
        self.notifier.disarm();
      }
      SubscriptionAction::Ignore => {}
    }
  }

  /// Notify the current temperature outside the periodic schedule, if subscribed.
  fn push_now(&self, connection: &P::Connection) {
    match self.temperature_handle() {
      Some(temperature) if self.link.notify_state() => {
        push_measurement(&self.state, &mut connection.writer(temperature));
      }
      _ => {}
    }
  }
}

impl<P, S> GattServerCallback<P> for ThermometerServer<P, S>
where
  P: Peripheral + Debug,
  S: TemperatureSource + 'static,
{
  fn on_event(&mut self, event: GattServerEvent<'_, P>) {
    trace!("event: {event:?}");
    match event {
      GattServerEvent::ServerStarted { advertiser, handle_mapping } => {
        self.on_server_started(advertiser, handle_mapping);
      }
      GattServerEvent::ServerShutdown { error } => {
        self.fail(ThermometerError::StackShutdown(error));
      }
      GattServerEvent::AdvertisingStarted { remaining_connections } => {
        info!("Advertising started");
        debug!("remaining_connections={remaining_connections:?}");
        self.link.advertising_started();
      }
      GattServerEvent::AdvertisingStopped { reason } => {
        info!("Advertising stopped: reason={reason:?}");
        let action = self.link.advertising_stopped(reason);
        self.apply(action);
      }
      GattServerEvent::AdvertisingStartFail { reason } => {
        self.fail(ThermometerError::Advertising(reason));
      }
      GattServerEvent::Connected { connection } => {
        self.on_connected(connection);
      }
      GattServerEvent::ConnectionFailed { reason } => {
        warn!("Connection failed: {reason:?}");
        let action = self.link.connection_failed();
        self.on_link_lost(action);
      }
      GattServerEvent::Disconnected { connection, reason } => {
        info!("Disconnected from {}: {reason:?}", connection.peer_address());
        let (_, action) = self.link.disconnected();
        self.on_link_lost(action);
      }
      GattServerEvent::MtuChanged { connection, mtu } => {
        info!("MTU changed on {}: mtu={mtu}", connection.peer_address());
        self.link.mtu_changed(mtu);
      }
      GattServerEvent::ReadRequest { connection, handle, offset, responder } => {
        trace!("Read request from {}", connection.peer_address());
        self.on_read(handle, offset, responder);
      }
      GattServerEvent::WriteRequest { connection, handle, responder, action, offset, value } => {
        debug!("Write request on {handle}: action={action:?} offset={offset} len={}", value.len());
        self.on_write(connection, handle, responder, action, offset, value);
      }
      GattServerEvent::ExecuteWrite { connection, handle, responder, action } => {
        warn!("Execute write ({action:?}) on {handle} from {} not supported", connection.peer_address());
        if let Err(e) = responder.respond(Err(AttError::RequestNotSupported)) {
          error!("Responder failed: {e:?}");
        }
      }
      GattServerEvent::Subscribe { connection, handle, writer } => {
        self.on_subscription(connection, handle, true, Some(writer.clone()));
      }
      GattServerEvent::Unsubscribe { connection, handle } => {
        self.on_subscription(connection, handle, false, None);
      }
    }
  }
}
