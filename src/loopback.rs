//! In-process BLE stack.
//!
//! [LoopbackPeripheral] implements the peripheral traits on top of a tokio event loop, the
//! same shape a BlueZ or NimBLE adapter takes, and [LoopbackCentral] plays the remote side:
//! it connects, issues ATT requests and collects notifications.

use core::fmt::{Debug, Display, Formatter};
use core::num::NonZeroU16;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, trace, warn};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::advertisement::{AdvertisementRequest, ConnectMode};
use crate::att_error::AttError;
use crate::bluetooth_address::BluetoothAddress;
use crate::bluetooth_error::BluetoothError;
use crate::descriptors::{AttributeHandle, GattService, UUID};
use crate::gap_advertiser::GapAdvertiser;
use crate::gatt_connection::{ConnectionParams, GattConnection, GattResponder, GattWriter, Response};
use crate::gatt_server_cb::*;
use crate::mtu::Mtu;
use crate::peripheral::Peripheral;

/// Address the central connects from unless told otherwise.
pub const DEFAULT_CENTRAL_ADDRESS: BluetoothAddress =
  BluetoothAddress([0xC0, 0xFF, 0xEE, 0x00, 0x00, 0x01]);

#[derive(Debug)]
pub struct LoopbackPeripheral {
  capacity: Option<u16>,
  link: Arc<Link>,
  events_tx: mpsc::UnboundedSender<Event>,
  events_rx: mpsc::UnboundedReceiver<Event>,
  notifications_tx: mpsc::UnboundedSender<Notification>,
  advertisements_tx: mpsc::UnboundedSender<AdvertisementRequest>,
}

impl LoopbackPeripheral {
  pub fn new() -> (Self, LoopbackCentral) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (notifications_tx, notifications_rx) = mpsc::unbounded_channel();
    let (advertisements_tx, advertisements_rx) = mpsc::unbounded_channel();
    let link = Arc::new(Link::default());

    let central = LoopbackCentral {
      events: events_tx.clone(),
      notifications: notifications_rx,
      advertisements: advertisements_rx,
      link: Arc::clone(&link),
    };
    let peripheral = Self {
      capacity: None,
      link,
      events_tx,
      events_rx,
      notifications_tx,
      advertisements_tx,
    };
    (peripheral, central)
  }

  /// Limit the attribute table to `capacity` handles.
  pub fn with_capacity(mut self, capacity: u16) -> Self {
    self.capacity = Some(capacity);
    self
  }
}

impl Peripheral for LoopbackPeripheral {
  type SystemError = LoopbackError;
  type Handle = LoopbackHandle;
  type Advertiser = LoopbackAdvertiser;
  type Connection = LoopbackConnection;

  fn set_name(&mut self, name: &str) -> Result<(), Self::SystemError> {
    self.link.ident.lock().name = Some(name.to_owned());
    Ok(())
  }

  fn set_appearance(&mut self, appearance: u16) -> Result<(), Self::SystemError> {
    self.link.ident.lock().appearance = Some(appearance);
    Ok(())
  }

  fn configure_gatt_server(
    self,
    services: &[GattService<'_>],
    callback: impl GattServerCallback<Self> + Send + 'static,
  ) -> Result<Self::Handle, Self::SystemError> {
    let required: u32 = services.iter().map(|s| u32::from(s.attribute_count())).sum();
    if let Some(capacity) = self.capacity {
      if required > u32::from(capacity) {
        return Err(LoopbackError::TableFull { required, capacity });
      }
    }

    let mut allocator = HandleAllocator::new();
    for service in services {
      allocator.reserve()?;
      for characteristic in &service.characteristics {
        allocator.reserve()?;
        allocator.next(characteristic.uuid)?;
        for descriptor in characteristic.descriptors {
          allocator.next(descriptor.uuid)?;
        }
      }
    }
    debug!("Allocated {} handles, {} mapped", allocator.allocated, allocator.mapping.len());
    *self.link.mapping.lock() = allocator.mapping.clone();

    let advertiser = LoopbackAdvertiser { tx: self.events_tx.clone() };
    let stack = LoopState {
      link: self.link,
      notifications_tx: self.notifications_tx,
      advertisements_tx: self.advertisements_tx,
      advertising: None,
      connection: None,
      next_connection_id: 1,
    };
    tokio::spawn(run_event_loop(
      stack,
      self.events_rx,
      advertiser,
      allocator.mapping,
      callback,
    ));

    Ok(LoopbackHandle { tx: self.events_tx })
  }
}

struct HandleAllocator {
  next: Option<NonZeroU16>,
  allocated: u16,
  mapping: Vec<(UUID, AttributeHandle)>,
}

impl HandleAllocator {
  pub fn new() -> Self {
    Self {
      next: NonZeroU16::new(1),
      allocated: 0,
      mapping: Vec::new(),
    }
  }

  /// Allocate a handle the application never sees events for (declarations).
  pub fn reserve(&mut self) -> Result<AttributeHandle, LoopbackError> {
    let handle = self.next.ok_or(LoopbackError::HandlesExhausted)?;
    self.next = handle.checked_add(1);
    self.allocated += 1;
    Ok(AttributeHandle(handle))
  }

  pub fn next(&mut self, uuid: UUID) -> Result<AttributeHandle, LoopbackError> {
    let handle = self.reserve()?;
    self.mapping.push((uuid, handle));
    Ok(handle)
  }
}

/// State shared by the stack and the central.
#[derive(Debug)]
struct Link {
  ident: Mutex<DeviceIdent>,
  mapping: Mutex<Vec<(UUID, AttributeHandle)>>,
  connection_params: Mutex<Option<ConnectionParams>>,

  /// Id of the live connection, 0 when disconnected.
  connection_id: AtomicU64,
  mtu: AtomicU16,
}

impl Default for Link {
  fn default() -> Self {
    Self {
      ident: Mutex::default(),
      mapping: Mutex::default(),
      connection_params: Mutex::default(),
      connection_id: AtomicU64::new(0),
      mtu: AtomicU16::new(Mtu::MINIMUM),
    }
  }
}

impl Link {
  fn mtu(&self) -> Mtu {
    Mtu::new(self.mtu.load(Ordering::Acquire))
  }

  fn is_current(&self, connection_id: u64) -> bool {
    connection_id != 0 && self.connection_id.load(Ordering::Acquire) == connection_id
  }
}

#[derive(Debug, Default)]
struct DeviceIdent {
  name: Option<String>,
  appearance: Option<u16>,
}

type Reply = oneshot::Sender<Result<Vec<u8>, CentralError>>;

enum Event {
  HandleDropped,
  InjectShutdown,
  RequestAdvStart(AdvertisementRequest),
  RequestAdvStop,
  Connect { address: BluetoothAddress, reply: Reply },
  FailConnection { reason: BluetoothError, reply: Reply },
  Disconnect { reason: BluetoothError, reply: Reply },
  ExpireAdvertising { reply: Reply },
  ChangeMtu { mtu: u16, reply: Reply },
  Read { handle: AttributeHandle, offset: u16, reply: Reply },
  Write {
    handle: AttributeHandle,
    action: WriteAction,
    offset: u16,
    value: Vec<u8>,
    with_response: bool,
    reply: Reply,
  },
  ExecuteWrite { handle: AttributeHandle, action: ExecWriteAction, reply: Reply },
  Subscribe { handle: AttributeHandle, reply: Reply },
  Unsubscribe { handle: AttributeHandle, reply: Reply },
}

struct LoopState {
  link: Arc<Link>,
  notifications_tx: mpsc::UnboundedSender<Notification>,
  advertisements_tx: mpsc::UnboundedSender<AdvertisementRequest>,
  advertising: Option<AdvertisementRequest>,
  connection: Option<LoopbackConnection>,
  next_connection_id: u64,
}

impl LoopState {
  fn connected(&self) -> Result<LoopbackConnection, CentralError> {
    self.connection.clone().ok_or(CentralError::NotConnected)
  }
}

async fn run_event_loop(
  mut stack: LoopState,
  mut rx: mpsc::UnboundedReceiver<Event>,
  advertiser: LoopbackAdvertiser,
  handle_mapping: Vec<(UUID, AttributeHandle)>,
  mut callback: impl GattServerCallback<LoopbackPeripheral>,
) {
  callback.on_event(GattServerEvent::ServerStarted {
    advertiser,
    handle_mapping: &handle_mapping,
  });

  while let Some(event) = rx.recv().await {
    match event {
      Event::HandleDropped => {
        debug!("Handle dropped, shutting down!");
        stack.link.connection_id.store(0, Ordering::Release);
        return;
      }
      Event::InjectShutdown => {
        callback.on_event(GattServerEvent::ServerShutdown {
          error: LoopbackError::ServerGone,
        });
      }
      Event::RequestAdvStart(request) => {
        let event = if stack.connection.is_some() {
          GattServerEvent::AdvertisingStartFail {
            reason: AdvStartFailedReason::MaxConnectionsReached,
          }
        } else if request.params.connect_mode == ConnectMode::Directed {
          GattServerEvent::AdvertisingStartFail {
            reason: AdvStartFailedReason::UnsupportedFeature("directed advertising"),
          }
        } else {
          trace!("Advertising payload: {:02x?}", &*request.payload);
          let _ = stack.advertisements_tx.send(request.clone());
          stack.advertising = Some(request);
          GattServerEvent::AdvertisingStarted {
            remaining_connections: Some(1),
          }
        };
        callback.on_event(event);
      }
      Event::RequestAdvStop => {
        if stack.advertising.take().is_some() {
          callback.on_event(GattServerEvent::AdvertisingStopped {
            reason: AdvStopReason::Requested,
          });
        }
      }
      Event::Connect { address, reply } => {
        let result = match (&stack.connection, &stack.advertising) {
          (Some(_), _) => Err(CentralError::AlreadyConnected),
          (None, Some(adv)) if adv.params.connect_mode != ConnectMode::None => Ok(()),
          (None, _) => Err(CentralError::NotAdvertising),
        };
        if result.is_ok() {
          stack.advertising = None;
          let id = stack.next_connection_id;
          stack.next_connection_id += 1;
          stack.link.mtu.store(Mtu::MINIMUM, Ordering::Release);
          *stack.link.connection_params.lock() = None;
          stack.link.connection_id.store(id, Ordering::Release);

          let connection = LoopbackConnection {
            address,
            id,
            link: Arc::clone(&stack.link),
            notifications_tx: stack.notifications_tx.clone(),
          };
          callback.on_event(GattServerEvent::Connected { connection: &connection });
          stack.connection = Some(connection);
          callback.on_event(GattServerEvent::AdvertisingStopped {
            reason: AdvStopReason::AcceptedConnection,
          });
        }
        let _ = reply.send(result.map(|_| Vec::new()));
      }
      Event::FailConnection { reason, reply } => {
        let result = match (&stack.connection, &stack.advertising) {
          (Some(_), _) => Err(CentralError::AlreadyConnected),
          (None, Some(_)) => {
            stack.advertising = None;
            Ok(Vec::new())
          }
          (None, None) => Err(CentralError::NotAdvertising),
        };
        if result.is_ok() {
          callback.on_event(GattServerEvent::ConnectionFailed { reason });
        }
        let _ = reply.send(result);
      }
      Event::Disconnect { reason, reply } => {
        let result = match stack.connection.take() {
          Some(connection) => {
            stack.link.connection_id.store(0, Ordering::Release);
            callback.on_event(GattServerEvent::Disconnected {
              connection: &connection,
              reason,
            });
            Ok(Vec::new())
          }
          None => Err(CentralError::NotConnected),
        };
        let _ = reply.send(result);
      }
      Event::ExpireAdvertising { reply } => {
        let result = match stack.advertising.take() {
          Some(_) => {
            callback.on_event(GattServerEvent::AdvertisingStopped {
              reason: AdvStopReason::Completed,
            });
            Ok(Vec::new())
          }
          None => Err(CentralError::NotAdvertising),
        };
        let _ = reply.send(result);
      }
      Event::ChangeMtu { mtu, reply } => {
        let result = stack.connected().map(|connection| {
          let mtu = Mtu::new(mtu);
          stack.link.mtu.store(mtu.negotiated_value(), Ordering::Release);
          callback.on_event(GattServerEvent::MtuChanged { connection: &connection, mtu });
          Vec::new()
        });
        let _ = reply.send(result);
      }
      Event::Read { handle, offset, reply } => match stack.connected() {
        Ok(connection) => {
          let mut responder = LoopbackResponder { tx: Some(reply) };
          callback.on_event(GattServerEvent::ReadRequest {
            connection: &connection,
            handle,
            offset,
            responder: &mut responder,
          });
        }
        Err(e) => {
          let _ = reply.send(Err(e));
        }
      },
      Event::Write { handle, action, offset, value, with_response, reply } => match stack.connected() {
        Ok(connection) if with_response => {
          let mut responder = LoopbackResponder { tx: Some(reply) };
          callback.on_event(GattServerEvent::WriteRequest {
            connection: &connection,
            handle,
            responder: Some(&mut responder),
            action,
            offset,
            value: &value,
          });
        }
        Ok(connection) => {
          callback.on_event(GattServerEvent::WriteRequest {
            connection: &connection,
            handle,
            responder: None,
            action,
            offset,
            value: &value,
          });
          let _ = reply.send(Ok(Vec::new()));
        }
        Err(e) => {
          let _ = reply.send(Err(e));
        }
      },
      Event::ExecuteWrite { handle, action, reply } => match stack.connected() {
        Ok(connection) => {
          let mut responder = LoopbackResponder { tx: Some(reply) };
          callback.on_event(GattServerEvent::ExecuteWrite {
            connection: &connection,
            handle,
            responder: &mut responder,
            action,
          });
        }
        Err(e) => {
          let _ = reply.send(Err(e));
        }
      },
      Event::Subscribe { handle, reply } => {
        let result = stack.connected().map(|connection| {
          let mut writer = connection.writer(handle);
          callback.on_event(GattServerEvent::Subscribe {
            connection: &connection,
            handle,
            writer: &mut writer,
          });
          Vec::new()
        });
        let _ = reply.send(result);
      }
      Event::Unsubscribe { handle, reply } => {
        let result = stack.connected().map(|connection| {
          callback.on_event(GattServerEvent::Unsubscribe {
            connection: &connection,
            handle,
          });
          Vec::new()
        });
        let _ = reply.send(result);
      }
    }
  }
}

/// Keeps the loopback stack running.  Dropping it stops the event loop and drops the callback.
pub struct LoopbackHandle {
  tx: mpsc::UnboundedSender<Event>,
}

impl Debug for LoopbackHandle {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("LoopbackHandle").finish_non_exhaustive()
  }
}

impl Drop for LoopbackHandle {
  fn drop(&mut self) {
    let _ = self.tx.send(Event::HandleDropped);
  }
}

#[derive(Clone)]
pub struct LoopbackAdvertiser {
  tx: mpsc::UnboundedSender<Event>,
}

impl Debug for LoopbackAdvertiser {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("LoopbackAdvertiser").finish_non_exhaustive()
  }
}

impl GapAdvertiser for LoopbackAdvertiser {
  fn request_start(&self, request: AdvertisementRequest) {
    let _ = self.tx.send(Event::RequestAdvStart(request));
  }

  fn request_stop(&self) {
    let _ = self.tx.send(Event::RequestAdvStop);
  }
}

#[derive(Clone)]
pub struct LoopbackConnection {
  address: BluetoothAddress,
  id: u64,
  link: Arc<Link>,
  notifications_tx: mpsc::UnboundedSender<Notification>,
}

impl Debug for LoopbackConnection {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("LoopbackConnection")
      .field("address", &self.address)
      .field("id", &self.id)
      .finish_non_exhaustive()
  }
}

impl GattConnection for LoopbackConnection {
  type SystemError = LoopbackError;
  type Responder = LoopbackResponder;
  type Writer = LoopbackWriter;

  fn peer_address(&self) -> &BluetoothAddress {
    &self.address
  }

  fn writer(&self, handle: AttributeHandle) -> Self::Writer {
    LoopbackWriter {
      handle,
      connection_id: self.id,
      link: Arc::clone(&self.link),
      tx: self.notifications_tx.clone(),
    }
  }

  fn request_connection_params(&self, params: &ConnectionParams) -> Result<(), Self::SystemError> {
    if !self.link.is_current(self.id) {
      return Err(LoopbackError::NotConnected);
    }
    *self.link.connection_params.lock() = Some(*params);
    Ok(())
  }
}

#[derive(Debug)]
pub struct LoopbackResponder {
  tx: Option<Reply>,
}

impl GattResponder for LoopbackResponder {
  type SystemError = LoopbackError;

  fn respond(&mut self, response: Result<Response<'_>, AttError>) -> Result<(), Self::SystemError> {
    let mapped = response
      .map(|r| r.value.to_vec())
      .map_err(CentralError::Att);
    self
      .tx
      .take()
      .ok_or(LoopbackError::AlreadyResponded)?
      .send(mapped)
      .map_err(|_| LoopbackError::CentralGone)
  }
}

impl Drop for LoopbackResponder {
  fn drop(&mut self) {
    if let Some(tx) = self.tx.take() {
      warn!("Failed to call respond on GattResponder!");
      let _ = tx.send(Err(CentralError::Att(AttError::Unlikely)));
    }
  }
}

#[derive(Clone)]
pub struct LoopbackWriter {
  handle: AttributeHandle,
  connection_id: u64,
  link: Arc<Link>,
  tx: mpsc::UnboundedSender<Notification>,
}

impl Debug for LoopbackWriter {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("LoopbackWriter")
      .field("handle", &self.handle)
      .field("connection_id", &self.connection_id)
      .finish_non_exhaustive()
  }
}

impl GattWriter for LoopbackWriter {
  type SystemError = LoopbackError;

  fn write(&mut self, value: &[u8]) -> Result<(), Self::SystemError> {
    if !self.link.is_current(self.connection_id) {
      return Err(LoopbackError::NotConnected);
    }
    let mtu = self.link.mtu();
    if !mtu.fits(value.len()) {
      return Err(LoopbackError::PayloadTooLarge {
        len: value.len(),
        max: mtu.usable_value(),
      });
    }
    self
      .tx
      .send(Notification { handle: self.handle, value: value.to_vec() })
      .map_err(|_| LoopbackError::CentralGone)
  }
}

/// A notification as received by the central.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  pub handle: AttributeHandle,
  pub value: Vec<u8>,
}

/// Errors raised by the stack side of the loopback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopbackError {
  TableFull { required: u32, capacity: u16 },
  HandlesExhausted,
  NotConnected,
  PayloadTooLarge { len: usize, max: u16 },
  AlreadyResponded,
  CentralGone,
  ServerGone,
}

impl Display for LoopbackError {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      LoopbackError::TableFull { required, capacity } => {
        write!(f, "attribute table needs {required} handles, capacity is {capacity}")
      }
      LoopbackError::HandlesExhausted => write!(f, "attribute handles exhausted"),
      LoopbackError::NotConnected => write!(f, "connection is gone"),
      LoopbackError::PayloadTooLarge { len, max } => {
        write!(f, "{len} byte payload exceeds usable MTU of {max}")
      }
      LoopbackError::AlreadyResponded => write!(f, "request already answered"),
      LoopbackError::CentralGone => write!(f, "central dropped"),
      LoopbackError::ServerGone => write!(f, "server stopped"),
    }
  }
}

impl std::error::Error for LoopbackError {}

/// Errors seen by the central.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CentralError {
  NotConnected,
  NotAdvertising,
  AlreadyConnected,
  Att(AttError),
  ServerGone,
}

impl Display for CentralError {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      CentralError::NotConnected => write!(f, "not connected"),
      CentralError::NotAdvertising => write!(f, "peripheral is not advertising"),
      CentralError::AlreadyConnected => write!(f, "already connected"),
      CentralError::Att(e) => write!(f, "ATT error: {e}"),
      CentralError::ServerGone => write!(f, "server stopped"),
    }
  }
}

impl std::error::Error for CentralError {}

/// Remote side of a [LoopbackPeripheral].
#[derive(Debug)]
pub struct LoopbackCentral {
  events: mpsc::UnboundedSender<Event>,
  notifications: mpsc::UnboundedReceiver<Notification>,
  advertisements: mpsc::UnboundedReceiver<AdvertisementRequest>,
  link: Arc<Link>,
}

impl LoopbackCentral {
  async fn request(&self, event: impl FnOnce(Reply) -> Event) -> Result<Vec<u8>, CentralError> {
    let (tx, rx) = oneshot::channel();
    self.events.send(event(tx)).map_err(|_| CentralError::ServerGone)?;
    rx.await.map_err(|_| CentralError::ServerGone)?
  }

  /// Wait for the next advertisement the peripheral starts.
  pub async fn next_advertisement(&mut self) -> Option<AdvertisementRequest> {
    self.advertisements.recv().await
  }

  pub fn try_next_advertisement(&mut self) -> Option<AdvertisementRequest> {
    self.advertisements.try_recv().ok()
  }

  /// Value handle the stack assigned to `uuid` (characteristic or descriptor).
  pub fn handle_of(&self, uuid: UUID) -> Option<AttributeHandle> {
    self
      .link
      .mapping
      .lock()
      .iter()
      .find(|(u, _)| *u == uuid)
      .map(|(_, h)| *h)
  }

  pub fn device_name(&self) -> Option<String> {
    self.link.ident.lock().name.clone()
  }

  pub fn appearance(&self) -> Option<u16> {
    self.link.ident.lock().appearance
  }

  /// Parameters the peripheral asked for on the current connection.
  pub fn connection_params(&self) -> Option<ConnectionParams> {
    *self.link.connection_params.lock()
  }

  pub fn mtu(&self) -> Mtu {
    self.link.mtu()
  }

  pub async fn connect(&self) -> Result<(), CentralError> {
    self.connect_as(DEFAULT_CENTRAL_ADDRESS).await
  }

  pub async fn connect_as(&self, address: BluetoothAddress) -> Result<(), CentralError> {
    self.request(|reply| Event::Connect { address, reply }).await.map(drop)
  }

  /// Abort a connection attempt before it is established.
  pub async fn fail_connection(&self, reason: BluetoothError) -> Result<(), CentralError> {
    self.request(|reply| Event::FailConnection { reason, reply }).await.map(drop)
  }

  pub async fn disconnect(&self, reason: BluetoothError) -> Result<(), CentralError> {
    self.request(|reply| Event::Disconnect { reason, reply }).await.map(drop)
  }

  /// End the current advertising set as if its duration elapsed.
  pub async fn expire_advertising(&self) -> Result<(), CentralError> {
    self.request(|reply| Event::ExpireAdvertising { reply }).await.map(drop)
  }

  pub async fn change_mtu(&self, mtu: u16) -> Result<(), CentralError> {
    self.request(|reply| Event::ChangeMtu { mtu, reply }).await.map(drop)
  }

  /// Make the stack report a spurious shutdown to the server.
  pub fn inject_shutdown(&self) -> Result<(), CentralError> {
    self.events.send(Event::InjectShutdown).map_err(|_| CentralError::ServerGone)
  }

  pub async fn read(&self, handle: AttributeHandle) -> Result<Vec<u8>, CentralError> {
    self.read_at(handle, 0).await
  }

  pub async fn read_at(&self, handle: AttributeHandle, offset: u16) -> Result<Vec<u8>, CentralError> {
    self.request(|reply| Event::Read { handle, offset, reply }).await
  }

  /// Read a value of any length by following up with offset reads while responses come back
  /// full.
  pub async fn read_long(&self, handle: AttributeHandle) -> Result<Vec<u8>, CentralError> {
    let chunk = usize::from(self.mtu().usable_value());
    let mut value = Vec::new();
    loop {
      let offset = u16::try_from(value.len()).map_err(|_| CentralError::Att(AttError::InvalidOffset))?;
      let part = self.read_at(handle, offset).await?;
      let done = part.len() < chunk;
      value.extend(part);
      if done {
        return Ok(value);
      }
    }
  }

  pub async fn write(&self, handle: AttributeHandle, value: &[u8]) -> Result<(), CentralError> {
    self.send_write(handle, WriteAction::Normal, 0, value, true).await
  }

  pub async fn write_at(&self, handle: AttributeHandle, offset: u16, value: &[u8]) -> Result<(), CentralError> {
    self.send_write(handle, WriteAction::Normal, offset, value, true).await
  }

  /// Write without response.  Rejections are invisible to the central.
  pub async fn write_command(&self, handle: AttributeHandle, value: &[u8]) -> Result<(), CentralError> {
    self.send_write(handle, WriteAction::Normal, 0, value, false).await
  }

  pub async fn prepare_write(&self, handle: AttributeHandle, offset: u16, value: &[u8]) -> Result<(), CentralError> {
    self.send_write(handle, WriteAction::Prepare, offset, value, true).await
  }

  pub async fn execute_write(&self, handle: AttributeHandle, action: ExecWriteAction) -> Result<(), CentralError> {
    self.request(|reply| Event::ExecuteWrite { handle, action, reply }).await.map(drop)
  }

  async fn send_write(
    &self,
    handle: AttributeHandle,
    action: WriteAction,
    offset: u16,
    value: &[u8],
    with_response: bool,
  ) -> Result<(), CentralError> {
    let value = value.to_vec();
    self
      .request(|reply| Event::Write { handle, action, offset, value, with_response, reply })
      .await
      .map(drop)
  }

  /// Enable updates the way BlueZ-style stacks report them, as a subscribe event.
  pub async fn subscribe(&self, handle: AttributeHandle) -> Result<(), CentralError> {
    self.request(|reply| Event::Subscribe { handle, reply }).await.map(drop)
  }

  pub async fn unsubscribe(&self, handle: AttributeHandle) -> Result<(), CentralError> {
    self.request(|reply| Event::Unsubscribe { handle, reply }).await.map(drop)
  }

  pub async fn next_notification(&mut self) -> Option<Notification> {
    self.notifications.recv().await
  }

  pub fn try_next_notification(&mut self) -> Option<Notification> {
    self.notifications.try_recv().ok()
  }
}
