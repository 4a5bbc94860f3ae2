use core::fmt::{Debug, Display, Formatter};

use crate::bluetooth_error::BluetoothError;
use crate::descriptors::{AttributeHandle, UUID};
use crate::gatt_connection::GattConnection;
use crate::mtu::Mtu;
use crate::peripheral::Peripheral;

/// Receives every event the stack produces for a configured GATT server, one at a time and in
/// order.
pub trait GattServerCallback<P: Peripheral + ?Sized> {
  fn on_event(&mut self, event: GattServerEvent<'_, P>);
}

impl<P, F> GattServerCallback<P> for F
where
  F: FnMut(GattServerEvent<P>),
  P: Peripheral,
{
  fn on_event(&mut self, event: GattServerEvent<'_, P>) {
    (self)(event)
  }
}

#[derive(Debug)]
pub enum GattServerEvent<'a, P: Peripheral + ?Sized> {
  /// Handles have been assigned and the server is live.  Always the first event.
  ServerStarted {
    /// Needed to become connectable; keep it for re-advertising after disconnects.
    advertiser: P::Advertiser,

    /// Handle of every characteristic value and descriptor, keyed by UUID.  Declarations are
    /// served by the stack and do not appear here.
    handle_mapping: &'a [(UUID, AttributeHandle)],
  },

  /// The stack stopped on its own.  No further events follow and the advertiser is dead.
  ServerShutdown { error: P::SystemError },

  AdvertisingStarted {
    /// Connections the stack can still accept, if it knows.
    remaining_connections: Option<u16>,
  },

  /// No new connections are accepted until advertising is started again.
  AdvertisingStopped { reason: AdvStopReason },

  AdvertisingStartFail {
    reason: AdvStartFailedReason<P::SystemError>,
  },

  /// A central connected.  Advertising is stopped by the stack when this happens.
  Connected { connection: &'a P::Connection },

  /// A connection attempt was never established.  Advertising has stopped and must be
  /// restarted explicitly.
  ConnectionFailed { reason: BluetoothError },

  /// The link dropped.  Advertising is not restarted on our behalf.
  Disconnected {
    connection: &'a P::Connection,
    reason: BluetoothError,
  },

  MtuChanged {
    connection: &'a P::Connection,

    /// Payloads of attribute values must fit in [Mtu::usable_value].
    mtu: Mtu,
  },

  ReadRequest {
    connection: &'a P::Connection,
    handle: AttributeHandle,

    /// Non-zero when the central continues a long read.
    offset: u16,

    responder: &'a mut <P::Connection as GattConnection>::Responder,
  },

  /// Write to a characteristic or descriptor.  Table-driven stacks deliver Client
  /// Characteristic Configuration writes here rather than as [GattServerEvent::Subscribe].
  WriteRequest {
    connection: &'a P::Connection,
    handle: AttributeHandle,

    /// `None` for write commands, which get no response.
    responder: Option<&'a mut <P::Connection as GattConnection>::Responder>,

    action: WriteAction,
    offset: u16,
    value: &'a [u8],
  },

  /// Commit or discard the writes queued with [WriteAction::Prepare].
  ExecuteWrite {
    connection: &'a P::Connection,
    handle: AttributeHandle,
    responder: &'a mut <P::Connection as GattConnection>::Responder,
    action: ExecWriteAction,
  },

  /// The central enabled updates on `handle`.  Stacks that manage the CCC descriptor
  /// themselves report it this way; clone `writer` to send notifications later.
  Subscribe {
    connection: &'a P::Connection,
    handle: AttributeHandle,
    writer: &'a mut <P::Connection as GattConnection>::Writer,
  },

  /// The central disabled updates on `handle`.
  Unsubscribe {
    connection: &'a P::Connection,
    handle: AttributeHandle,
  },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AdvStopReason {
  /// Single-connection stacks stop advertising once a central is accepted.
  AcceptedConnection,

  /// [crate::gap_advertiser::GapAdvertiser::request_stop] was called.
  Requested,

  /// The requested advertising duration elapsed without a connection.
  Completed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvStartFailedReason<E: Debug> {
  /// The request asked for something this stack cannot do.  Programmer error.
  UnsupportedFeature(&'static str),

  /// A connectable advertisement was requested while no connection slot is free.
  MaxConnectionsReached,

  SystemError(E),
}

impl<E: Debug> Display for AdvStartFailedReason<E> {
  fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
    match self {
      AdvStartFailedReason::UnsupportedFeature(what) => write!(f, "unsupported feature: {what}"),
      AdvStartFailedReason::MaxConnectionsReached => write!(f, "maximum connections reached"),
      AdvStartFailedReason::SystemError(e) => write!(f, "system error: {e:?}"),
    }
  }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExecWriteAction {
  Commit,
  Cancel,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WriteAction {
  /// Queue until [GattServerEvent::ExecuteWrite].
  Prepare,

  Normal,
}
