//! Advertising and connection lifecycle for a single central.

use crate::gatt_server_cb::AdvStopReason;
use crate::mtu::Mtu;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LinkState {
  Idle,
  Advertising,
  Connected,
}

/// What the server should do with the advertiser after a transition.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LinkAction {
  Advertise,
  Stay,
}

/// What the server should do with the notifier after a subscription change.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SubscriptionAction {
  /// Freshly enabled: send one notification now and arm the periodic notifier.
  NotifyAndArm,
  Disarm,
  Ignore,
}

#[derive(Debug)]
pub struct LinkStateMachine<C> {
  state: LinkState,
  connection: Option<C>,
  notify_state: bool,
  mtu: Mtu,
}

impl<C> Default for LinkStateMachine<C> {
  fn default() -> Self {
    Self {
      state: LinkState::Idle,
      connection: None,
      notify_state: false,
      mtu: Mtu::default(),
    }
  }
}

impl<C> LinkStateMachine<C> {
  pub fn new() -> Self {
    Default::default()
  }

  pub fn state(&self) -> LinkState {
    self.state
  }

  pub fn connection(&self) -> Option<&C> {
    self.connection.as_ref()
  }

  pub fn notify_state(&self) -> bool {
    self.notify_state
  }

  pub fn mtu(&self) -> Mtu {
    self.mtu
  }

  /// Registration finished; the first advertisement can go out.
  pub fn stack_ready(&mut self) -> LinkAction {
    self.clear();
    LinkAction::Advertise
  }

  pub fn advertising_started(&mut self) {
    if self.state != LinkState::Connected {
      self.state = LinkState::Advertising;
    }
  }

  pub fn advertising_stopped(&mut self, reason: AdvStopReason) -> LinkAction {
    if self.state == LinkState::Connected {
      return LinkAction::Stay;
    }
    self.state = LinkState::Idle;
    match reason {
      AdvStopReason::Completed => LinkAction::Advertise,
      AdvStopReason::AcceptedConnection | AdvStopReason::Requested => LinkAction::Stay,
    }
  }

  pub fn connected(&mut self, connection: C) {
    self.state = LinkState::Connected;
    self.connection = Some(connection);
    self.notify_state = false;
    self.mtu = Mtu::default();
  }

  pub fn connection_failed(&mut self) -> LinkAction {
    self.clear();
    LinkAction::Advertise
  }

  /// Drop the connection.  Returns the connection that was live, if any.
  pub fn disconnected(&mut self) -> (Option<C>, LinkAction) {
    let previous = self.connection.take();
    self.clear();
    (previous, LinkAction::Advertise)
  }

  /// The central changed its subscription to the temperature characteristic.
  pub fn subscription_changed(&mut self, enabled: bool) -> SubscriptionAction {
    if self.state != LinkState::Connected {
      return SubscriptionAction::Ignore;
    }
    let was_enabled = core::mem::replace(&mut self.notify_state, enabled);
    match (was_enabled, enabled) {
      (false, true) => SubscriptionAction::NotifyAndArm,
      (true, false) => SubscriptionAction::Disarm,
      _ => SubscriptionAction::Ignore,
    }
  }

  pub fn mtu_changed(&mut self, mtu: Mtu) {
    self.mtu = mtu;
  }

  fn clear(&mut self) {
    self.state = LinkState::Idle;
    self.connection = None;
    self.notify_state = false;
    self.mtu = Mtu::default();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn full_cycle_returns_to_advertising() {
    let mut link = LinkStateMachine::<&str>::new();
    assert_eq!(link.stack_ready(), LinkAction::Advertise);
    link.advertising_started();
    assert_eq!(link.state(), LinkState::Advertising);

    link.connected("peer");
    assert_eq!(link.advertising_stopped(AdvStopReason::AcceptedConnection), LinkAction::Stay);
    assert_eq!(link.state(), LinkState::Connected);
    assert_eq!(link.subscription_changed(true), SubscriptionAction::NotifyAndArm);
    assert!(link.notify_state());

    assert_eq!(link.disconnected(), (Some("peer"), LinkAction::Advertise));
    assert!(!link.notify_state());
    assert_eq!(link.connection(), None);
    assert_eq!(link.state(), LinkState::Idle);
  }

  #[test]
  fn subscription_transitions() {
    let mut link = LinkStateMachine::<u8>::new();
    assert_eq!(link.subscription_changed(true), SubscriptionAction::Ignore);

    link.connected(1);
    assert_eq!(link.subscription_changed(false), SubscriptionAction::Ignore);
    assert_eq!(link.subscription_changed(true), SubscriptionAction::NotifyAndArm);
    assert_eq!(link.subscription_changed(true), SubscriptionAction::Ignore);
    assert_eq!(link.subscription_changed(false), SubscriptionAction::Disarm);
  }

  #[test]
  fn expired_advertising_restarts() {
    let mut link = LinkStateMachine::<u8>::new();
    link.stack_ready();
    link.advertising_started();
    assert_eq!(link.advertising_stopped(AdvStopReason::Completed), LinkAction::Advertise);
    assert_eq!(link.advertising_stopped(AdvStopReason::Requested), LinkAction::Stay);
  }

  #[test]
  fn failed_connection_clears_state() {
    let mut link = LinkStateMachine::<u8>::new();
    link.connected(1);
    link.mtu_changed(Mtu::new(185));
    assert_eq!(link.connection_failed(), LinkAction::Advertise);
    assert_eq!(link.mtu(), Mtu::default());
    assert_eq!(link.connection(), None);
  }
}
