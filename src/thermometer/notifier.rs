//! Periodic temperature notifications while a central is subscribed.

use core::time::Duration;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, trace, warn};
use tokio::task::JoinHandle;

use crate::gatt_connection::GattWriter;
use crate::thermometer::measurement::Measurement;
use crate::thermometer::state::{SharedMeasurement, TemperatureSource};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PushOutcome {
  Sent(Measurement),

  /// The measurement lock was contended, nothing was sent.
  Skipped,

  /// The stack refused the notification.
  Failed,
}

/// Sample once and notify the result through `writer`.  Neither lock contention nor send
/// failures are fatal; the caller simply tries again later.
pub fn push_measurement<S, W>(state: &SharedMeasurement<S>, writer: &mut W) -> PushOutcome
where
  S: TemperatureSource,
  W: GattWriter,
{
  let measurement = match state.sample() {
    Ok(m) => m,
    Err(e) => {
      warn!("Skipping notification: {e}");
      return PushOutcome::Skipped;
    }
  };

  match writer.write(&measurement.encode()) {
    Ok(()) => {
      debug!("Notified {measurement}");
      PushOutcome::Sent(measurement)
    }
    Err(e) => {
      warn!("Error sending notification: {e:?}");
      PushOutcome::Failed
    }
  }
}

/// Owns the background task that re-samples and notifies every `period`.
///
/// The task checks the subscription flag on every wake and exits once it is cleared;
/// [PeriodicNotifier::disarm] also aborts it mid-sleep.
#[derive(Debug)]
pub struct PeriodicNotifier {
  period: Duration,
  subscribed: Arc<AtomicBool>,
  task: Option<JoinHandle<()>>,
}

impl PeriodicNotifier {
  pub fn new(period: Duration) -> Self {
    Self {
      period,
      subscribed: Arc::new(AtomicBool::new(false)),
      task: None,
    }
  }

  pub fn period(&self) -> Duration {
    self.period
  }

  /// Start (or restart) periodic notifications through `writer`.  Must be called from
  /// within a tokio runtime.
  pub fn arm<S, W>(&mut self, state: Arc<SharedMeasurement<S>>, mut writer: W)
  where
    S: TemperatureSource + 'static,
    W: GattWriter + Send + 'static,
  {
    self.disarm();

    let subscribed = Arc::new(AtomicBool::new(true));
    self.subscribed = Arc::clone(&subscribed);
    let period = self.period;
    self.task = Some(tokio::spawn(async move {
      loop {
        tokio::time::sleep(period).await;
        if !subscribed.load(Ordering::Acquire) {
          trace!("Notifier woke unsubscribed, exiting");
          break;
        }
        push_measurement(&state, &mut writer);
      }
    }));
    debug!("Notifier armed: period={period:?}");
  }

  pub fn disarm(&mut self) {
    self.subscribed.store(false, Ordering::Release);
    if let Some(task) = self.task.take() {
      task.abort();
      debug!("Notifier disarmed");
    }
  }

  pub fn is_armed(&self) -> bool {
    self.task.as_ref().is_some_and(|t| !t.is_finished())
  }
}

impl Drop for PeriodicNotifier {
  fn drop(&mut self) {
    self.disarm();
  }
}

#[cfg(test)]
mod tests {
  use parking_lot::Mutex;

  use super::*;
  use crate::thermometer::measurement::Unit;

  #[derive(Debug, Clone, Default)]
  struct RecordingWriter {
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    refuse: bool,
  }

  impl GattWriter for RecordingWriter {
    type SystemError = &'static str;

    fn write(&mut self, value: &[u8]) -> Result<(), Self::SystemError> {
      if self.refuse {
        return Err("link gone");
      }
      self.sent.lock().push(value.to_vec());
      Ok(())
    }
  }

  fn state(sample: i16) -> Arc<SharedMeasurement<impl TemperatureSource + 'static>> {
    Arc::new(SharedMeasurement::new(move || sample, Duration::from_millis(100)))
  }

  #[test]
  fn push_reports_each_outcome() {
    let state = state(250);
    let mut writer = RecordingWriter::default();
    assert_eq!(
      push_measurement(&state, &mut writer),
      PushOutcome::Sent(Measurement::new(250, Unit::Celsius))
    );
    assert_eq!(writer.sent.lock().as_slice(), &[vec![0xFA, 0x00, b'C']]);

    writer.refuse = true;
    assert_eq!(push_measurement(&state, &mut writer), PushOutcome::Failed);
  }

  #[test]
  fn contended_lock_skips_silently() {
    let state = state(640);
    let mut writer = RecordingWriter::default();
    assert!(matches!(push_measurement(&state, &mut writer), PushOutcome::Sent(_)));
    writer.sent.lock().clear();

    state.with_lock_held(|| {
      assert_eq!(push_measurement(&state, &mut writer), PushOutcome::Skipped);
      assert_eq!(state.read_measurement(), Measurement::new(640, Unit::Celsius));
    });
    assert!(writer.sent.lock().is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn notifies_every_period_until_disarmed() {
    let writer = RecordingWriter::default();
    let mut notifier = PeriodicNotifier::new(Duration::from_secs(5));
    notifier.arm(state(100), writer.clone());
    assert!(notifier.is_armed());

    tokio::time::sleep(Duration::from_millis(4_900)).await;
    assert_eq!(writer.sent.lock().len(), 0);

    tokio::time::sleep(Duration::from_millis(10_200)).await;
    assert_eq!(writer.sent.lock().len(), 3);

    notifier.disarm();
    assert!(!notifier.is_armed());
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(writer.sent.lock().len(), 3);
  }

  #[tokio::test(start_paused = true)]
  async fn send_failures_are_retried_next_period() {
    let mut writer = RecordingWriter::default();
    writer.refuse = true;
    let mut notifier = PeriodicNotifier::new(Duration::from_secs(1));
    notifier.arm(state(100), writer);

    tokio::time::sleep(Duration::from_millis(3_500)).await;
    assert!(notifier.is_armed());
  }

  #[tokio::test(start_paused = true)]
  async fn rearming_replaces_the_previous_task() {
    let first = RecordingWriter::default();
    let second = RecordingWriter::default();
    let mut notifier = PeriodicNotifier::new(Duration::from_secs(5));
    notifier.arm(state(100), first.clone());
    tokio::time::sleep(Duration::from_secs(3)).await;
    notifier.arm(state(100), second.clone());

    tokio::time::sleep(Duration::from_millis(5_500)).await;
    assert_eq!(first.sent.lock().len(), 0);
    assert_eq!(second.sent.lock().len(), 1);
  }
}
