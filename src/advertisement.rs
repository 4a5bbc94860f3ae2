use core::fmt::{Debug, Display, Formatter};
use core::ops::{Deref, RangeInclusive};
use core::time::Duration;

use crate::descriptors::UUID;

/// Advertising intervals the controller accepts (0x20 to 0xFFFFFF slots of 0.625 ms).
pub const ADVERTISING_INTERVAL_RANGE: RangeInclusive<Duration> =
  Duration::from_millis(20)..=Duration::from_micros(10_485_759_375);

/// Everything a [crate::gap_advertiser::GapAdvertiser] needs to start advertising.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisementRequest {
  pub params: AdvertisementParams,
  pub payload: AdvertisementPayload,
  pub scan_response_payload: Option<ScanResponsePayload>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AdvertisementParams {
  /// Can a peer connect to us, and using what mechanism?
  pub connect_mode: ConnectMode,

  /// Minimum advertising interval.  `None` leaves the stack's default.  Acceptable values
  /// are in [ADVERTISING_INTERVAL_RANGE].
  pub interval_min: Option<Duration>,

  /// Maximum advertising interval, at least `interval_min`.
  pub interval_max: Option<Duration>,

  /// How long to advertise before the stack reports
  /// [crate::gatt_server_cb::AdvStopReason::Completed].  `None` advertises until a connection
  /// is accepted or advertising is explicitly stopped.
  pub duration: Option<Duration>,
}

/// Whether and how this peripheral is connectable.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum ConnectMode {
  /// Connections from any address are allowed.  If unsure, this is probably what you want to use.
  #[default]
  Undirected = 0b0000,

  /// Connections are allowed only from a specific address.  This address must be specified
  /// in the advertisement payload.
  Directed = 0b0001,

  /// Connections are not allowed.  Often this is done when the maximum number of connections have
  /// been reached (and reverse when disconnects happen) or for passive sensors that include their
  /// readings unencrypted via the advertisement.
  None = 0b0010,
}

pub type AdvertisementPayloadBuilder = RawAdvertisementBuilder<31>;
pub type ScanResponsePayloadBuilder = RawAdvertisementBuilder<31>;

/// Helper to facilitate creating correctly structured advertisement PDUs.
#[derive(Debug, Default, Clone)]
pub struct RawAdvertisementBuilder<const N: usize> {
  raw: heapless::Vec<u8, N>,
  flags: Option<u8>,
  has_set_flags: bool,
}

impl<const N: usize> RawAdvertisementBuilder<N> {
  pub fn new() -> Self {
    Default::default()
  }

  /// Set the discover mode.
  pub fn set_discover_mode(mut self, discover_mode: DiscoverMode) -> Self {
    let flags = self.flags.get_or_insert(0);
    *flags = (*flags & !DISCOVER_MODE_MASK) | (discover_mode as u8 & DISCOVER_MODE_MASK);
    self
  }

  /// Indicate that Bluetooth Classic (BR/EDR) is _NOT_ supported.
  pub fn set_classic_not_supported(mut self, classic_not_supported: bool) -> Self {
    let flags = self.flags.get_or_insert(0);
    if classic_not_supported {
      *flags |= CLASSIC_NOT_SUPPORTED_MASK;
    } else {
      *flags &= !CLASSIC_NOT_SUPPORTED_MASK;
    }
    self
  }

  /// Push a list of service UUIDs.  All entries must share one width (16 or 128-bit) since
  /// each width has its own AD type.  `complete` marks the list as the full set of services
  /// rather than a partial one.
  pub fn push_service_uuids(mut self, uuids: &[UUID], complete: bool) -> Result<Self, PushError> {
    let first = uuids.first().ok_or(PushError::UuidInputError)?;
    if !uuids.iter().all(|u| u.same_width(first)) {
      return Err(PushError::UuidInputError);
    }
    let ad_type = match (first, complete) {
      (UUID::Short(_), true) => AdType::CompleteServiceUuids16,
      (UUID::Short(_), false) => AdType::PartialServiceUuids16,
      (UUID::Long(_), true) => AdType::CompleteServiceUuids128,
      (UUID::Long(_), false) => AdType::PartialServiceUuids128,
    };

    self = self.push_start_record(ad_type as _, first.encoded_len() * uuids.len())?;
    for uuid in uuids {
      self.extend(&uuid.to_le_bytes())?;
    }

    Ok(self)
  }

  /// Push the complete local name, the same one exposed through the GAP device name.
  pub fn push_complete_local_name(self, name: &str) -> Result<Self, PushError> {
    self.push_raw_ad_type(AdType::CompleteLocalName as _, name.as_bytes())
  }

  /// Push the radiated TX power in dBm.
  pub fn push_tx_power_level(self, dbm: i8) -> Result<Self, PushError> {
    self.push_raw_ad_type(AdType::TxPowerLevel as _, &dbm.to_le_bytes())
  }

  pub fn push_raw_ad_type(mut self, ad_type: u8, data: &[u8]) -> Result<Self, PushError> {
    self = self.push_start_record(ad_type, data.len())?;
    self.extend(data)?;

    if ad_type == AdType::Flags as _ {
      self.has_set_flags = true;
    }

    Ok(self)
  }

  fn push_start_record(mut self, ad_type: u8, remaining_size: usize) -> Result<Self, PushError> {
    self = self.flush_pending_record()?;

    if self.raw.len() + 2 + remaining_size > N {
      return Err(PushError::CapacityExceeded);
    }

    let length = u8::try_from(remaining_size + 1).map_err(|_| PushError::CapacityExceeded)?;
    self.extend(&[length, ad_type])?;
    Ok(self)
  }

  fn extend(&mut self, data: &[u8]) -> Result<(), PushError> {
    self
      .raw
      .extend_from_slice(data)
      .map_err(|_| PushError::CapacityExceeded)
  }

  /// Build an advertising payload, adding the default flags (general discoverable, BR/EDR not
  /// supported) if none were set.
  pub fn build(mut self) -> Result<RawAdvertisement<N>, PushError> {
    self = self.ensure_defaults_set()?;
    self = self.flush_pending_record()?;
    Ok(RawAdvertisement(self.raw))
  }

  /// Build a scan response payload.  Scan responses must not carry the flags record so no
  /// defaults are added.
  pub fn build_scan_response(self) -> Result<RawAdvertisement<N>, PushError> {
    if self.has_set_flags || self.flags.is_some() {
      return Err(PushError::FlagsInScanResponse);
    }
    Ok(RawAdvertisement(self.raw))
  }

  fn flush_pending_record(mut self) -> Result<Self, PushError> {
    if let Some(flags) = self.flags.take() {
      self = self.push_raw_ad_type(AdType::Flags as _, &[flags])?;
    }
    Ok(self)
  }

  fn ensure_defaults_set(mut self) -> Result<Self, PushError> {
    if !self.has_set_flags && self.flags.is_none() {
      self = self.set_discover_mode(DiscoverMode::General);
      self = self.set_classic_not_supported(true);
    }
    Ok(self)
  }
}

/// AD types this crate emits.  Each record on air is `[len, type, data..]` where `len` covers
/// the type byte and data.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum AdType {
  Flags = 0x01,
  PartialServiceUuids16 = 0x02,
  CompleteServiceUuids16 = 0x03,
  PartialServiceUuids128 = 0x06,
  CompleteServiceUuids128 = 0x07,
  CompleteLocalName = 0x09,
  TxPowerLevel = 0x0a,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PushError {
  CapacityExceeded,
  UuidInputError,
  FlagsInScanResponse,
}

impl Display for PushError {
  fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
    match self {
      PushError::CapacityExceeded => write!(f, "advertising payload capacity exceeded"),
      PushError::UuidInputError => write!(f, "service UUID list is empty or mixes widths"),
      PushError::FlagsInScanResponse => write!(f, "flags are not allowed in a scan response"),
    }
  }
}

const DISCOVER_MODE_MASK: u8 = 0b0000_0011;
const CLASSIC_NOT_SUPPORTED_MASK: u8 = 0b0000_0100;

/// Whether and how this peripheral is discovered.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum DiscoverMode {
  /// This device can only be discovered when a central device is following the limited
  /// discovery procedure.
  Limited = 0b0000_0001,

  /// General discovery.  This is the normal discovery mode that most customers would use.
  General = 0b0000_0010,

  /// Device is not discoverable (whether the device is connectable is determined independently).
  None = 0b0000_0000,
}

/// Represents the raw payload for an advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAdvertisement<const N: usize>(pub heapless::Vec<u8, N>);

impl<const N: usize> Deref for RawAdvertisement<N> {
  type Target = [u8];

  fn deref(&self) -> &Self::Target {
    &self.0
  }
}

pub type AdvertisementPayload = RawAdvertisement<31>;
pub type ScanResponsePayload = RawAdvertisement<31>;
