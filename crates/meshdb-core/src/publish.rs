//! Model publication settings
//!
//! A publication describes where a model sends its status messages: the
//! destination, the application key, TTL, periodic publishing and
//! retransmissions.

use core::fmt;
use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::address::{Address, MeshAddress};
use crate::errors::{MeshError, ValidationError};
use crate::key::KeyIndex;
use crate::Result;

/// Largest TTL that can be set explicitly
pub const MAX_TTL: u8 = 127;

// ----------------------------------------------------------------------------
// Period
// ----------------------------------------------------------------------------

/// Resolution of a single publish period step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum StepResolution {
    #[default]
    HundredsOfMilliseconds = 0,
    Seconds = 1,
    TensOfSeconds = 2,
    TensOfMinutes = 3,
}

impl StepResolution {
    pub const ALL: [StepResolution; 4] = [
        Self::HundredsOfMilliseconds,
        Self::Seconds,
        Self::TensOfSeconds,
        Self::TensOfMinutes,
    ];

    /// Duration of one step in milliseconds
    pub const fn millis(&self) -> u32 {
        match self {
            Self::HundredsOfMilliseconds => 100,
            Self::Seconds => 1_000,
            Self::TensOfSeconds => 10_000,
            Self::TensOfMinutes => 600_000,
        }
    }

    pub fn to_millis(&self, steps: u8) -> u32 {
        self.millis() * u32::from(steps)
    }

    /// Resolution with the given step length
    pub fn from_step_millis(millis: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.millis() == millis)
    }
}

impl From<u8> for StepResolution {
    /// Only the lowest 2 bits are used
    fn from(value: u8) -> Self {
        match value & 0x03 {
            0 => Self::HundredsOfMilliseconds,
            1 => Self::Seconds,
            2 => Self::TensOfSeconds,
            _ => Self::TensOfMinutes,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PeriodObject {
    number_of_steps: u8,
    resolution: u32,
}

/// Period is stored as milliseconds, older documents use an object
#[derive(Deserialize)]
#[serde(untagged)]
enum PeriodRecord {
    Millis(u32),
    Object(PeriodObject),
}

/// Periodic publishing interval: `steps` of a `resolution`
///
/// Several `(steps, resolution)` pairs describe the same interval. Only the
/// interval is preserved when converting through milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "PeriodRecord", into = "u32")]
pub struct Period {
    steps: u8,
    resolution: StepResolution,
}

impl Period {
    pub const DISABLED: Self = Self {
        steps: 0,
        resolution: StepResolution::HundredsOfMilliseconds,
    };
    pub const MAX_STEPS: u8 = 0x3F;

    /// Steps are masked to 6 bits
    pub fn new(steps: u8, resolution: StepResolution) -> Self {
        Self {
            steps: steps & Self::MAX_STEPS,
            resolution,
        }
    }

    /// Exact conversion from milliseconds, using the coarsest matching resolution
    pub fn from_millis(millis: u32) -> Result<Self> {
        let resolution = [
            StepResolution::TensOfMinutes,
            StepResolution::TensOfSeconds,
            StepResolution::Seconds,
            StepResolution::HundredsOfMilliseconds,
        ]
        .into_iter()
        .find(|r| millis % r.millis() == 0)
        .ok_or(ValidationError::InvalidPeriod { value: millis })?;

        let steps = millis / resolution.millis();
        if steps > u32::from(Self::MAX_STEPS) {
            return Err(ValidationError::InvalidPeriod { value: millis }.into());
        }
        Ok(Self::new(steps as u8, resolution))
    }

    /// Closest representable period, clamped to the largest one
    pub fn from_interval(interval: Duration) -> Self {
        let millis = interval.as_millis();
        let max = u128::from(Self::MAX_STEPS);
        for resolution in StepResolution::ALL {
            let step = u128::from(resolution.millis());
            if millis <= max * step {
                return Self::new((millis / step) as u8, resolution);
            }
        }
        Self::new(Self::MAX_STEPS, StepResolution::TensOfMinutes)
    }

    pub fn steps(&self) -> u8 {
        self.steps
    }

    pub fn resolution(&self) -> StepResolution {
        self.resolution
    }

    pub fn interval_ms(&self) -> u32 {
        self.resolution.to_millis(self.steps)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.interval_ms()))
    }

    pub fn is_disabled(&self) -> bool {
        self.steps == 0
    }
}

impl TryFrom<PeriodRecord> for Period {
    type Error = MeshError;

    fn try_from(record: PeriodRecord) -> Result<Self> {
        match record {
            PeriodRecord::Millis(millis) => Self::from_millis(millis),
            PeriodRecord::Object(object) => {
                if object.number_of_steps > Self::MAX_STEPS {
                    return Err(MeshError::decode("Number of steps must be in range 0 to 63"));
                }
                if object.number_of_steps == 0 {
                    return Ok(Self::DISABLED);
                }
                let resolution = StepResolution::from_step_millis(object.resolution)
                    .ok_or_else(|| MeshError::decode(format!("Unsupported resolution value: {}", object.resolution)))?;
                Ok(Self::new(object.number_of_steps, resolution))
            }
        }
    }
}

impl From<Period> for u32 {
    fn from(period: Period) -> Self {
        period.interval_ms()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_disabled() {
            return write!(f, "Disabled");
        }
        let value = u32::from(self.steps);
        match self.resolution {
            StepResolution::HundredsOfMilliseconds if value < 10 => write!(f, "{} ms", value * 100),
            StepResolution::HundredsOfMilliseconds => write!(f, "{}.{} sec", value / 10, value % 10),
            StepResolution::Seconds if value < 60 => write!(f, "{} sec", value),
            StepResolution::Seconds => write!(f, "1 min {} sec", value - 60),
            StepResolution::TensOfSeconds if value < 6 => write!(f, "{} sec", value * 10),
            StepResolution::TensOfSeconds if value % 6 == 0 => write!(f, "{} min", value / 6),
            StepResolution::TensOfSeconds => write!(f, "{} min {} sec", value / 6, value % 6 * 10),
            StepResolution::TensOfMinutes if value < 6 => write!(f, "{} min", value * 10),
            StepResolution::TensOfMinutes if value % 6 == 0 => write!(f, "{} h", value / 6),
            StepResolution::TensOfMinutes => write!(f, "{} h {} min", value / 6, value % 6 * 10),
        }
    }
}

// ----------------------------------------------------------------------------
// Transition time
// ----------------------------------------------------------------------------

/// Time a state transition takes: 6 bits of steps and a 2-bit resolution
///
/// Step value 0x3F means the transition time is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransitionTime {
    steps: u8,
    resolution: StepResolution,
}

impl TransitionTime {
    /// Largest step count of a known transition time
    pub const MAX_STEPS: u8 = 0x3E;
    const UNKNOWN_STEPS: u8 = 0x3F;

    /// Steps are clamped to [`TransitionTime::MAX_STEPS`]
    pub fn new(steps: u8, resolution: StepResolution) -> Self {
        Self {
            steps: steps.min(Self::MAX_STEPS),
            resolution,
        }
    }

    pub const fn unknown() -> Self {
        Self {
            steps: Self::UNKNOWN_STEPS,
            resolution: StepResolution::HundredsOfMilliseconds,
        }
    }

    pub const fn immediate() -> Self {
        Self {
            steps: 0,
            resolution: StepResolution::HundredsOfMilliseconds,
        }
    }

    /// Decode the Generic Default Transition Time state
    pub fn from_raw(raw: u8) -> Self {
        Self {
            steps: raw & 0x3F,
            resolution: StepResolution::from(raw >> 6),
        }
    }

    /// Closest transition time not longer than `interval`, clamped to the largest one
    pub fn from_interval(interval: Duration) -> Self {
        let millis = interval.as_millis();
        let max = u128::from(Self::MAX_STEPS);
        if millis == 0 {
            return Self::immediate();
        }
        for resolution in StepResolution::ALL {
            let step = u128::from(resolution.millis());
            if millis <= max * step {
                return Self::new((millis / step) as u8, resolution);
            }
        }
        Self::new(Self::MAX_STEPS, StepResolution::TensOfMinutes)
    }

    pub fn raw_value(&self) -> u8 {
        (self.steps & 0x3F) | ((self.resolution as u8) << 6)
    }

    pub fn steps(&self) -> u8 {
        self.steps
    }

    pub fn resolution(&self) -> StepResolution {
        self.resolution
    }

    pub fn is_known(&self) -> bool {
        self.steps < Self::UNKNOWN_STEPS
    }

    pub fn is_immediate(&self) -> bool {
        self.steps == 0
    }

    /// Transition time in milliseconds, `None` when unknown
    pub fn millis(&self) -> Option<u32> {
        self.is_known().then(|| self.resolution.to_millis(self.steps))
    }

    pub fn interval(&self) -> Option<Duration> {
        self.millis().map(|ms| Duration::from_millis(u64::from(ms)))
    }

    /// This transition time if known, otherwise `default` or an immediate transition
    pub fn or(self, default: Option<TransitionTime>) -> Self {
        if self.is_known() {
            self
        } else {
            default.filter(TransitionTime::is_known).unwrap_or_else(Self::immediate)
        }
    }
}

impl Default for TransitionTime {
    fn default() -> Self {
        Self::immediate()
    }
}

impl From<u8> for TransitionTime {
    fn from(raw: u8) -> Self {
        Self::from_raw(raw)
    }
}

impl From<TransitionTime> for u8 {
    fn from(time: TransitionTime) -> Self {
        time.raw_value()
    }
}

impl fmt::Display for TransitionTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_known() {
            return write!(f, "Unknown");
        }
        if self.is_immediate() {
            return write!(f, "Immediate");
        }
        let value = u32::from(self.steps);
        match self.resolution {
            StepResolution::HundredsOfMilliseconds if value < 10 => write!(f, "{} ms", value * 100),
            StepResolution::HundredsOfMilliseconds => write!(f, "{}.{} sec", value / 10, value % 10),
            StepResolution::Seconds if value < 60 => write!(f, "{} sec", value),
            StepResolution::Seconds => write!(f, "1 min {} sec", value - 60),
            StepResolution::TensOfSeconds if value < 6 => write!(f, "{} sec", value * 10),
            StepResolution::TensOfSeconds if value % 6 == 0 => write!(f, "{} min", value / 6),
            StepResolution::TensOfSeconds => write!(f, "{} min {} sec", value / 6, value % 6 * 10),
            StepResolution::TensOfMinutes if value < 6 => write!(f, "{} min", value * 10),
            StepResolution::TensOfMinutes if value % 6 == 0 => write!(f, "{} h", value / 6),
            StepResolution::TensOfMinutes => write!(f, "{} h {} min", value / 6, value % 6 * 10),
        }
    }
}

// ----------------------------------------------------------------------------
// Retransmit
// ----------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct RetransmitRecord {
    count: u8,
    interval: u16,
}

/// Publication retransmissions: `count` extra messages every `interval` ms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RetransmitRecord", into = "RetransmitRecord")]
pub struct Retransmit {
    count: u8,
    interval: u16,
}

impl Retransmit {
    pub const DISABLED: Self = Self { count: 0, interval: 50 };
    pub const MAX_COUNT: u8 = 7;
    /// Largest interval the 5-bit step field can express
    pub const MAX_INTERVAL: u16 = 1600;
    /// Largest interval accepted in stored documents
    pub const MAX_STORED_INTERVAL: u16 = 3200;

    /// Count is clamped to 7, the interval to 50..=1600 ms in 50 ms steps
    pub fn new(count: u8, interval: Duration) -> Self {
        let steps = (interval.as_millis() / 50).min(u128::from(Self::MAX_INTERVAL / 50)) as u16;
        Self {
            count: count.min(Self::MAX_COUNT),
            interval: (steps * 50).max(50),
        }
    }

    /// Decode from the wire fields; the interval is `(steps + 1) * 50` ms
    pub fn from_steps(count: u8, interval_steps: u8) -> Self {
        Self {
            count: count.min(Self::MAX_COUNT),
            interval: (u16::from(interval_steps & 0x1F) + 1) * 50,
        }
    }

    pub fn count(&self) -> u8 {
        self.count
    }

    /// Interval in milliseconds
    pub fn interval(&self) -> u16 {
        self.interval
    }

    /// Wire representation of the interval, clamped to 1600 ms
    pub fn interval_steps(&self) -> u8 {
        (self.interval.min(Self::MAX_INTERVAL) / 50 - 1) as u8
    }

    pub fn is_disabled(&self) -> bool {
        self.count == 0
    }
}

impl Default for Retransmit {
    fn default() -> Self {
        Self::DISABLED
    }
}

impl TryFrom<RetransmitRecord> for Retransmit {
    type Error = MeshError;

    fn try_from(record: RetransmitRecord) -> Result<Self> {
        if record.count > Self::MAX_COUNT {
            return Err(ValidationError::InvalidRetransmit {
                reason: format!("count {} is out of range 0-7", record.count),
            }
            .into());
        }
        if record.interval < 50 || record.interval > Self::MAX_STORED_INTERVAL || record.interval % 50 != 0 {
            return Err(ValidationError::InvalidRetransmit {
                reason: format!("interval {} ms is not a multiple of 50 in range 50-3200", record.interval),
            }
            .into());
        }
        Ok(Self {
            count: record.count,
            interval: record.interval,
        })
    }
}

impl From<Retransmit> for RetransmitRecord {
    fn from(retransmit: Retransmit) -> Self {
        Self {
            count: retransmit.count,
            interval: retransmit.interval,
        }
    }
}

impl fmt::Display for Retransmit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_disabled() {
            return write!(f, "Disabled");
        }
        write!(f, "{} times every {} ms", self.count, self.interval)
    }
}

// ----------------------------------------------------------------------------
// Publish
// ----------------------------------------------------------------------------

/// Security material used for publishing, serialized as 0 or 1
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Credentials {
    #[default]
    MasterSecurity = 0,
    FriendshipSecurity = 1,
}

impl TryFrom<u8> for Credentials {
    type Error = MeshError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::MasterSecurity),
            1 => Ok(Self::FriendshipSecurity),
            _ => Err(MeshError::decode(format!("Credentials must be 0 or 1, got {}", value))),
        }
    }
}

impl From<Credentials> for u8 {
    fn from(credentials: Credentials) -> Self {
        credentials as u8
    }
}

#[derive(Serialize, Deserialize)]
struct PublishRecord {
    address: MeshAddress,
    index: KeyIndex,
    ttl: u8,
    period: Period,
    credentials: Credentials,
    retransmit: Retransmit,
}

/// Publication configuration of a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "PublishRecord", into = "PublishRecord")]
pub struct Publish {
    pub address: MeshAddress,
    /// Application key index
    pub index: KeyIndex,
    ttl: u8,
    pub period: Period,
    pub credentials: Credentials,
    pub retransmit: Retransmit,
}

impl Publish {
    /// TTL value meaning "use the node's default TTL"
    pub const DEFAULT_TTL: u8 = 0xFF;

    pub fn new(address: MeshAddress, index: KeyIndex, ttl: u8, period: Period, retransmit: Retransmit) -> Result<Self> {
        check_ttl(ttl)?;
        Ok(Self {
            address,
            index,
            ttl,
            period,
            credentials: Credentials::MasterSecurity,
            retransmit,
        })
    }

    /// Publication with the node's default TTL and no periodic publishing
    pub fn to(address: MeshAddress, index: KeyIndex) -> Self {
        Self {
            address,
            index,
            ttl: Self::DEFAULT_TTL,
            period: Period::DISABLED,
            credentials: Credentials::MasterSecurity,
            retransmit: Retransmit::DISABLED,
        }
    }

    pub fn with_friendship_credentials(mut self) -> Self {
        self.credentials = Credentials::FriendshipSecurity;
        self
    }

    pub fn with_address(mut self, address: MeshAddress) -> Self {
        self.address = address;
        self
    }

    pub fn ttl(&self) -> u8 {
        self.ttl
    }

    pub fn set_ttl(&mut self, ttl: u8) -> Result<()> {
        check_ttl(ttl)?;
        self.ttl = ttl;
        Ok(())
    }

    pub fn uses_default_ttl(&self) -> bool {
        self.ttl == Self::DEFAULT_TTL
    }

    pub fn is_using_friendship_security_material(&self) -> bool {
        self.credentials == Credentials::FriendshipSecurity
    }

    /// A publication to the unassigned address disables publishing
    pub fn is_disabled(&self) -> bool {
        self.address.address() == Address::UNASSIGNED
    }
}

fn check_ttl(ttl: u8) -> Result<()> {
    if ttl > MAX_TTL && ttl != Publish::DEFAULT_TTL {
        return Err(ValidationError::InvalidTtl { ttl }.into());
    }
    Ok(())
}

impl TryFrom<PublishRecord> for Publish {
    type Error = MeshError;

    fn try_from(record: PublishRecord) -> Result<Self> {
        let mut publish = Self::new(record.address, record.index, record.ttl, record.period, record.retransmit)?;
        publish.credentials = record.credentials;
        Ok(publish)
    }
}

impl From<Publish> for PublishRecord {
    fn from(publish: Publish) -> Self {
        Self {
            address: publish.address,
            index: publish.index,
            ttl: publish.ttl,
            period: publish.period,
            credentials: publish.credentials,
            retransmit: publish.retransmit,
        }
    }
}

impl fmt::Display for Publish {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_disabled() {
            return write!(f, "Disabled");
        }
        write!(
            f,
            "{} using App Key Index: {}, ttl: {}, period: {}, retransmit: {}",
            self.address, self.index, self.ttl, self.period, self.retransmit
        )
    }
}
