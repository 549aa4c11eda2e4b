//! Heartbeat publication and subscription
//!
//! Periods and counts travel over the air as logarithms. The helpers in this
//! module convert between the two representations. Only the configuration is
//! stored in the network database; the running state (remaining count,
//! observed hops) lives in memory and is lost on decode.

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::errors::{MeshError, ValidationError};
use crate::key::KeyIndex;
use crate::node::NodeFeatures;
use crate::publish::MAX_TTL;
use crate::Result;

// ----------------------------------------------------------------------------
// Log Encodings
// ----------------------------------------------------------------------------

/// Period in seconds to its log, `None` unless a power of 2, 0 or `0xFFFF`
pub fn period_to_period_log(period: u16) -> Option<u8> {
    match period {
        0x0000 => Some(0x00),
        0xFFFF => Some(0x11),
        p if p.is_power_of_two() => Some(p.trailing_zeros() as u8 + 1),
        _ => None,
    }
}

/// Period log to seconds; values above `0x11` are invalid
pub fn period_log_to_period(period_log: u8) -> Option<u16> {
    match period_log {
        0x00 => Some(0x0000),
        0x01..=0x10 => Some(1 << (period_log - 1)),
        0x11 => Some(0xFFFF),
        _ => None,
    }
}

/// Publication count log: smallest `n` where `2^(n-1) >= count`
pub fn publication_count_log(count: u16) -> u8 {
    match count {
        0x0000 => 0x00,
        0xFFFF => 0xFF,
        c => (u16::BITS - (c - 1).leading_zeros()) as u8 + 1,
    }
}

/// Subscription count log: `floor(log2(count)) + 1`
pub fn subscription_count_log(count: u16) -> u8 {
    match count {
        0x0000 => 0x00,
        0xFFFF => 0xFF,
        c => (u16::BITS - c.leading_zeros()) as u8,
    }
}

/// Log of a remaining subscription period
pub fn remaining_period_log(remaining: Duration) -> u8 {
    match remaining.as_secs() {
        0 => 0x00,
        s if s >= 0xFFFF => 0x11,
        s => (u64::BITS - s.leading_zeros()) as u8,
    }
}

// ----------------------------------------------------------------------------
// Heartbeat Publication
// ----------------------------------------------------------------------------

/// Countdown of periodic heartbeat messages still to be sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodicHeartbeatState {
    count: u16,
}

impl PeriodicHeartbeatState {
    /// `None` when periodic publishing is disabled or the log is invalid
    pub fn new(count_log: u8) -> Option<Self> {
        let count = match count_log {
            0x01..=0x10 => 1 << (count_log - 1),
            0x11 => 0xFFFE,
            0xFF => 0xFFFF,
            _ => return None,
        };
        Some(Self { count })
    }

    pub fn count_log(&self) -> u8 {
        publication_count_log(self.count)
    }

    pub fn is_indefinite(&self) -> bool {
        self.count == 0xFFFF
    }

    /// Consume one message; false once the count is exhausted
    pub fn should_send_more(&mut self) -> bool {
        if self.count == 0 {
            return false;
        }
        if !self.is_indefinite() {
            self.count -= 1;
        }
        true
    }
}

#[derive(Serialize, Deserialize)]
struct HeartbeatPublicationRecord {
    address: Address,
    period: u16,
    ttl: u8,
    index: KeyIndex,
    features: NodeFeatures,
}

/// Heartbeat publication configuration of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "HeartbeatPublicationRecord", into = "HeartbeatPublicationRecord")]
pub struct HeartbeatPublication {
    address: Address,
    period_log: u8,
    ttl: u8,
    index: KeyIndex,
    features: NodeFeatures,
    state: Option<PeriodicHeartbeatState>,
}

impl HeartbeatPublication {
    /// Create a publication with a period in seconds
    ///
    /// The destination must be a unicast or group address and the period a
    /// power of 2, 0 or `0xFFFF`.
    pub fn new(address: Address, period: u16, ttl: u8, index: KeyIndex, features: NodeFeatures) -> Result<Self> {
        let period_log = period_to_period_log(period).ok_or(ValidationError::InvalidPeriod {
            value: u32::from(period),
        })?;
        Self::with_period_log(address, period_log, ttl, index, features)
    }

    pub fn with_period_log(
        address: Address,
        period_log: u8,
        ttl: u8,
        index: KeyIndex,
        features: NodeFeatures,
    ) -> Result<Self> {
        if !(address.is_unicast() || address.is_group()) {
            return Err(MeshError::invalid_address(address));
        }
        if period_log > 0x11 {
            return Err(ValidationError::InvalidPeriod {
                value: u32::from(period_log),
            }
            .into());
        }
        if ttl > MAX_TTL {
            return Err(ValidationError::InvalidTtl { ttl }.into());
        }
        Ok(Self {
            address,
            period_log,
            ttl,
            index,
            features,
            state: None,
        })
    }

    /// Start sending periodic heartbeats, `count_log` messages in total
    pub fn start(&mut self, count_log: u8) {
        self.state = PeriodicHeartbeatState::new(count_log);
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn period_log(&self) -> u8 {
        self.period_log
    }

    /// Period in seconds
    pub fn period(&self) -> u16 {
        period_log_to_period(self.period_log).unwrap_or(0xFFFF)
    }

    pub fn ttl(&self) -> u8 {
        self.ttl
    }

    /// Network key index
    pub fn index(&self) -> KeyIndex {
        self.index
    }

    pub fn features(&self) -> NodeFeatures {
        self.features
    }

    pub fn state(&self) -> Option<&PeriodicHeartbeatState> {
        self.state.as_ref()
    }

    pub fn state_mut(&mut self) -> Option<&mut PeriodicHeartbeatState> {
        self.state.as_mut()
    }

    pub fn is_periodic_publication_enabled(&self) -> bool {
        self.period_log > 0
    }

    pub fn is_feature_triggered_publishing_enabled(&self) -> bool {
        !self.features.is_empty()
    }
}

impl TryFrom<HeartbeatPublicationRecord> for HeartbeatPublication {
    type Error = MeshError;

    fn try_from(record: HeartbeatPublicationRecord) -> Result<Self> {
        Self::new(record.address, record.period, record.ttl, record.index, record.features)
    }
}

impl From<HeartbeatPublication> for HeartbeatPublicationRecord {
    fn from(publication: HeartbeatPublication) -> Self {
        Self {
            address: publication.address,
            period: publication.period(),
            ttl: publication.ttl,
            index: publication.index,
            features: publication.features,
        }
    }
}

// ----------------------------------------------------------------------------
// Heartbeat Subscription
// ----------------------------------------------------------------------------

/// Statistics gathered while a subscription is active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatSubscriptionState {
    period: Duration,
    count: u16,
    min_hops: u8,
    max_hops: u8,
}

impl HeartbeatSubscriptionState {
    pub fn new(period_log: u8) -> Self {
        let period = period_log_to_period(period_log).unwrap_or(0);
        Self {
            period: Duration::from_secs(u64::from(period)),
            count: 0,
            min_hops: 0x7F,
            max_hops: 0,
        }
    }

    /// Log of the period remaining after `elapsed` since the start
    pub fn period_log(&self, elapsed: Duration) -> u8 {
        self.period
            .checked_sub(elapsed)
            .map_or(0, remaining_period_log)
    }

    pub fn count(&self) -> u16 {
        self.count
    }

    pub fn count_log(&self) -> u8 {
        subscription_count_log(self.count)
    }

    pub fn min_hops(&self) -> u8 {
        self.min_hops
    }

    pub fn max_hops(&self) -> u8 {
        self.max_hops
    }
}

#[derive(Serialize, Deserialize)]
struct HeartbeatSubscriptionRecord {
    source: Address,
    destination: Address,
}

/// Heartbeat subscription configuration of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "HeartbeatSubscriptionRecord", into = "HeartbeatSubscriptionRecord")]
pub struct HeartbeatSubscription {
    source: Address,
    destination: Address,
    state: Option<HeartbeatSubscriptionState>,
}

impl HeartbeatSubscription {
    pub fn new(source: Address, destination: Address) -> Result<Self> {
        if !source.is_unicast() {
            return Err(MeshError::invalid_address(source));
        }
        if !(destination.is_unicast() || destination.is_group()) {
            return Err(MeshError::invalid_address(destination));
        }
        Ok(Self {
            source,
            destination,
            state: None,
        })
    }

    /// Start collecting statistics for the given period
    pub fn start(&mut self, period_log: u8) {
        self.state = Some(HeartbeatSubscriptionState::new(period_log));
    }

    pub fn source(&self) -> Address {
        self.source
    }

    pub fn destination(&self) -> Address {
        self.destination
    }

    pub fn state(&self) -> Option<&HeartbeatSubscriptionState> {
        self.state.as_ref()
    }

    pub fn is_enabled(&self, elapsed: Duration) -> bool {
        self.state.map_or(false, |state| state.period_log(elapsed) > 0)
    }

    pub fn matches(&self, source: Address, destination: Address) -> bool {
        self.source == source && self.destination == destination
    }

    /// Record a received heartbeat; returns true if it was counted
    pub fn update_if_matches(&mut self, source: Address, destination: Address, hops: u8, elapsed: Duration) -> bool {
        if !self.is_enabled(elapsed) || !self.matches(source, destination) {
            return false;
        }
        let Some(state) = self.state.as_mut() else {
            return false;
        };
        state.count = state.count.saturating_add(1);
        state.min_hops = state.min_hops.min(hops);
        state.max_hops = state.max_hops.max(hops);
        true
    }
}

impl TryFrom<HeartbeatSubscriptionRecord> for HeartbeatSubscription {
    type Error = MeshError;

    fn try_from(record: HeartbeatSubscriptionRecord) -> Result<Self> {
        Self::new(record.source, record.destination)
    }
}

impl From<HeartbeatSubscription> for HeartbeatSubscriptionRecord {
    fn from(subscription: HeartbeatSubscription) -> Self {
        Self {
            source: subscription.source,
            destination: subscription.destination,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_log() {
        assert_eq!(period_to_period_log(0), Some(0));
        assert_eq!(period_to_period_log(1), Some(1));
        assert_eq!(period_to_period_log(2), Some(2));
        assert_eq!(period_to_period_log(0x8000), Some(0x10));
        assert_eq!(period_to_period_log(0xFFFF), Some(0x11));
        assert_eq!(period_to_period_log(3), None);

        for log in 0..=0x11u8 {
            let period = period_log_to_period(log).unwrap();
            assert_eq!(period_to_period_log(period), Some(log));
        }
        assert_eq!(period_log_to_period(0x12), None);
    }

    #[test]
    fn test_publication_count_log() {
        assert_eq!(publication_count_log(0), 0);
        assert_eq!(publication_count_log(1), 1);
        assert_eq!(publication_count_log(2), 2);
        assert_eq!(publication_count_log(3), 3);
        assert_eq!(publication_count_log(4), 3);
        assert_eq!(publication_count_log(5), 4);
        assert_eq!(publication_count_log(0x0579), 0x0C);
        assert_eq!(publication_count_log(0xFFFE), 0x11);
        assert_eq!(publication_count_log(0xFFFF), 0xFF);
    }

    #[test]
    fn test_subscription_count_log() {
        assert_eq!(subscription_count_log(0), 0);
        assert_eq!(subscription_count_log(1), 1);
        assert_eq!(subscription_count_log(3), 2);
        assert_eq!(subscription_count_log(4), 3);
        assert_eq!(subscription_count_log(0xFFFE), 0x10);
        assert_eq!(subscription_count_log(0xFFFF), 0xFF);
    }

    #[test]
    fn test_periodic_state_countdown() {
        assert!(PeriodicHeartbeatState::new(0).is_none());
        assert!(PeriodicHeartbeatState::new(0x12).is_none());

        let mut state = PeriodicHeartbeatState::new(2).unwrap();
        assert!(state.should_send_more());
        assert!(state.should_send_more());
        assert!(!state.should_send_more());

        let mut state = PeriodicHeartbeatState::new(0xFF).unwrap();
        for _ in 0..10 {
            assert!(state.should_send_more());
        }
        assert!(state.is_indefinite());
    }

    #[test]
    fn test_publication_validation() {
        let features = NodeFeatures::RELAY;
        assert!(HeartbeatPublication::new(Address::new(0x0001), 4, 5, 0, features).is_ok());
        assert!(HeartbeatPublication::new(Address::new(0x0001), 5, 5, 0, features).is_err());
        assert!(HeartbeatPublication::new(Address::new(0x8001), 4, 5, 0, features).is_err());
        assert!(HeartbeatPublication::new(Address::new(0xC000), 4, 128, 0, features).is_err());
    }

    #[test]
    fn test_publication_json() {
        let json = r#"{"address": "C000", "period": 16, "ttl": 7, "index": 0, "features": ["relay", "proxy"]}"#;
        let mut publication: HeartbeatPublication = serde_json::from_str(json).unwrap();
        assert_eq!(publication.period_log(), 5);
        assert_eq!(publication.features().bits(), 0x03);
        assert!(publication.state().is_none());

        publication.start(3);
        let encoded = serde_json::to_value(&publication).unwrap();
        assert_eq!(encoded["period"], 16);
        assert_eq!(encoded["features"][1], "proxy");
    }

    #[test]
    fn test_subscription_update() {
        let mut subscription = HeartbeatSubscription::new(Address::new(0x0005), Address::new(0xC000)).unwrap();
        let source = Address::new(0x0005);
        let destination = Address::new(0xC000);
        assert!(!subscription.update_if_matches(source, destination, 3, Duration::ZERO));

        subscription.start(0x05); // 16 seconds
        assert!(subscription.update_if_matches(source, destination, 3, Duration::from_secs(1)));
        assert!(subscription.update_if_matches(source, destination, 1, Duration::from_secs(2)));
        assert!(!subscription.update_if_matches(Address::new(0x0006), destination, 1, Duration::from_secs(2)));
        assert!(!subscription.update_if_matches(source, destination, 1, Duration::from_secs(20)));

        let state = subscription.state().unwrap();
        assert_eq!(state.count(), 2);
        assert_eq!(state.min_hops(), 1);
        assert_eq!(state.max_hops(), 3);
        assert_eq!(state.count_log(), 2);
        assert_eq!(state.period_log(Duration::from_secs(8)), 4);
    }

    #[test]
    fn test_subscription_addresses() {
        assert!(HeartbeatSubscription::new(Address::new(0xC000), Address::new(0xC000)).is_err());
        assert!(HeartbeatSubscription::new(Address::new(0x0001), Address::new(0x8000)).is_err());
        let json = r#"{"source": "0001", "destination": "0002"}"#;
        let subscription: HeartbeatSubscription = serde_json::from_str(json).unwrap();
        assert!(subscription.state().is_none());
    }
}
