//! Address and scene ranges
//!
//! Ranges are closed intervals over a 16-bit space. Provisioners own sets of
//! ranges which are always kept merged: sorted by lower bound, pairwise
//! disjoint and non-adjacent.

use core::fmt;
use core::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

use crate::address::{Address, SceneNumber};

// ----------------------------------------------------------------------------
// Range Object
// ----------------------------------------------------------------------------

/// Common behaviour of closed 16-bit ranges
pub trait RangeObject: Copy + Sized {
    /// Create a range; the bounds are swapped if given in reverse order
    fn from_bounds(a: u16, b: u16) -> Self;

    fn lower_bound(&self) -> u16;

    fn upper_bound(&self) -> u16;

    /// Number of values in the range
    fn count(&self) -> u32 {
        u32::from(self.upper_bound()) - u32::from(self.lower_bound()) + 1
    }

    fn contains(&self, value: u16) -> bool {
        self.lower_bound() <= value && value <= self.upper_bound()
    }

    fn contains_range(&self, other: &Self) -> bool {
        self.contains(other.lower_bound()) && self.contains(other.upper_bound())
    }

    fn overlaps(&self, other: &Self) -> bool {
        !(self.upper_bound() < other.lower_bound() || self.lower_bound() > other.upper_bound())
    }

    /// Number of values between two ranges; 0 when they overlap or touch
    fn distance(&self, other: &Self) -> u16 {
        if self.upper_bound() < other.lower_bound() {
            return other.lower_bound() - self.upper_bound() - 1;
        }
        if self.lower_bound() > other.upper_bound() {
            return self.lower_bound() - other.upper_bound() - 1;
        }
        0
    }

    /// One merged range when the two overlap or touch, otherwise both
    fn union(&self, other: &Self) -> Vec<Self> {
        if self.distance(other) == 0 {
            let low = self.lower_bound().min(other.lower_bound());
            let high = self.upper_bound().max(other.upper_bound());
            return vec![Self::from_bounds(low, high)];
        }
        vec![*self, *other]
    }

    /// The parts of this range not covered by `other`
    fn subtract(&self, other: &Self) -> Vec<Self> {
        let mut result = Vec::with_capacity(2);
        if other.lower_bound() > self.lower_bound() {
            let high = self.upper_bound().min(other.lower_bound() - 1);
            result.push(Self::from_bounds(self.lower_bound(), high));
        }
        if other.upper_bound() < self.upper_bound() {
            let low = (other.upper_bound() + 1).max(self.lower_bound());
            result.push(Self::from_bounds(low, self.upper_bound()));
        }
        result
    }
}

/// Sort and coalesce ranges into a minimal cover
///
/// Ranges that overlap or are adjacent are joined. The result is sorted by
/// lower bound and covers exactly the union of the input.
pub fn merged<T: RangeObject>(ranges: &[T]) -> Vec<T> {
    if ranges.len() < 2 {
        return ranges.to_vec();
    }
    let mut sorted = ranges.to_vec();
    sorted.sort_by_key(|r| r.lower_bound());

    let mut result = Vec::with_capacity(sorted.len());
    let mut accumulator = sorted[0];
    for range in sorted.into_iter().skip(1) {
        if accumulator.upper_bound() >= range.upper_bound() {
            // Already covered.
        } else if u32::from(accumulator.upper_bound()) + 1 >= u32::from(range.lower_bound()) {
            accumulator = T::from_bounds(accumulator.lower_bound(), range.upper_bound());
        } else {
            result.push(accumulator);
            accumulator = range;
        }
    }
    result.push(accumulator);
    result
}

// ----------------------------------------------------------------------------
// Range Set Operations
// ----------------------------------------------------------------------------

/// Queries over a set of ranges
pub trait RangeSet<T: RangeObject> {
    fn merged(&self) -> Vec<T>;

    fn contains_value(&self, value: u16) -> bool;

    /// True if a single range of the set covers the whole of `range`
    fn contains_range(&self, range: &T) -> bool;

    fn overlaps_range(&self, range: &T) -> bool;

    fn overlaps_any(&self, ranges: &[T]) -> bool;
}

impl<T: RangeObject> RangeSet<T> for [T] {
    fn merged(&self) -> Vec<T> {
        merged(self)
    }

    fn contains_value(&self, value: u16) -> bool {
        self.iter().any(|r| r.contains(value))
    }

    fn contains_range(&self, range: &T) -> bool {
        self.iter().any(|r| r.contains_range(range))
    }

    fn overlaps_range(&self, range: &T) -> bool {
        self.iter().any(|r| r.overlaps(range))
    }

    fn overlaps_any(&self, ranges: &[T]) -> bool {
        self.iter().any(|r| ranges.iter().any(|o| r.overlaps(o)))
    }
}

/// In-place set arithmetic; results stay merged
pub trait RangeSetMut<T: RangeObject> {
    fn add_range(&mut self, range: T);

    fn add_ranges(&mut self, ranges: &[T]);

    fn subtract_range(&mut self, range: &T);

    fn subtract_ranges(&mut self, ranges: &[T]);
}

impl<T: RangeObject> RangeSetMut<T> for Vec<T> {
    fn add_range(&mut self, range: T) {
        self.push(range);
        *self = merged(self);
    }

    fn add_ranges(&mut self, ranges: &[T]) {
        self.extend_from_slice(ranges);
        *self = merged(self);
    }

    fn subtract_range(&mut self, range: &T) {
        *self = self.iter().flat_map(|r| r.subtract(range)).collect();
    }

    fn subtract_ranges(&mut self, ranges: &[T]) {
        for range in ranges {
            self.subtract_range(range);
        }
    }
}

/// Find a free range of `size` values inside `bounds`, avoiding `taken`
///
/// `taken` must be sorted by lower bound. When no gap is large enough the
/// largest gap found is returned instead.
pub(crate) fn next_available_range<T: RangeObject>(size: u16, bounds: (u16, u16), taken: &[T]) -> Option<T> {
    if size == 0 {
        return None;
    }
    let size = i64::from(size);
    let mut best: Option<(i64, i64)> = None;
    let mut last_upper = i64::from(bounds.0) - 1;

    for range in taken {
        let lower = i64::from(range.lower_bound());
        if last_upper + size < lower {
            return Some(T::from_bounds((last_upper + 1) as u16, (last_upper + size) as u16));
        }
        let available = lower - last_upper - 1;
        if available > 0 && best.map_or(true, |(l, h)| available > h - l + 1) {
            best = Some((last_upper + 1, last_upper + available));
        }
        last_upper = last_upper.max(i64::from(range.upper_bound()));
    }

    let available = i64::from(bounds.1) - last_upper;
    let best_size = best.map_or(0, |(l, h)| h - l + 1);
    if available > best_size {
        return Some(T::from_bounds(
            (last_upper + 1) as u16,
            (last_upper + size.min(available)) as u16,
        ));
    }
    best.map(|(l, h)| T::from_bounds(l as u16, h as u16))
}

// ----------------------------------------------------------------------------
// Address Range
// ----------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddressRangeRecord {
    low_address: Address,
    high_address: Address,
}

/// A closed range of addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "AddressRangeRecord", into = "AddressRangeRecord")]
pub struct AddressRange {
    low: u16,
    high: u16,
}

impl AddressRange {
    pub const ALL_UNICAST: Self = Self {
        low: Address::MIN_UNICAST.value(),
        high: Address::MAX_UNICAST.value(),
    };
    pub const ALL_GROUP: Self = Self {
        low: Address::MIN_GROUP.value(),
        high: Address::MAX_GROUP.value(),
    };

    pub fn new(low: Address, high: Address) -> Self {
        Self::from_bounds(low.value(), high.value())
    }

    /// Addresses of `element_count` consecutive elements starting at `address`
    ///
    /// A count of 0 is treated as 1. The upper bound saturates at `0xFFFF`.
    pub fn from_address(address: Address, element_count: u8) -> Self {
        let count = u16::from(element_count.max(1));
        let high = address.value().saturating_add(count - 1);
        Self::from_bounds(address.value(), high)
    }

    pub fn low_address(&self) -> Address {
        Address::new(self.low)
    }

    pub fn high_address(&self) -> Address {
        Address::new(self.high)
    }

    pub fn contains_address(&self, address: Address) -> bool {
        self.contains(address.value())
    }

    pub fn is_unicast_range(&self) -> bool {
        self.low_address().is_unicast() && self.high_address().is_unicast()
    }

    pub fn is_group_range(&self) -> bool {
        self.low_address().is_group() && self.high_address().is_group()
    }

    pub fn is_valid(&self) -> bool {
        self.is_unicast_range() || self.is_group_range()
    }
}

impl RangeObject for AddressRange {
    fn from_bounds(a: u16, b: u16) -> Self {
        Self {
            low: a.min(b),
            high: a.max(b),
        }
    }

    fn lower_bound(&self) -> u16 {
        self.low
    }

    fn upper_bound(&self) -> u16 {
        self.high
    }
}

impl From<AddressRangeRecord> for AddressRange {
    fn from(record: AddressRangeRecord) -> Self {
        Self::new(record.low_address, record.high_address)
    }
}

impl From<AddressRange> for AddressRangeRecord {
    fn from(range: AddressRange) -> Self {
        Self {
            low_address: range.low_address(),
            high_address: range.high_address(),
        }
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}-0x{}", self.low_address(), self.high_address())
    }
}

impl Add for AddressRange {
    type Output = Vec<AddressRange>;

    fn add(self, other: Self) -> Self::Output {
        self.union(&other)
    }
}

impl Sub for AddressRange {
    type Output = Vec<AddressRange>;

    fn sub(self, other: Self) -> Self::Output {
        self.subtract(&other)
    }
}

/// Validity checks over a set of address ranges
pub trait AddressRangeSet {
    fn is_valid(&self) -> bool;

    fn is_unicast_range(&self) -> bool;

    fn is_group_range(&self) -> bool;
}

impl AddressRangeSet for [AddressRange] {
    fn is_valid(&self) -> bool {
        self.iter().all(AddressRange::is_valid)
    }

    fn is_unicast_range(&self) -> bool {
        self.iter().all(AddressRange::is_unicast_range)
    }

    fn is_group_range(&self) -> bool {
        self.iter().all(AddressRange::is_group_range)
    }
}

// ----------------------------------------------------------------------------
// Scene Range
// ----------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SceneRangeRecord {
    first_scene: SceneNumber,
    last_scene: SceneNumber,
}

/// A closed range of scene numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "SceneRangeRecord", into = "SceneRangeRecord")]
pub struct SceneRange {
    first: u16,
    last: u16,
}

impl SceneRange {
    pub const ALL_SCENES: Self = Self {
        first: SceneNumber::MIN.value(),
        last: SceneNumber::MAX.value(),
    };

    pub fn new(first: SceneNumber, last: SceneNumber) -> Self {
        Self::from_bounds(first.value(), last.value())
    }

    pub fn first_scene(&self) -> SceneNumber {
        SceneNumber::new(self.first)
    }

    pub fn last_scene(&self) -> SceneNumber {
        SceneNumber::new(self.last)
    }

    pub fn contains_scene(&self, scene: SceneNumber) -> bool {
        self.contains(scene.value())
    }

    pub fn is_valid(&self) -> bool {
        self.first_scene().is_valid() && self.last_scene().is_valid()
    }
}

impl RangeObject for SceneRange {
    fn from_bounds(a: u16, b: u16) -> Self {
        Self {
            first: a.min(b),
            last: a.max(b),
        }
    }

    fn lower_bound(&self) -> u16 {
        self.first
    }

    fn upper_bound(&self) -> u16 {
        self.last
    }
}

impl From<SceneRangeRecord> for SceneRange {
    fn from(record: SceneRangeRecord) -> Self {
        Self::new(record.first_scene, record.last_scene)
    }
}

impl From<SceneRange> for SceneRangeRecord {
    fn from(range: SceneRange) -> Self {
        Self {
            first_scene: range.first_scene(),
            last_scene: range.last_scene(),
        }
    }
}

impl fmt::Display for SceneRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}-0x{}", self.first_scene(), self.last_scene())
    }
}

impl Add for SceneRange {
    type Output = Vec<SceneRange>;

    fn add(self, other: Self) -> Self::Output {
        self.union(&other)
    }
}

impl Sub for SceneRange {
    type Output = Vec<SceneRange>;

    fn sub(self, other: Self) -> Self::Output {
        self.subtract(&other)
    }
}

/// Validity check over a set of scene ranges
pub trait SceneRangeSet {
    fn is_valid(&self) -> bool;
}

impl SceneRangeSet for [SceneRange] {
    fn is_valid(&self) -> bool {
        self.iter().all(SceneRange::is_valid)
    }
}
