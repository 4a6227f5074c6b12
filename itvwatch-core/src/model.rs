//! Domain data structures for plates, centers, and available slots.

use std::fmt;
use std::num::{NonZeroU32, ParseIntError};
use std::str::FromStr;

use chrono::NaiveDateTime;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// Vehicle registration plate used to open a booking session.
pub struct Plate(String);

impl Plate {
    /// Wrap a plate, rejecting blank input.
    #[must_use]
    pub fn new<S: Into<String>>(raw: S) -> Option<Self> {
        let plate = raw.into();
        if plate.trim().is_empty() {
            None
        } else {
            Some(Self(plate))
        }
    }

    /// Plate as sent to the booking site.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Plate {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// Identifier of an inspection center on the booking site.
pub struct CenterId(NonZeroU32);

impl CenterId {
    /// Build a center id, rejecting zero.
    #[must_use]
    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(Self)
    }

    /// Raw numeric id.
    #[must_use]
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for CenterId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

impl FromStr for CenterId {
    type Err = ParseIntError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        raw.trim().parse::<NonZeroU32>().map(Self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// Opaque slot identifier assigned by the booking site.
pub struct SlotId(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
/// Single bookable appointment.
pub struct Slot {
    /// Identifier as returned by the booking site.
    pub id: SlotId,
    /// Start of the appointment in UTC.
    pub starts_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Time window the booking site declares for the returned slots.
pub struct DisplayWindow {
    /// Start label, passed through unchanged.
    pub start: String,
    /// End label, passed through unchanged.
    pub end: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Answer of the booking site for one center.
pub enum Availability {
    /// The site reported an error message instead of dates.
    Error(String),
    /// The site returned a (possibly empty) set of slots.
    Slots {
        /// Declared display window.
        window: DisplayWindow,
        /// Available slots in response order.
        slots: Vec<Slot>,
    },
}

impl Availability {
    /// Whether this answer carries at least one bookable slot.
    #[must_use]
    pub fn has_slots(&self) -> bool {
        matches!(self, Self::Slots { slots, .. } if !slots.is_empty())
    }
}
