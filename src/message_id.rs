use std::fmt::{Display, Formatter};
use std::ops::{Add, Sub};

/// The sequence identifier of a message in one direction of a stream. Identifiers are assigned
///  consecutively starting at zero and are logically unbounded; only the low 16 bits travel on
///  the wire (see [MessageId::truncated] and [MessageId::reconcile]).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct MessageId(u64);

impl Display for MessageId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl MessageId {
    pub const ZERO: MessageId = MessageId(0);

    const HALF_RANGE: i128 = 0x8000;
    const FULL_RANGE: i128 = 0x1_0000;

    pub fn from_raw(value: u64) -> Self {
        Self(value)
    }

    pub fn to_raw(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> MessageId {
        MessageId(self.0.saturating_add(1))
    }

    /// The id immediately before this one, or `None` for [MessageId::ZERO]
    pub fn prev(&self) -> Option<MessageId> {
        self.0.checked_sub(1).map(MessageId)
    }

    /// the low 16 bits, i.e. the part of the id that is transmitted
    pub fn truncated(&self) -> u16 {
        (self.0 & 0xffff) as u16
    }

    /// Expand a truncated id received on the wire back to the full id space, using a reference
    ///  id that is known to be within half the 16-bit range of the actual id.
    ///
    /// The high bits are taken from the reference, and the result is shifted by one full 16-bit
    ///  period if that leaves the window `[reference - 0x8000, reference + 0x7fff]`. Ids in that
    ///  window are reconstructed exactly.
    ///
    /// Returns `None` if the reconstructed id would be negative, i.e. refers to something before
    ///  the start of the stream.
    pub fn reconcile(reference: MessageId, truncated: u16) -> Option<MessageId> {
        let reference = reference.0 as i128;

        let mut candidate = (reference & !0xffff) | truncated as i128;
        if candidate < reference - Self::HALF_RANGE {
            candidate += Self::FULL_RANGE;
        }
        else if candidate > reference + Self::HALF_RANGE - 1 {
            candidate -= Self::FULL_RANGE;
        }

        u64::try_from(candidate).ok().map(MessageId)
    }
}

impl Add<u64> for MessageId {
    type Output = MessageId;

    fn add(self, rhs: u64) -> MessageId {
        MessageId(self.0.saturating_add(rhs))
    }
}

/// NB: This saturates at zero
impl Sub<u64> for MessageId {
    type Output = MessageId;

    fn sub(self, rhs: u64) -> MessageId {
        MessageId(self.0.saturating_sub(rhs))
    }
}

/// An inclusive range of message ids, as carried by retransmission requests and abandon-range
///  records.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct IdRange {
    pub min: MessageId,
    pub max: MessageId,
}

impl Display for IdRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

impl IdRange {
    pub fn new(min: MessageId, max: MessageId) -> IdRange {
        IdRange { min, max }
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.min <= id && id <= self.max
    }
}
