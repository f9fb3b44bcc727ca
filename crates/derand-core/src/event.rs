//! Ordered trace events and the encoded sockcall reference.

use std::fmt;

/// Event types at or above this value reference a sockcall record.
pub const SOCK_ID_BASE: u32 = 0x1000_0000;

/// Bits of an event type that carry the referenced sockcall index.
pub const SC_ID_MASK: u32 = 0x0fff_ffff;

/// Number of bits reserved for an intrinsic event type in compact encodings.
pub const EVENT_TYPE_BITS: u32 = 3;

/// One entry of the ordered event stream.
///
/// `sequence` is the packet sequence number immediately preceding or
/// carrying this event; it never decreases along the stream.
///
/// # Examples
///
/// ```
/// use derand_core::event::{Event, EventKind};
///
/// let timer = Event::new(3, 1);
/// assert_eq!(timer.kind(), EventKind::WriteTimer);
///
/// let call = Event::sockcall(4, 7);
/// assert_eq!(call.sockcall_index(), Some(7));
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Event {
    /// Packet sequence number preceding or carrying the event.
    pub sequence: u32,
    /// Intrinsic event code, or `SOCK_ID_BASE | index` for a sockcall.
    pub event_type: u32,
    /// Capture-side debug word. Persisted only when debug events are enabled.
    pub debug_data: u32,
}

impl Event {
    /// An intrinsic (non-sockcall) event.
    pub fn new(sequence: u32, event_type: u32) -> Self {
        Self {
            sequence,
            event_type,
            debug_data: 0,
        }
    }

    /// An event referencing the sockcall at `index`.
    pub fn sockcall(sequence: u32, index: u32) -> Self {
        Self::new(sequence, SOCK_ID_BASE | (index & SC_ID_MASK))
    }

    /// Whether this event references a sockcall record.
    #[inline]
    pub fn is_sockcall(&self) -> bool {
        self.event_type >= SOCK_ID_BASE
    }

    /// The referenced sockcall index, if this is a sockcall event.
    #[inline]
    pub fn sockcall_index(&self) -> Option<u32> {
        self.is_sockcall().then_some(self.event_type & SC_ID_MASK)
    }

    /// Replace the referenced sockcall index, keeping every other bit of
    /// the event type.
    #[inline]
    pub fn set_sockcall_index(&mut self, index: u32) {
        self.event_type = (self.event_type & !SC_ID_MASK) | (index & SC_ID_MASK);
    }

    /// Decoded event kind.
    pub fn kind(&self) -> EventKind {
        EventKind::from_type(self.event_type)
    }
}

/// Decoded view of an event type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Receive tasklet run.
    Tasklet,
    /// Write (transmit) timer expiry.
    WriteTimer,
    /// Delayed-ACK timer expiry.
    DelackTimer,
    /// Keepalive timer expiry.
    KeepaliveTimer,
    /// Retransmission timer expiry.
    RetransmitTimer,
    /// Zero-window persist timer expiry.
    ProbeTimer,
    /// Tail-loss timer expiry.
    TlpTimer,
    /// An intrinsic code this build does not name.
    Unknown(u32),
    /// Reference to the sockcall at the given index.
    Sockcall(u32),
}

impl EventKind {
    /// Decode a raw event type.
    pub fn from_type(event_type: u32) -> Self {
        if event_type >= SOCK_ID_BASE {
            return Self::Sockcall(event_type & SC_ID_MASK);
        }
        match event_type {
            0 => Self::Tasklet,
            1 => Self::WriteTimer,
            2 => Self::DelackTimer,
            3 => Self::KeepaliveTimer,
            4 => Self::RetransmitTimer,
            5 => Self::ProbeTimer,
            6 => Self::TlpTimer,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tasklet => write!(f, "tasklet"),
            Self::WriteTimer => write!(f, "write_timer"),
            Self::DelackTimer => write!(f, "delack_timer"),
            Self::KeepaliveTimer => write!(f, "keepalive_timer"),
            Self::RetransmitTimer => write!(f, "retransmit_timer"),
            Self::ProbeTimer => write!(f, "probe_timer"),
            Self::TlpTimer => write!(f, "tlp_timer"),
            Self::Unknown(code) => write!(f, "unknown({code})"),
            Self::Sockcall(idx) => write!(f, "sockcall {idx}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn intrinsic_events_are_not_sockcalls() {
        let e = Event::new(10, 4);
        assert!(!e.is_sockcall());
        assert_eq!(e.sockcall_index(), None);
        assert_eq!(e.kind(), EventKind::RetransmitTimer);
    }

    #[test]
    fn unknown_codes_keep_their_value() {
        assert_eq!(EventKind::from_type(9), EventKind::Unknown(9));
        assert_eq!(EventKind::Unknown(9).to_string(), "unknown(9)");
    }

    #[test]
    fn set_index_preserves_high_bits() {
        let flag = 0x2000_0000;
        let mut e = Event::new(0, SOCK_ID_BASE | flag | 5);
        e.set_sockcall_index(42);
        assert_eq!(e.event_type, SOCK_ID_BASE | flag | 42);
        assert_eq!(e.sockcall_index(), Some(42));
    }

    proptest! {
        #[test]
        fn index_roundtrips_through_type(idx in 0u32..=SC_ID_MASK) {
            let e = Event::sockcall(0, idx);
            prop_assert!(e.is_sockcall());
            prop_assert_eq!(e.sockcall_index(), Some(idx));
        }
    }
}
