//! Test utilities and capture fixtures for derand development.
//!
//! Provides [`CaptureBuilder`] for writing raw (non-canonical) captures
//! the way the kernel side would produce them, a handful of canned
//! scenarios, and `proptest` strategies in [`fixtures`].

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

pub use fixtures::{arb_capture, arb_sockcall};

use derand_core::{Event, Sockcall};

/// Raw kernel task id used by the canned scenarios.
pub const RAW_THREAD: u64 = 0x1000;

/// Event and sockcall streams in capture order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawCapture {
    pub events: Vec<Event>,
    pub sockcalls: Vec<Sockcall>,
}

/// Builder for raw captures.
///
/// Keeps a running packet sequence number: every recorded event consumes
/// one sequence number, and [`packets`](CaptureBuilder::packets) skips
/// over received packets that carry no event.
///
/// ```
/// use derand_core::Sockcall;
/// use derand_test_utils::CaptureBuilder;
///
/// let capture = CaptureBuilder::new()
///     .event(0)
///     .packets(3)
///     .sockcall(Sockcall::sendmsg(0, 100, 0x1000))
///     .build();
/// assert_eq!(capture.events[1].sequence, 4);
/// ```
#[derive(Clone, Debug, Default)]
pub struct CaptureBuilder {
    seq: u32,
    capture: RawCapture,
}

impl CaptureBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip `n` received packets.
    pub fn packets(mut self, n: u32) -> Self {
        self.seq += n;
        self
    }

    /// Record an intrinsic event of `event_type`.
    pub fn event(mut self, event_type: u32) -> Self {
        self.capture.events.push(Event::new(self.seq, event_type));
        self.seq += 1;
        self
    }

    /// Append a sockcall and the event referencing it.
    pub fn sockcall(mut self, sc: Sockcall) -> Self {
        let index = self.capture.sockcalls.len() as u32;
        self.capture.sockcalls.push(sc);
        self.capture.events.push(Event::sockcall(self.seq, index));
        self.seq += 1;
        self
    }

    /// Record another event referencing the already-appended sockcall `index`.
    pub fn reference(mut self, index: u32) -> Self {
        self.capture.events.push(Event::sockcall(self.seq, index));
        self.seq += 1;
        self
    }

    /// Append a sockcall no event references.
    pub fn orphan(mut self, sc: Sockcall) -> Self {
        self.capture.sockcalls.push(sc);
        self
    }

    pub fn build(self) -> RawCapture {
        self.capture
    }
}

/// Two tasklets at sequences 0 and 1, then a 100-byte sendmsg from
/// [`RAW_THREAD`] at sequence 5.
pub fn three_event_capture() -> RawCapture {
    CaptureBuilder::new()
        .event(0)
        .event(0)
        .packets(3)
        .sockcall(Sockcall::sendmsg(0, 100, RAW_THREAD))
        .build()
}

/// `n` identical back-to-back sendmsg calls from one thread.
pub fn single_thread_burst(n: u32) -> RawCapture {
    let mut b = CaptureBuilder::new();
    for _ in 0..n {
        b = b.sockcall(Sockcall::sendmsg(0x40, 1448, RAW_THREAD));
    }
    b.build()
}

/// Two threads appending interleaved calls out of reference order.
pub fn interleaved_threads() -> RawCapture {
    let mut capture = CaptureBuilder::new()
        .orphan(Sockcall::recvmsg(0, 512, 0xbeef))
        .orphan(Sockcall::sendmsg(0, 64, RAW_THREAD))
        .event(1)
        .reference(1)
        .packets(2)
        .reference(0)
        .sockcall(Sockcall::close(0, 0xbeef))
        .build();
    capture.events.push(Event::sockcall(10, 1));
    capture
}
