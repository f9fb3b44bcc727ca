//! Auxiliary streams, the connection 4-tuple, and the initial socket snapshot.

use std::fmt;

use crate::error::StreamError;

/// Size of the [`InitialSocketSnapshot`] blob, in bytes.
pub const SOCK_SNAPSHOT_SIZE: usize = 512;

// ── Delta streams ───────────────────────────────────────────────

/// A 32-bit value delta stored in a [`DeltaStream`].
///
/// Implemented for `u32` (monotonic streams such as jiffies) and `i32`
/// (signed streams such as `memory_allocated`).
pub trait DeltaValue: Copy + fmt::Debug + fmt::Display + PartialEq + Eq {
    /// Raw 32-bit representation, as stored on disk.
    fn to_bits(self) -> u32;

    /// Inverse of [`to_bits`](DeltaValue::to_bits).
    fn from_bits(bits: u32) -> Self;

    /// Apply the delta to an absolute value (wrapping, as the kernel
    /// counters themselves wrap).
    fn apply(self, base: u64) -> u64;

    /// The delta taking `prev` to `next`, if representable.
    fn between(prev: u64, next: u64) -> Option<Self>;

    /// Magnitude of the delta, for size estimation.
    fn magnitude(self) -> u64;
}

impl DeltaValue for u32 {
    fn to_bits(self) -> u32 {
        self
    }

    fn from_bits(bits: u32) -> Self {
        bits
    }

    fn apply(self, base: u64) -> u64 {
        base.wrapping_add(self as u64)
    }

    fn between(prev: u64, next: u64) -> Option<Self> {
        u32::try_from(next.wrapping_sub(prev)).ok()
    }

    fn magnitude(self) -> u64 {
        self as u64
    }
}

impl DeltaValue for i32 {
    fn to_bits(self) -> u32 {
        self as u32
    }

    fn from_bits(bits: u32) -> Self {
        bits as i32
    }

    fn apply(self, base: u64) -> u64 {
        base.wrapping_add(self as i64 as u64)
    }

    fn between(prev: u64, next: u64) -> Option<Self> {
        i32::try_from(next.wrapping_sub(prev) as i64).ok()
    }

    fn magnitude(self) -> u64 {
        self.unsigned_abs() as u64
    }
}

/// One non-initial element of a [`DeltaStream`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Delta<D> {
    /// Distance from the previous element in the read index space (`>= 1`).
    pub index_delta: u32,
    /// Change from the previous element's value.
    pub value_delta: D,
}

/// A sequence whose first element is absolute and whose later elements
/// are `(index_delta, value_delta)` pairs relative to their predecessor.
///
/// The first element sits at index 0; [`absolute`](Self::absolute)
/// reconstructs every `(index, value)` pair.
///
/// # Examples
///
/// ```
/// use derand_core::stream::JiffiesStream;
///
/// let mut jiffies = JiffiesStream::new();
/// jiffies.push(0, 4_294_937_296).unwrap();
/// jiffies.push(3, 4_294_937_300).unwrap();
/// assert_eq!(jiffies.len(), 2);
/// assert_eq!(jiffies.deltas()[0].index_delta, 3);
/// assert_eq!(jiffies.deltas()[0].value_delta, 4);
///
/// // Jiffies never go backwards.
/// assert!(jiffies.push(5, 4_294_937_299).is_err());
/// ```
#[derive(Clone, Debug)]
pub struct DeltaStream<D> {
    head: Option<u64>,
    deltas: Vec<Delta<D>>,
    /// Absolute `(index, value)` of the last element, relative to the
    /// first push.
    cursor: (u64, u64),
    origin: u64,
}

/// Jiffies reads: monotonic, unsigned deltas.
pub type JiffiesStream = DeltaStream<u32>;

/// `memory_allocated` reads: signed deltas.
pub type MemoryAllocatedStream = DeltaStream<i32>;

impl<D: DeltaValue> DeltaStream<D> {
    /// An empty stream.
    pub fn new() -> Self {
        Self {
            head: None,
            deltas: Vec::new(),
            cursor: (0, 0),
            origin: 0,
        }
    }

    /// Rebuild a stream from its stored form, validating `index_delta >= 1`.
    pub fn from_parts(head: u64, deltas: Vec<Delta<D>>) -> Result<Self, StreamError> {
        let mut index = 0u64;
        let mut value = head;
        for (i, d) in deltas.iter().enumerate() {
            if d.index_delta == 0 {
                return Err(StreamError::ZeroIndexDelta { position: i + 1 });
            }
            index += d.index_delta as u64;
            value = d.value_delta.apply(value);
        }
        Ok(Self {
            head: Some(head),
            deltas,
            cursor: (index, value),
            origin: 0,
        })
    }

    /// Append the value read at absolute read index `index`.
    ///
    /// The first push fixes the origin of the index space; later indices
    /// must be strictly greater than the previous one.
    pub fn push(&mut self, index: u64, value: u64) -> Result<(), StreamError> {
        if self.head.is_none() {
            self.head = Some(value);
            self.origin = index;
            self.cursor = (0, value);
            return Ok(());
        }
        let (prev_rel, prev_value) = self.cursor;
        let previous = prev_rel + self.origin;
        if index <= previous {
            return Err(StreamError::IndexNotIncreasing { previous, index });
        }
        let index_delta = u32::try_from(index - previous)
            .map_err(|_| StreamError::IndexGapTooLarge { previous, index })?;
        let value_delta = D::between(prev_value, value).ok_or(StreamError::ValueDeltaOutOfRange {
            previous: prev_value,
            value,
        })?;
        self.deltas.push(Delta {
            index_delta,
            value_delta,
        });
        self.cursor = (prev_rel + index_delta as u64, value);
        Ok(())
    }

    /// Absolute value of the first element.
    pub fn head(&self) -> Option<u64> {
        self.head
    }

    /// The relative elements after the first.
    pub fn deltas(&self) -> &[Delta<D>] {
        &self.deltas
    }

    /// Number of elements, the absolute head included.
    pub fn len(&self) -> usize {
        match self.head {
            Some(_) => self.deltas.len() + 1,
            None => 0,
        }
    }

    /// Whether the stream has no elements.
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Iterate reconstructed `(index, value)` pairs, first element at index 0.
    pub fn absolute(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        let mut state = self.head.map(|h| (0u64, h));
        let first = state;
        first.into_iter().chain(self.deltas.iter().map(move |d| {
            // head is Some whenever deltas is non-empty
            let (index, value) = state.unwrap_or((0, 0));
            let next = (index + d.index_delta as u64, d.value_delta.apply(value));
            state = Some(next);
            next
        }))
    }

    /// Remove every element.
    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

impl<D: DeltaValue> Default for DeltaStream<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: PartialEq> PartialEq for DeltaStream<D> {
    fn eq(&self, other: &Self) -> bool {
        self.head == other.head && self.deltas == other.deltas
    }
}

impl<D: Eq> Eq for DeltaStream<D> {}

// ── Fixed-size records ──────────────────────────────────────────

/// A `skb_mstamp` read: microsecond clock and jiffies at the same instant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SkbMstamp {
    /// Microsecond timestamp (truncated to 32 bits).
    pub stamp_us: u32,
    /// Jiffies at the time of the read (truncated to 32 bits).
    pub stamp_jiffies: u32,
}

/// A debug-build record of which queue was consumed, in capture order.
///
/// Kinds: 0 events, 1 jiffies, 2 memory pressure, 3 memory allocated,
/// 4 sockets allocated, 5 mstamp, 6 and above the effect-bool locations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct GeneralEvent {
    /// Source queue.
    pub kind: u32,
    /// Queue-specific payload (the event type for kind 0).
    pub data: u64,
}

impl GeneralEvent {
    /// Name of the source queue.
    pub fn queue_name(&self) -> String {
        match self.kind {
            0 => "evtq".into(),
            1 => "jfq".into(),
            2 => "mpq".into(),
            3 => "maq".into(),
            4 => "saq".into(),
            5 => "msq".into(),
            k => format!("ebq[{}]", k - 6),
        }
    }
}

// ── Connection identity ─────────────────────────────────────────

/// The connection 4-tuple, addresses as host-order IPv4 words.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FourTuple {
    /// Source IPv4 address.
    pub src_ip: u32,
    /// Source port.
    pub src_port: u16,
    /// Destination IPv4 address.
    pub dst_ip: u32,
    /// Destination port.
    pub dst_port: u16,
}

impl FourTuple {
    /// File name used when a trace is persisted without an explicit path.
    ///
    /// ```
    /// use derand_core::stream::FourTuple;
    ///
    /// let t = FourTuple { src_ip: 0x0a000001, src_port: 80, dst_ip: 0x0a000002, dst_port: 5000 };
    /// assert_eq!(t.default_file_name(), "0a000001:80->0a000002:5000");
    /// ```
    pub fn default_file_name(&self) -> String {
        format!(
            "{:08x}:{}->{:08x}:{}",
            self.src_ip, self.src_port, self.dst_ip, self.dst_port
        )
    }
}

impl fmt::Display for FourTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08x}:{} {:08x}:{}",
            self.src_ip, self.src_port, self.dst_ip, self.dst_port
        )
    }
}

/// TCP/socket control state captured when recording starts.
///
/// Opaque to the trace tooling beyond its fixed length; it seeds the
/// replayed socket.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct InitialSocketSnapshot {
    bytes: Box<[u8; SOCK_SNAPSHOT_SIZE]>,
}

impl InitialSocketSnapshot {
    /// An all-zero snapshot.
    pub fn zeroed() -> Self {
        Self {
            bytes: Box::new([0u8; SOCK_SNAPSHOT_SIZE]),
        }
    }

    /// Wrap exactly [`SOCK_SNAPSHOT_SIZE`] bytes; `None` on any other length.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let array: [u8; SOCK_SNAPSHOT_SIZE] = bytes.try_into().ok()?;
        Some(Self {
            bytes: Box::new(array),
        })
    }

    /// The raw blob.
    pub fn as_bytes(&self) -> &[u8; SOCK_SNAPSHOT_SIZE] {
        &self.bytes
    }

    /// Mutable access to the raw blob.
    pub fn as_bytes_mut(&mut self) -> &mut [u8; SOCK_SNAPSHOT_SIZE] {
        &mut self.bytes
    }
}

impl Default for InitialSocketSnapshot {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl fmt::Debug for InitialSocketSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nonzero = self.bytes.iter().filter(|&&b| b != 0).count();
        f.debug_struct("InitialSocketSnapshot")
            .field("len", &SOCK_SNAPSHOT_SIZE)
            .field("nonzero_bytes", &nonzero)
            .finish()
    }
}
