//! Binary encode/decode for the trace file format.
//!
//! All integers are little-endian, the native order of the capture hosts.
//! Variable streams are a `u32` element count followed by that many
//! fixed-size records; scalar fields carry no prefix. The format has no
//! magic or version tag: existing capture files must stay readable, so
//! the optional parts of the schema are agreed out of band through
//! [`TraceConfig`].
//!
//! ```text
//! mode u32 | broken u32 | alert u32 | 4-tuple (12 bytes) | snapshot (512 bytes)
//! events | sockcalls | drops | jiffies | memory_pressure* | memory_allocated
//! n_sockets_allocated u32 | mstamps | in_host_queue | [tx_stamps]
//! effect_bool[0..n]* | [general_events] | [advanced_events]
//! ```
//!
//! Sections marked `*` are written by the auxiliary components themselves.

use std::fmt;
use std::io::{Read, Write};

use derand_core::{
    Delta, DeltaStream, DeltaValue, Event, FourTuple, GeneralEvent, Setsockopt, SkbMstamp,
    Sockcall, SockcallKind, SockcallPayload, SETSOCKOPT_OPTVAL_CAP,
};

use crate::auxiliary::AuxStream;
use crate::config::TraceConfig;
use crate::error::TraceError;
use crate::trace::Trace;

/// Largest element count accepted for any stream.
pub const MAX_STREAM_LEN: u64 = 1 << 28;

/// On-disk size of a sockcall record: kind, thread id, payload.
pub const SOCKCALL_RECORD_SIZE: usize = 1 + 8 + SOCKCALL_PAYLOAD_SIZE;

/// On-disk size of the 4-tuple block.
pub const FOUR_TUPLE_SIZE: usize = 12;

/// Size of the payload area shared by every sockcall kind.
const SOCKCALL_PAYLOAD_SIZE: usize = 3 + SETSOCKOPT_OPTVAL_CAP;

/// Upper bound on up-front allocation when reading a stream.
const PREALLOC_LIMIT: usize = 4096;

/// A named region of the trace file, used to locate decode failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Section {
    /// Capture mode word.
    Mode,
    /// Broken flag word.
    Broken,
    /// Alert flag word.
    Alert,
    /// Connection 4-tuple.
    FourTuple,
    /// Initial socket snapshot.
    Snapshot,
    /// Event stream.
    Events,
    /// Sockcall stream.
    Sockcalls,
    /// Drop log.
    Drops,
    /// Jiffies reads.
    Jiffies,
    /// Memory-pressure queue.
    MemoryPressure,
    /// `memory_allocated` reads.
    MemoryAllocated,
    /// `n_sockets_allocated` read count.
    SocketsAllocated,
    /// `skb_mstamp` reads.
    Mstamps,
    /// `skb_still_in_host_queue` flags.
    InHostQueue,
    /// Transmit timestamps.
    TxStamps,
    /// Effect-bool queue at the given location.
    EffectBool(usize),
    /// Debug general-event stream.
    GeneralEvents,
    /// Advanced-event words.
    AdvancedEvents,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mode => write!(f, "mode"),
            Self::Broken => write!(f, "broken"),
            Self::Alert => write!(f, "alert"),
            Self::FourTuple => write!(f, "4-tuple"),
            Self::Snapshot => write!(f, "initial socket snapshot"),
            Self::Events => write!(f, "events"),
            Self::Sockcalls => write!(f, "sockcalls"),
            Self::Drops => write!(f, "drops"),
            Self::Jiffies => write!(f, "jiffies"),
            Self::MemoryPressure => write!(f, "memory pressure"),
            Self::MemoryAllocated => write!(f, "memory_allocated"),
            Self::SocketsAllocated => write!(f, "n_sockets_allocated"),
            Self::Mstamps => write!(f, "mstamps"),
            Self::InHostQueue => write!(f, "in-host-queue flags"),
            Self::TxStamps => write!(f, "tx stamps"),
            Self::EffectBool(loc) => write!(f, "effect_bool[{loc}]"),
            Self::GeneralEvents => write!(f, "general events"),
            Self::AdvancedEvents => write!(f, "advanced events"),
        }
    }
}

// ── Primitive writers ───────────────────────────────────────────

/// Write a single byte.
pub fn write_u8(w: &mut dyn Write, v: u8) -> Result<(), TraceError> {
    w.write_all(&[v])?;
    Ok(())
}

/// Write a little-endian u16.
pub fn write_u16_le(w: &mut dyn Write, v: u16) -> Result<(), TraceError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a little-endian u32.
pub fn write_u32_le(w: &mut dyn Write, v: u32) -> Result<(), TraceError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a little-endian u64.
pub fn write_u64_le(w: &mut dyn Write, v: u64) -> Result<(), TraceError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a little-endian i32.
pub fn write_i32_le(w: &mut dyn Write, v: i32) -> Result<(), TraceError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

// ── Primitive readers ───────────────────────────────────────────

/// Read a single byte.
pub fn read_u8(r: &mut dyn Read) -> Result<u8, TraceError> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// Read a little-endian u16.
pub fn read_u16_le(r: &mut dyn Read) -> Result<u16, TraceError> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

/// Read a little-endian u32.
pub fn read_u32_le(r: &mut dyn Read) -> Result<u32, TraceError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Read a little-endian u64.
pub fn read_u64_le(r: &mut dyn Read) -> Result<u64, TraceError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Read a little-endian i32.
pub fn read_i32_le(r: &mut dyn Read) -> Result<i32, TraceError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn le_u32(buf: &[u8], at: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(b)
}

fn le_u64(buf: &[u8], at: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(b)
}

// ── Fixed-size records ──────────────────────────────────────────

/// A fixed-size element of a length-prefixed stream.
pub trait Record: Sized {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Write the record.
    fn encode(&self, w: &mut dyn Write) -> Result<(), TraceError>;

    /// Read one record.
    fn decode(r: &mut dyn Read) -> Result<Self, TraceError>;
}

impl Record for u8 {
    const SIZE: usize = 1;

    fn encode(&self, w: &mut dyn Write) -> Result<(), TraceError> {
        write_u8(w, *self)
    }

    fn decode(r: &mut dyn Read) -> Result<Self, TraceError> {
        read_u8(r)
    }
}

impl Record for u32 {
    const SIZE: usize = 4;

    fn encode(&self, w: &mut dyn Write) -> Result<(), TraceError> {
        write_u32_le(w, *self)
    }

    fn decode(r: &mut dyn Read) -> Result<Self, TraceError> {
        read_u32_le(r)
    }
}

impl Record for i32 {
    const SIZE: usize = 4;

    fn encode(&self, w: &mut dyn Write) -> Result<(), TraceError> {
        write_i32_le(w, *self)
    }

    fn decode(r: &mut dyn Read) -> Result<Self, TraceError> {
        read_i32_le(r)
    }
}

impl Record for SkbMstamp {
    const SIZE: usize = 8;

    fn encode(&self, w: &mut dyn Write) -> Result<(), TraceError> {
        write_u32_le(w, self.stamp_us)?;
        write_u32_le(w, self.stamp_jiffies)
    }

    fn decode(r: &mut dyn Read) -> Result<Self, TraceError> {
        Ok(Self {
            stamp_us: read_u32_le(r)?,
            stamp_jiffies: read_u32_le(r)?,
        })
    }
}

impl Record for GeneralEvent {
    const SIZE: usize = 12;

    fn encode(&self, w: &mut dyn Write) -> Result<(), TraceError> {
        write_u32_le(w, self.kind)?;
        write_u64_le(w, self.data)
    }

    fn decode(r: &mut dyn Read) -> Result<Self, TraceError> {
        Ok(Self {
            kind: read_u32_le(r)?,
            data: read_u64_le(r)?,
        })
    }
}

impl Record for Sockcall {
    const SIZE: usize = SOCKCALL_RECORD_SIZE;

    fn encode(&self, w: &mut dyn Write) -> Result<(), TraceError> {
        let mut buf = [0u8; SOCKCALL_RECORD_SIZE];
        buf[0] = self.kind().tag();
        buf[1..9].copy_from_slice(&self.thread_id.to_le_bytes());
        let payload = &mut buf[9..];
        match &self.payload {
            SockcallPayload::Sendmsg { flags, size }
            | SockcallPayload::Recvmsg { flags, size }
            | SockcallPayload::SpliceRead { flags, size } => {
                payload[0..4].copy_from_slice(&flags.to_le_bytes());
                payload[4..12].copy_from_slice(&size.to_le_bytes());
            }
            SockcallPayload::Close { timeout } => {
                payload[0..8].copy_from_slice(&timeout.to_le_bytes());
            }
            SockcallPayload::Setsockopt(opt) => {
                payload[0] = opt.level;
                payload[1] = opt.optname;
                payload[2] = opt.optlen;
                payload[3..].copy_from_slice(&opt.optval);
            }
        }
        w.write_all(&buf)?;
        Ok(())
    }

    fn decode(r: &mut dyn Read) -> Result<Self, TraceError> {
        let mut buf = [0u8; SOCKCALL_RECORD_SIZE];
        r.read_exact(&mut buf)?;
        let kind =
            SockcallKind::from_tag(buf[0]).ok_or(TraceError::UnknownSockcallKind { tag: buf[0] })?;
        let thread_id = le_u64(&buf, 1);
        let payload = &buf[9..];
        let payload = match kind {
            SockcallKind::Sendmsg => SockcallPayload::Sendmsg {
                flags: le_u32(payload, 0),
                size: le_u64(payload, 4),
            },
            SockcallKind::Recvmsg => SockcallPayload::Recvmsg {
                flags: le_u32(payload, 0),
                size: le_u64(payload, 4),
            },
            SockcallKind::SpliceRead => SockcallPayload::SpliceRead {
                flags: le_u32(payload, 0),
                size: le_u64(payload, 4),
            },
            SockcallKind::Close => SockcallPayload::Close {
                timeout: le_u64(payload, 0) as i64,
            },
            SockcallKind::Setsockopt => {
                let mut optval = [0u8; SETSOCKOPT_OPTVAL_CAP];
                optval.copy_from_slice(&payload[3..]);
                SockcallPayload::Setsockopt(Setsockopt {
                    level: payload[0],
                    optname: payload[1],
                    optlen: payload[2],
                    optval,
                })
            }
        };
        Ok(Sockcall { thread_id, payload })
    }
}

// ── Streams ─────────────────────────────────────────────────────

fn write_len(w: &mut dyn Write, section: Section, len: usize) -> Result<(), TraceError> {
    if len as u64 > MAX_STREAM_LEN {
        return Err(TraceError::StreamTooLong {
            section,
            len: len as u64,
        });
    }
    write_u32_le(w, len as u32)
}

fn read_len(r: &mut dyn Read, section: Section) -> Result<usize, TraceError> {
    let len = read_u32_le(r).map_err(|e| e.in_section(section))?;
    if len as u64 > MAX_STREAM_LEN {
        return Err(TraceError::StreamTooLong {
            section,
            len: len as u64,
        });
    }
    Ok(len as usize)
}

/// Write a length-prefixed stream of fixed-size records.
pub fn write_records<T: Record>(
    w: &mut dyn Write,
    section: Section,
    items: &[T],
) -> Result<(), TraceError> {
    write_len(w, section, items.len())?;
    for item in items {
        item.encode(w)?;
    }
    Ok(())
}

/// Read a length-prefixed stream of fixed-size records.
///
/// The destination is sized from the length prefix; a short read is
/// reported as [`TraceError::Truncated`] for `section`.
pub fn read_records<T: Record>(r: &mut dyn Read, section: Section) -> Result<Vec<T>, TraceError> {
    let len = read_len(r, section)?;
    let mut items = Vec::with_capacity(len.min(PREALLOC_LIMIT));
    for _ in 0..len {
        items.push(T::decode(r).map_err(|e| e.in_section(section))?);
    }
    Ok(items)
}

/// Write the event stream; the debug word is included when `debug` is set.
pub fn write_events(w: &mut dyn Write, events: &[Event], debug: bool) -> Result<(), TraceError> {
    write_len(w, Section::Events, events.len())?;
    for e in events {
        write_u32_le(w, e.sequence)?;
        write_u32_le(w, e.event_type)?;
        if debug {
            write_u32_le(w, e.debug_data)?;
        }
    }
    Ok(())
}

/// Read the event stream written by [`write_events`].
pub fn read_events(r: &mut dyn Read, debug: bool) -> Result<Vec<Event>, TraceError> {
    let len = read_len(r, Section::Events)?;
    let mut events = Vec::with_capacity(len.min(PREALLOC_LIMIT));
    for _ in 0..len {
        events.push(read_event(r, debug).map_err(|e| e.in_section(Section::Events))?);
    }
    Ok(events)
}

fn read_event(r: &mut dyn Read, debug: bool) -> Result<Event, TraceError> {
    let sequence = read_u32_le(r)?;
    let event_type = read_u32_le(r)?;
    let debug_data = if debug { read_u32_le(r)? } else { 0 };
    Ok(Event {
        sequence,
        event_type,
        debug_data,
    })
}

/// Write a delta stream: count, absolute head, then the delta pairs.
pub fn write_delta_stream<D: DeltaValue>(
    w: &mut dyn Write,
    section: Section,
    stream: &DeltaStream<D>,
) -> Result<(), TraceError> {
    write_len(w, section, stream.len())?;
    if let Some(head) = stream.head() {
        write_u64_le(w, head)?;
        for d in stream.deltas() {
            write_u32_le(w, d.index_delta)?;
            write_u32_le(w, d.value_delta.to_bits())?;
        }
    }
    Ok(())
}

/// Read a delta stream written by [`write_delta_stream`].
pub fn read_delta_stream<D: DeltaValue>(
    r: &mut dyn Read,
    section: Section,
) -> Result<DeltaStream<D>, TraceError> {
    let len = read_len(r, section)?;
    if len == 0 {
        return Ok(DeltaStream::new());
    }
    let head = read_u64_le(r).map_err(|e| e.in_section(section))?;
    let mut deltas = Vec::with_capacity((len - 1).min(PREALLOC_LIMIT));
    for _ in 1..len {
        let index_delta = read_u32_le(r).map_err(|e| e.in_section(section))?;
        let bits = read_u32_le(r).map_err(|e| e.in_section(section))?;
        deltas.push(Delta {
            index_delta,
            value_delta: D::from_bits(bits),
        });
    }
    DeltaStream::from_parts(head, deltas).map_err(|source| TraceError::Stream { section, source })
}

fn write_four_tuple(w: &mut dyn Write, t: &FourTuple) -> Result<(), TraceError> {
    write_u32_le(w, t.src_ip)?;
    write_u16_le(w, t.src_port)?;
    write_u32_le(w, t.dst_ip)?;
    write_u16_le(w, t.dst_port)
}

fn read_four_tuple(r: &mut dyn Read) -> Result<FourTuple, TraceError> {
    Ok(FourTuple {
        src_ip: read_u32_le(r)?,
        src_port: read_u16_le(r)?,
        dst_ip: read_u32_le(r)?,
        dst_port: read_u16_le(r)?,
    })
}

fn in_section<T>(section: Section, res: Result<T, TraceError>) -> Result<T, TraceError> {
    res.map_err(|e| e.in_section(section))
}

// ── Whole trace ─────────────────────────────────────────────────

/// Encode a trace as-is. Callers wanting the canonical form go through
/// [`Trace::persist`], which canonicalizes first.
pub fn encode_trace(w: &mut dyn Write, trace: &Trace) -> Result<(), TraceError> {
    let config = &trace.config;
    config.validate()?;
    if trace.effect_bools.len() != config.effect_bool_locations {
        return Err(TraceError::MalformedAux {
            section: Section::EffectBool(trace.effect_bools.len()),
            detail: format!(
                "{} effect-bool queues but the schema has {} locations",
                trace.effect_bools.len(),
                config.effect_bool_locations
            ),
        });
    }

    write_u32_le(w, trace.mode)?;
    write_u32_le(w, trace.broken)?;
    write_u32_le(w, trace.alert)?;
    write_four_tuple(w, &trace.tuple)?;
    w.write_all(trace.snapshot.as_bytes())?;

    write_events(w, &trace.events, config.debug_events)?;
    write_records(w, Section::Sockcalls, &trace.sockcalls)?;
    write_records(w, Section::Drops, &trace.drops)?;
    write_delta_stream(w, Section::Jiffies, &trace.jiffies)?;
    trace.memory_pressure.dump(w)?;
    write_delta_stream(w, Section::MemoryAllocated, &trace.memory_allocated)?;
    write_u32_le(w, trace.n_sockets_allocated)?;
    write_records(w, Section::Mstamps, &trace.mstamps)?;
    write_records(w, Section::InHostQueue, &trace.in_host_queue)?;
    if config.tx_stamps {
        write_records(w, Section::TxStamps, &trace.tx_stamps)?;
    }
    for eb in &trace.effect_bools {
        eb.dump(w)?;
    }
    if config.debug_events {
        write_records(w, Section::GeneralEvents, &trace.general_events)?;
    }
    if config.advanced_events {
        write_records(w, Section::AdvancedEvents, &trace.advanced_events)?;
    }

    log::debug!(
        "encoded trace {}: {} events, {} sockcalls",
        trace.tuple,
        trace.events.len(),
        trace.sockcalls.len()
    );
    Ok(())
}

/// Decode a trace written under `config`.
///
/// Builds a fresh [`Trace`]; on error nothing partially decoded escapes.
pub fn decode_trace(r: &mut dyn Read, config: TraceConfig) -> Result<Trace, TraceError> {
    config.validate()?;
    let mut trace = Trace::new(config)?;

    trace.mode = in_section(Section::Mode, read_u32_le(r))?;
    trace.broken = in_section(Section::Broken, read_u32_le(r))?;
    trace.alert = in_section(Section::Alert, read_u32_le(r))?;
    trace.tuple = in_section(Section::FourTuple, read_four_tuple(r))?;
    in_section(
        Section::Snapshot,
        r.read_exact(trace.snapshot.as_bytes_mut())
            .map_err(TraceError::from),
    )?;

    trace.events = read_events(r, trace.config.debug_events)?;
    trace.sockcalls = read_records(r, Section::Sockcalls)?;
    trace.drops = read_records(r, Section::Drops)?;
    trace.jiffies = read_delta_stream(r, Section::Jiffies)?;
    in_section(Section::MemoryPressure, trace.memory_pressure.read(r))?;
    trace.memory_allocated = read_delta_stream(r, Section::MemoryAllocated)?;
    trace.n_sockets_allocated = in_section(Section::SocketsAllocated, read_u32_le(r))?;
    trace.mstamps = read_records(r, Section::Mstamps)?;
    trace.in_host_queue = read_records(r, Section::InHostQueue)?;
    if trace.config.tx_stamps {
        trace.tx_stamps = read_records(r, Section::TxStamps)?;
    }
    for (loc, eb) in trace.effect_bools.iter_mut().enumerate() {
        in_section(Section::EffectBool(loc), eb.read(r))?;
    }
    if trace.config.debug_events {
        trace.general_events = read_records(r, Section::GeneralEvents)?;
    }
    if trace.config.advanced_events {
        trace.advanced_events = read_records(r, Section::AdvancedEvents)?;
    }

    log::debug!(
        "decoded trace {}: {} events, {} sockcalls",
        trace.tuple,
        trace.events.len(),
        trace.sockcalls.len()
    );
    Ok(trace)
}

/// Encoded size of the fixed header: flags, 4-tuple, and snapshot.
pub fn header_size() -> usize {
    3 * 4 + FOUR_TUPLE_SIZE + derand_core::SOCK_SNAPSHOT_SIZE
}
