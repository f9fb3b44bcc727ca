//! Recorded socket calls and their per-kind payloads.

use std::fmt;

use smallvec::SmallVec;

/// Capacity of the inline setsockopt option buffer, in bytes.
pub const SETSOCKOPT_OPTVAL_CAP: usize = 14;

/// Identity of a sockcall with its thread excluded.
///
/// Two sockcalls are identical when their keys are byte-equal: the kind
/// tag followed by every kind-specific field (for setsockopt, the option
/// bytes as well).
pub type SockcallKey = SmallVec<[u8; 24]>;

/// Discriminant of a sockcall, as stored on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum SockcallKind {
    /// `sendmsg`.
    Sendmsg = 0,
    /// `recvmsg`.
    Recvmsg = 1,
    /// `close`.
    Close = 2,
    /// `splice_read`.
    SpliceRead = 3,
    /// `setsockopt`.
    Setsockopt = 4,
}

impl SockcallKind {
    /// The on-disk tag.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Decode an on-disk tag.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Sendmsg),
            1 => Some(Self::Recvmsg),
            2 => Some(Self::Close),
            3 => Some(Self::SpliceRead),
            4 => Some(Self::Setsockopt),
            _ => None,
        }
    }

    /// Lower-case call name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Sendmsg => "sendmsg",
            Self::Recvmsg => "recvmsg",
            Self::Close => "close",
            Self::SpliceRead => "splice_read",
            Self::Setsockopt => "setsockopt",
        }
    }
}

/// Arguments of a recorded `setsockopt`.
///
/// `optlen` is kept as captured. A record whose `optlen` exceeds
/// [`SETSOCKOPT_OPTVAL_CAP`] is representable but unsupported: only the
/// first `SETSOCKOPT_OPTVAL_CAP` option bytes were kept.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Setsockopt {
    /// Option level (`SOL_SOCKET`, `IPPROTO_TCP`, ...).
    pub level: u8,
    /// Option name.
    pub optname: u8,
    /// Option length as captured.
    pub optlen: u8,
    /// Inline option bytes; bytes past `optlen` are zero.
    pub optval: [u8; SETSOCKOPT_OPTVAL_CAP],
}

impl Setsockopt {
    /// Build a record from an option value, keeping at most
    /// [`SETSOCKOPT_OPTVAL_CAP`] bytes inline.
    pub fn new(level: u8, optname: u8, value: &[u8]) -> Self {
        let mut optval = [0u8; SETSOCKOPT_OPTVAL_CAP];
        let kept = value.len().min(SETSOCKOPT_OPTVAL_CAP);
        optval[..kept].copy_from_slice(&value[..kept]);
        Self {
            level,
            optname,
            optlen: value.len().min(u8::MAX as usize) as u8,
            optval,
        }
    }

    /// Whether the option fits the inline buffer.
    pub fn is_valid(&self) -> bool {
        self.optlen as usize <= SETSOCKOPT_OPTVAL_CAP
    }

    /// The retained option bytes.
    pub fn value(&self) -> &[u8] {
        &self.optval[..(self.optlen as usize).min(SETSOCKOPT_OPTVAL_CAP)]
    }
}

/// Kind-specific arguments of a sockcall.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SockcallPayload {
    /// `sendmsg(flags)` that transferred `size` bytes.
    Sendmsg {
        /// `MSG_*` flags.
        flags: u32,
        /// Bytes sent.
        size: u64,
    },
    /// `recvmsg(flags)` that transferred `size` bytes.
    Recvmsg {
        /// `MSG_*` flags.
        flags: u32,
        /// Bytes received.
        size: u64,
    },
    /// `close` with the linger timeout in effect.
    Close {
        /// Linger timeout, in jiffies.
        timeout: i64,
    },
    /// `splice_read(flags)` of `size` bytes.
    SpliceRead {
        /// `SPLICE_F_*` flags.
        flags: u32,
        /// Bytes spliced.
        size: u64,
    },
    /// `setsockopt`.
    Setsockopt(Setsockopt),
}

impl SockcallPayload {
    /// The discriminant of this payload.
    pub fn kind(&self) -> SockcallKind {
        match self {
            Self::Sendmsg { .. } => SockcallKind::Sendmsg,
            Self::Recvmsg { .. } => SockcallKind::Recvmsg,
            Self::Close { .. } => SockcallKind::Close,
            Self::SpliceRead { .. } => SockcallKind::SpliceRead,
            Self::Setsockopt(_) => SockcallKind::Setsockopt,
        }
    }
}

impl fmt::Display for SockcallPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sendmsg { flags, size }
            | Self::Recvmsg { flags, size }
            | Self::SpliceRead { flags, size } => {
                write!(f, "{}: {flags:#x} {size}", self.kind().name())
            }
            Self::Close { timeout } => write!(f, "close: {timeout}"),
            Self::Setsockopt(opt) if !opt.is_valid() => write!(f, "unsupported setsockopt"),
            Self::Setsockopt(opt) => {
                write!(f, "setsockopt: {} {} {} ", opt.level, opt.optname, opt.optlen)?;
                for b in opt.value() {
                    write!(f, " {b:x}")?;
                }
                Ok(())
            }
        }
    }
}

/// One recorded socket call.
///
/// # Examples
///
/// ```
/// use derand_core::sockcall::{Sockcall, SockcallKind};
///
/// let sc = Sockcall::sendmsg(0, 1448, 0xffff_8800_1234_0000);
/// assert_eq!(sc.kind(), SockcallKind::Sendmsg);
/// assert_eq!(sc.size(), Some(1448));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Sockcall {
    /// Issuing thread: raw task id at capture, dense id once canonical.
    pub thread_id: u64,
    /// Kind-specific arguments.
    pub payload: SockcallPayload,
}

impl Sockcall {
    /// A `sendmsg` record.
    pub fn sendmsg(flags: u32, size: u64, thread_id: u64) -> Self {
        Self {
            thread_id,
            payload: SockcallPayload::Sendmsg { flags, size },
        }
    }

    /// A `recvmsg` record.
    pub fn recvmsg(flags: u32, size: u64, thread_id: u64) -> Self {
        Self {
            thread_id,
            payload: SockcallPayload::Recvmsg { flags, size },
        }
    }

    /// A `close` record.
    pub fn close(timeout: i64, thread_id: u64) -> Self {
        Self {
            thread_id,
            payload: SockcallPayload::Close { timeout },
        }
    }

    /// A `splice_read` record.
    pub fn splice_read(flags: u32, size: u64, thread_id: u64) -> Self {
        Self {
            thread_id,
            payload: SockcallPayload::SpliceRead { flags, size },
        }
    }

    /// A `setsockopt` record.
    pub fn setsockopt(opt: Setsockopt, thread_id: u64) -> Self {
        Self {
            thread_id,
            payload: SockcallPayload::Setsockopt(opt),
        }
    }

    /// The discriminant of this call.
    pub fn kind(&self) -> SockcallKind {
        self.payload.kind()
    }

    /// Flags of a sendmsg, recvmsg, or splice_read.
    pub fn flags(&self) -> Option<u32> {
        match self.payload {
            SockcallPayload::Sendmsg { flags, .. }
            | SockcallPayload::Recvmsg { flags, .. }
            | SockcallPayload::SpliceRead { flags, .. } => Some(flags),
            _ => None,
        }
    }

    /// Transfer size of a sendmsg, recvmsg, or splice_read.
    pub fn size(&self) -> Option<u64> {
        match self.payload {
            SockcallPayload::Sendmsg { size, .. }
            | SockcallPayload::Recvmsg { size, .. }
            | SockcallPayload::SpliceRead { size, .. } => Some(size),
            _ => None,
        }
    }

    /// Identity key of the call, thread excluded.
    pub fn identity_key(&self) -> SockcallKey {
        let mut key = SockcallKey::new();
        key.push(self.kind().tag());
        match &self.payload {
            SockcallPayload::Sendmsg { flags, size }
            | SockcallPayload::Recvmsg { flags, size }
            | SockcallPayload::SpliceRead { flags, size } => {
                key.extend_from_slice(&flags.to_le_bytes());
                key.extend_from_slice(&size.to_le_bytes());
            }
            SockcallPayload::Close { timeout } => {
                key.extend_from_slice(&timeout.to_le_bytes());
            }
            SockcallPayload::Setsockopt(opt) => {
                key.extend_from_slice(&[opt.level, opt.optname, opt.optlen]);
                key.extend_from_slice(opt.value());
            }
        }
        key
    }

    /// Whether two calls are identical apart from their thread.
    ///
    /// Setsockopt bytes past `optlen` are not part of the call.
    pub fn same_call(&self, other: &Sockcall) -> bool {
        self.identity_key() == other.identity_key()
    }
}

impl fmt::Display for Sockcall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} thread {}", self.payload, self.thread_id)
    }
}
