//! Error types for trace persistence and canonicalization.

use std::fmt;
use std::io;

use derand_core::StreamError;

use crate::codec::Section;
use crate::config::ConfigError;

/// Errors that can occur while canonicalizing, persisting, or loading a trace.
#[derive(Debug)]
pub enum TraceError {
    /// An I/O error occurred during read or write.
    Io(io::Error),
    /// The input ended in the middle of a section.
    Truncated {
        /// The section being read.
        section: Section,
    },
    /// A stream length prefix exceeds [`MAX_STREAM_LEN`](crate::codec::MAX_STREAM_LEN).
    StreamTooLong {
        /// The section being read.
        section: Section,
        /// The length read from the file.
        len: u64,
    },
    /// A sockcall record carries an unknown kind tag.
    UnknownSockcallKind {
        /// The unrecognized tag.
        tag: u8,
    },
    /// An event references a sockcall index outside the sockcall array.
    DanglingSockcall {
        /// Position of the event in the event stream.
        event_index: usize,
        /// The referenced sockcall index.
        sockcall_index: u32,
        /// Length of the sockcall array.
        len: usize,
    },
    /// A delta-encoded stream violates its invariants.
    Stream {
        /// The section holding the stream.
        section: Section,
        /// The violated invariant.
        source: StreamError,
    },
    /// An auxiliary component's data is inconsistent.
    MalformedAux {
        /// The section holding the component.
        section: Section,
        /// Human-readable description of what went wrong.
        detail: String,
    },
    /// The trace schema configuration is invalid.
    Config(ConfigError),
}

impl TraceError {
    /// Attribute a short read to `section`; other errors pass through.
    pub fn in_section(self, section: Section) -> Self {
        match self {
            Self::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof => Self::Truncated { section },
            other => other,
        }
    }
}

impl fmt::Display for TraceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Truncated { section } => write!(f, "trace truncated in {section}"),
            Self::StreamTooLong { section, len } => {
                write!(f, "{section} length {len} exceeds the stream limit")
            }
            Self::UnknownSockcallKind { tag } => write!(f, "unknown sockcall kind tag {tag}"),
            Self::DanglingSockcall {
                event_index,
                sockcall_index,
                len,
            } => write!(
                f,
                "event {event_index} references sockcall {sockcall_index} \
                 but only {len} sockcalls exist"
            ),
            Self::Stream { section, source } => write!(f, "invalid {section}: {source}"),
            Self::MalformedAux { section, detail } => write!(f, "malformed {section}: {detail}"),
            Self::Config(e) => write!(f, "invalid trace config: {e}"),
        }
    }
}

impl std::error::Error for TraceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Stream { source, .. } => Some(source),
            Self::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TraceError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<ConfigError> for TraceError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}
