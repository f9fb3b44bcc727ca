//! Canonicalization, persistence, and size estimation for derand traces.
//!
//! A derand trace records every nondeterministic input a TCP connection
//! saw in the kernel, so that the connection can later be replayed
//! exactly. This crate takes a raw capture and:
//!
//! - brings it to a canonical form ([`Trace::canonicalize`]): dense
//!   thread ids and sockcalls in first-reference order, so identical
//!   behavior yields identical files;
//! - persists and loads it with a custom little-endian binary codec
//!   ([`codec`]);
//! - estimates how large it would be under compact encodings
//!   ([`estimate`]), next to its raw size;
//! - fingerprints and compares traces ([`trace_hash`], [`compare_traces`]).
//!
//! # Format
//!
//! ```text
//! [header: mode broken alert 4-tuple snapshot]
//! [events] [sockcalls] [drops] [jiffies] [memory pressure] [memory_allocated]
//! [n_sockets_allocated] [mstamps] [in_host_queue] [tx_stamps?]
//! [effect_bool × N] [general_events?] [advanced_events?]
//! ```
//!
//! The file carries no magic or version tag. Which optional sections are
//! present, and `N`, come from the [`TraceConfig`] both sides agree on.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod auxiliary;
pub mod canonical;
pub mod codec;
pub mod compare;
pub mod config;
pub mod effect_bool;
pub mod error;
pub mod estimate;
pub mod hash;
pub mod pressure;
pub mod render;
pub mod report;
pub mod trace;

pub use auxiliary::AuxStream;
pub use canonical::{
    canonicalize_streams, canonicalize_thread_ids, reorder_sockcalls, CanonicalSummary,
    ReorderSummary,
};
pub use codec::{decode_trace, encode_trace, Section, MAX_STREAM_LEN};
pub use compare::{compare_traces, TraceDivergence};
pub use config::{ConfigError, TraceConfig, DEFAULT_EFFECT_BOOL_LOCATIONS};
pub use effect_bool::EffectBoolQueue;
pub use error::TraceError;
pub use estimate::{EventEstimate, SockcallEstimate};
pub use hash::trace_hash;
pub use pressure::MemoryPressureQueue;
pub use report::{ReportKind, StorageEntry, StorageReport};
pub use trace::Trace;
