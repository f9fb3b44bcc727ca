//! Derand: canonical storage and size estimation for TCP replay traces.
//!
//! This is the top-level facade crate that re-exports the public API from
//! the derand sub-crates, and ships the `derand` command-line tool for
//! inspecting trace files.
//!
//! # Quick start
//!
//! ```rust
//! use derand::prelude::*;
//!
//! let mut trace = Trace::default();
//! trace.events = vec![Event::new(0, 0), Event::sockcall(1, 0)];
//! trace.sockcalls = vec![Sockcall::sendmsg(0, 100, 0x1000)];
//!
//! let mut file = Vec::new();
//! trace.persist(&mut file).unwrap();
//! assert_eq!(trace.sockcalls[0].thread_id, 0);
//!
//! let back = Trace::load(&mut &file[..], TraceConfig::default()).unwrap();
//! assert_eq!(back, trace);
//! println!("{}", back.compressed_storage_report());
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `derand-core` | Events, sockcalls, delta streams, dynamic coding cost |
//! | [`records`] | `derand-records` | Canonicalization, codec, estimators, reports |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Trace data model (`derand-core`).
///
/// Contains [`types::Event`], [`types::Sockcall`], the delta-encoded
/// auxiliary streams, and [`types::cost_bits`].
pub use derand_core as types;

/// Trace storage and estimation (`derand-records`).
///
/// The [`records::Trace`] container with its canonicalization, persistence,
/// and the raw and compressed storage reports.
pub use derand_records as records;

/// Common imports for typical derand usage.
///
/// ```rust
/// use derand::prelude::*;
/// ```
pub mod prelude {
    // Data model
    pub use derand_core::{
        Event, EventKind, FourTuple, InitialSocketSnapshot, Setsockopt, SkbMstamp, Sockcall,
        SockcallKind,
    };

    // Trace store
    pub use derand_records::{
        compare_traces, trace_hash, AuxStream, StorageReport, Trace, TraceConfig,
        TraceDivergence, TraceError,
    };
}
