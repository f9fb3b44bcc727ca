//! Core types for derand TCP connection traces.
//!
//! This is the leaf crate with zero internal dependencies. It defines the
//! trace data model shared by the record tooling: ordered events with
//! encoded sockcall references, sockcall records, delta-encoded auxiliary
//! streams, the connection 4-tuple, the opaque initial socket snapshot,
//! the advanced-event word layout, and the dynamic integer coding cost
//! used by the size estimators.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod advanced;
pub mod dynamic;
pub mod error;
pub mod event;
pub mod sockcall;
pub mod stream;

pub use advanced::{
    decode_advanced_events, AdvancedArg, AdvancedEvent, AdvancedEventHeader, AdvancedEvents,
    MAX_ADVANCED_ARGS,
};
pub use dynamic::cost_bits;
pub use error::{AdvancedEventError, StreamError};
pub use event::{Event, EventKind, EVENT_TYPE_BITS, SC_ID_MASK, SOCK_ID_BASE};
pub use sockcall::{
    Setsockopt, Sockcall, SockcallKey, SockcallKind, SockcallPayload, SETSOCKOPT_OPTVAL_CAP,
};
pub use stream::{
    Delta, DeltaStream, DeltaValue, FourTuple, GeneralEvent, InitialSocketSnapshot,
    JiffiesStream, MemoryAllocatedStream, SkbMstamp, SOCK_SNAPSHOT_SIZE,
};
