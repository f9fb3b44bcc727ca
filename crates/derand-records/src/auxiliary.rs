//! Interface shared by the self-describing auxiliary components.
//!
//! The memory-pressure queue and the effect-bool queues own their
//! on-disk layout and their size estimates. The trace store and the
//! estimator only drive them through [`AuxStream`].

use std::io::{self, Read, Write};

use crate::error::TraceError;

/// A trace component that persists and sizes itself.
pub trait AuxStream {
    /// Rewrite the captured form into its canonical form. Idempotent.
    fn transform(&mut self);

    /// Write the canonical form.
    fn dump(&self, w: &mut dyn Write) -> Result<(), TraceError>;

    /// Replace the contents with data written by [`dump`](AuxStream::dump).
    ///
    /// On error the component is left cleared.
    fn read(&mut self, r: &mut dyn Read) -> Result<(), TraceError>;

    /// Bytes used by the uncompressed representation.
    fn raw_storage_size(&self) -> u64;

    /// Estimated bytes under a compact encoding.
    fn compressed_storage_size(&self) -> u64;

    /// Human-readable listing.
    fn print(&self, w: &mut dyn Write) -> io::Result<()>;

    /// Remove every recorded read.
    fn clear(&mut self);
}
