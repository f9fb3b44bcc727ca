//! Trace fingerprints.
//!
//! Uses FNV-1a over the encoded trace, so two traces hash equal exactly
//! when their persisted forms are byte-identical. These hashes are not
//! cryptographically secure; they are a fast equality check for
//! comparing captures.

use std::io::{self, Write};

use crate::codec::encode_trace;
use crate::error::TraceError;
use crate::trace::Trace;

/// FNV-1a offset basis for 64-bit.
const FNV_OFFSET: u64 = 0xcbf29ce484222325;
/// FNV-1a prime for 64-bit.
const FNV_PRIME: u64 = 0x00000100000001B3;

/// Feed a single byte into an FNV-1a hash state.
#[inline]
fn fnv1a_byte(hash: u64, byte: u8) -> u64 {
    (hash ^ byte as u64).wrapping_mul(FNV_PRIME)
}

/// A [`Write`] sink that folds everything written into an FNV-1a state.
#[derive(Clone, Copy, Debug)]
pub struct Fnv1aWriter {
    state: u64,
}

impl Fnv1aWriter {
    /// A fresh hash state.
    pub fn new() -> Self {
        Self { state: FNV_OFFSET }
    }

    /// The hash of everything written so far.
    pub fn finish(&self) -> u64 {
        self.state
    }
}

impl Default for Fnv1aWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for Fnv1aWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for &b in buf {
            self.state = fnv1a_byte(self.state, b);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Hash of the encoded form of `trace`, as it stands (no canonicalization).
pub fn trace_hash(trace: &Trace) -> Result<u64, TraceError> {
    let mut h = Fnv1aWriter::new();
    encode_trace(&mut h, trace)?;
    Ok(h.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use derand_core::Sockcall;

    #[test]
    fn nothing_written_is_fnv_offset() {
        assert_eq!(Fnv1aWriter::new().finish(), FNV_OFFSET);
    }

    #[test]
    fn matches_reference_vector() {
        let mut h = Fnv1aWriter::new();
        h.write_all(b"a").unwrap();
        assert_eq!(h.finish(), 0xaf63dc4c8601ec8c);
    }

    #[test]
    fn same_trace_same_hash() {
        let mut a = Trace::default();
        a.sockcalls.push(Sockcall::sendmsg(0, 10, 0));
        let b = a.clone();
        assert_eq!(trace_hash(&a).unwrap(), trace_hash(&b).unwrap());
    }

    #[test]
    fn different_sockcall_different_hash() {
        let mut a = Trace::default();
        a.sockcalls.push(Sockcall::sendmsg(0, 10, 0));
        let mut b = Trace::default();
        b.sockcalls.push(Sockcall::sendmsg(0, 11, 0));
        assert_ne!(trace_hash(&a).unwrap(), trace_hash(&b).unwrap());
    }

    #[test]
    fn hash_ignores_unpersisted_debug_word() {
        let mut a = Trace::default();
        a.events.push(derand_core::Event::new(3, 1));
        let mut b = a.clone();
        b.events[0].debug_data = 99;
        assert_eq!(trace_hash(&a).unwrap(), trace_hash(&b).unwrap());
    }
}
