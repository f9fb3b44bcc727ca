//! Per-location boolean outcome queues.

use std::io::{self, Read, Write};

use derand_core::cost_bits;

use crate::auxiliary::AuxStream;
use crate::codec::{read_records, read_u32_le, write_records, write_u32_le, Section};
use crate::error::TraceError;

/// Outcomes of the branch monitored at one effect-bool location.
///
/// Reads are packed into `u32` words, bit `k` of word `j` holding read
/// `32j + k`. The captured form is already canonical.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EffectBoolQueue {
    location: usize,
    n: u32,
    words: Vec<u32>,
}

impl EffectBoolQueue {
    /// An empty queue for `location`.
    pub fn new(location: usize) -> Self {
        Self {
            location,
            n: 0,
            words: Vec::new(),
        }
    }

    /// The monitored location this queue belongs to.
    pub fn location(&self) -> usize {
        self.location
    }

    /// Number of recorded reads.
    pub fn len(&self) -> u32 {
        self.n
    }

    /// Whether no read was recorded.
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Packed read outcomes.
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Record the outcome of the next read.
    pub fn push(&mut self, value: bool) {
        let word = (self.n / 32) as usize;
        if word == self.words.len() {
            self.words.push(0);
        }
        if value {
            self.words[word] |= 1 << (self.n % 32);
        }
        self.n += 1;
    }

    /// Outcome of read `i`, if recorded.
    pub fn get(&self, i: u32) -> Option<bool> {
        if i >= self.n {
            return None;
        }
        self.words
            .get((i / 32) as usize)
            .map(|w| w & (1 << (i % 32)) != 0)
    }

    /// Iterate the recorded outcomes in read order.
    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.n).map(|i| self.get(i).unwrap_or(false))
    }
}

impl AuxStream for EffectBoolQueue {
    fn transform(&mut self) {}

    fn dump(&self, w: &mut dyn Write) -> Result<(), TraceError> {
        let section = Section::EffectBool(self.location);
        write_u32_le(w, self.n)?;
        write_records(w, section, &self.words)
    }

    fn read(&mut self, r: &mut dyn Read) -> Result<(), TraceError> {
        let section = Section::EffectBool(self.location);
        self.clear();
        let n = read_u32_le(r).map_err(|e| e.in_section(section))?;
        let mut words: Vec<u32> = read_records(r, section)?;
        if words.len() as u64 != (n as u64).div_ceil(32) {
            return Err(TraceError::MalformedAux {
                section,
                detail: format!("{} words cannot hold exactly {n} reads", words.len()),
            });
        }
        // bits past the last read carry nothing
        if let (Some(last), tail @ 1..) = (words.last_mut(), n % 32) {
            *last &= (1u32 << tail) - 1;
        }
        self.n = n;
        self.words = words;
        Ok(())
    }

    fn raw_storage_size(&self) -> u64 {
        4 + 4 * self.words.len() as u64
    }

    fn compressed_storage_size(&self) -> u64 {
        if self.n == 0 {
            return 0;
        }
        // first value, then the length of every run of equal outcomes
        let mut bits = cost_bits(self.n as u64) as u64 + 1;
        let mut outcomes = self.iter();
        let mut current = outcomes.next().unwrap_or(false);
        let mut run = 1u64;
        for b in outcomes {
            if b == current {
                run += 1;
            } else {
                bits += cost_bits(run - 1) as u64;
                current = b;
                run = 1;
            }
        }
        bits += cost_bits(run - 1) as u64;
        bits / 8
    }

    fn print(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "effect_bool {}: {} reads {}",
            self.location,
            self.n,
            self.words.len()
        )?;
        for word in &self.words {
            let line: String = (0..32)
                .map(|k| if word & (1 << k) != 0 { '1' } else { '0' })
                .collect();
            writeln!(w, "{line}")?;
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.n = 0;
        self.words.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn queue(bits: &[bool]) -> EffectBoolQueue {
        let mut q = EffectBoolQueue::new(3);
        for &b in bits {
            q.push(b);
        }
        q
    }

    #[test]
    fn bits_pack_lsb_first() {
        let q = queue(&[true, false, true]);
        assert_eq!(q.words(), &[0b101]);
        assert_eq!(q.get(0), Some(true));
        assert_eq!(q.get(1), Some(false));
        assert_eq!(q.get(3), None);
    }

    #[test]
    fn read_33_spills_into_second_word() {
        let mut bits = vec![false; 32];
        bits.push(true);
        let q = queue(&bits);
        assert_eq!(q.words(), &[0, 1]);
        assert_eq!(q.raw_storage_size(), 12);
    }

    #[test]
    fn dump_read_roundtrip() {
        let q = queue(&[true; 40]);
        let mut buf = Vec::new();
        q.dump(&mut buf).unwrap();
        let mut back = EffectBoolQueue::new(3);
        back.read(&mut buf.as_slice()).unwrap();
        assert_eq!(back, q);
    }

    #[test]
    fn read_rejects_word_count_mismatch() {
        let mut buf = Vec::new();
        write_u32_le(&mut buf, 40).unwrap();
        write_records(&mut buf, Section::EffectBool(3), &[0u32]).unwrap();
        let mut q = EffectBoolQueue::new(3);
        assert!(matches!(
            q.read(&mut buf.as_slice()),
            Err(TraceError::MalformedAux {
                section: Section::EffectBool(3),
                ..
            })
        ));
    }

    #[test]
    fn read_clears_bits_past_last_read() {
        let mut buf = Vec::new();
        write_u32_le(&mut buf, 3).unwrap();
        write_records(&mut buf, Section::EffectBool(3), &[0xffff_fff5u32]).unwrap();
        let mut q = EffectBoolQueue::new(3);
        q.read(&mut buf.as_slice()).unwrap();
        assert_eq!(q.words(), &[0b101]);
        assert_eq!(q, queue(&[true, false, true]));
    }

    #[test]
    fn empty_queue_compresses_to_nothing() {
        assert_eq!(EffectBoolQueue::new(0).compressed_storage_size(), 0);
    }

    #[test]
    fn print_shows_bits_lsb_first() {
        let mut out = Vec::new();
        queue(&[true, true]).print(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("effect_bool 3: 2 reads 1"));
        assert_eq!(lines.next(), Some("11000000000000000000000000000000"));
    }

    proptest! {
        #[test]
        fn constant_outcomes_compress(n in 64usize..4000, value in any::<bool>()) {
            let q = queue(&vec![value; n]);
            prop_assert!(q.compressed_storage_size() <= q.raw_storage_size());
        }
    }
}
