//! Memory-pressure read outcomes.

use std::io::{self, Read, Write};

use derand_core::cost_bits;

use crate::auxiliary::AuxStream;
use crate::codec::{read_records, read_u32_le, write_records, write_u32_le, Section};
use crate::error::TraceError;

/// Outcomes of every `tcp_under_memory_pressure` read on the connection.
///
/// Captured as a bitmap (bit `k` of word `j` is read `32j + k`).
/// [`transform`](AuxStream::transform) converts it to the sorted list of
/// read indices that returned true, which is what gets persisted: pressure
/// is rare, so the list is far smaller than the bitmap.
#[derive(Clone, Debug, Default)]
pub struct MemoryPressureQueue {
    n_reads: u32,
    words: Vec<u32>,
    ones: Vec<u32>,
    canonical: bool,
}

impl MemoryPressureQueue {
    /// An empty queue in capture form.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of the next read.
    pub fn push(&mut self, pressured: bool) {
        let index = self.n_reads;
        if self.canonical {
            if pressured {
                self.ones.push(index);
            }
        } else {
            let word = (index / 32) as usize;
            if word == self.words.len() {
                self.words.push(0);
            }
            if pressured {
                self.words[word] |= 1 << (index % 32);
            }
        }
        self.n_reads += 1;
    }

    /// Number of recorded reads.
    pub fn n_reads(&self) -> u32 {
        self.n_reads
    }

    /// Whether no read was recorded.
    pub fn is_empty(&self) -> bool {
        self.n_reads == 0
    }

    /// Whether the queue holds the canonical index list.
    pub fn is_canonical(&self) -> bool {
        self.canonical
    }

    /// Indices of the reads that returned true, in increasing order.
    pub fn one_indices(&self) -> Vec<u32> {
        if self.canonical {
            return self.ones.clone();
        }
        (0..self.n_reads)
            .filter(|&i| {
                self.words
                    .get((i / 32) as usize)
                    .is_some_and(|w| w & (1 << (i % 32)) != 0)
            })
            .collect()
    }

    fn bitmap_words(&self) -> u64 {
        (self.n_reads as u64).div_ceil(32)
    }
}

impl PartialEq for MemoryPressureQueue {
    fn eq(&self, other: &Self) -> bool {
        self.n_reads == other.n_reads && self.one_indices() == other.one_indices()
    }
}

impl AuxStream for MemoryPressureQueue {
    fn transform(&mut self) {
        if self.canonical {
            return;
        }
        self.ones = self.one_indices();
        self.words = Vec::new();
        self.canonical = true;
    }

    fn dump(&self, w: &mut dyn Write) -> Result<(), TraceError> {
        write_u32_le(w, self.n_reads)?;
        write_records(w, Section::MemoryPressure, &self.one_indices())
    }

    fn read(&mut self, r: &mut dyn Read) -> Result<(), TraceError> {
        self.clear();
        let n_reads = read_u32_le(r).map_err(|e| e.in_section(Section::MemoryPressure))?;
        let ones: Vec<u32> = read_records(r, Section::MemoryPressure)?;
        let mut previous: Option<u32> = None;
        for &i in &ones {
            if i >= n_reads || previous.is_some_and(|p| i <= p) {
                return Err(TraceError::MalformedAux {
                    section: Section::MemoryPressure,
                    detail: format!("read index {i} out of order or beyond {n_reads} reads"),
                });
            }
            previous = Some(i);
        }
        self.n_reads = n_reads;
        self.ones = ones;
        self.canonical = true;
        Ok(())
    }

    fn raw_storage_size(&self) -> u64 {
        4 + 4 * self.bitmap_words()
    }

    fn compressed_storage_size(&self) -> u64 {
        if self.n_reads == 0 {
            return 0;
        }
        let ones = self.one_indices();
        let mut bits = cost_bits(self.n_reads as u64) as u64 + cost_bits(ones.len() as u64) as u64;
        let mut next = 0u32;
        for &i in &ones {
            bits += cost_bits((i - next) as u64) as u64;
            next = i + 1;
        }
        bits / 8
    }

    fn print(&self, w: &mut dyn Write) -> io::Result<()> {
        let ones = self.one_indices();
        writeln!(w, "{} reads, {} under pressure", self.n_reads, ones.len())?;
        for i in ones {
            writeln!(w, "{i}")?;
        }
        Ok(())
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}
