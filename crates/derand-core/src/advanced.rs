//! Advanced-event records packed into the advanced-event word stream.
//!
//! Each record is a header word followed by its arguments:
//!
//! ```text
//! header: type u8 | loc u8 | n u8 | fmt u8   (byte order of the word)
//! args:   n arguments, 1 word each, or 2 words (low, high) when the
//!         matching fmt bit is set; the first argument uses bit n-1
//! ```

use std::fmt;

use crate::error::AdvancedEventError;

/// Largest argument count the `fmt` byte can describe.
pub const MAX_ADVANCED_ARGS: u8 = 8;

/// The header word of an advanced event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct AdvancedEventHeader {
    /// Event type.
    pub kind: u8,
    /// Instrumented location.
    pub location: u8,
    /// Number of arguments that follow.
    pub n_args: u8,
    /// Width bits, one per argument, most significant first.
    pub fmt: u8,
}

impl AdvancedEventHeader {
    /// Unpack a header word.
    pub fn from_word(word: u32) -> Self {
        let [kind, location, n_args, fmt] = word.to_le_bytes();
        Self {
            kind,
            location,
            n_args,
            fmt,
        }
    }

    /// Pack into a header word.
    pub fn to_word(self) -> u32 {
        u32::from_le_bytes([self.kind, self.location, self.n_args, self.fmt])
    }

    /// Whether argument `i` (in stream order) takes two words.
    pub fn is_wide(&self, i: u8) -> bool {
        i < self.n_args && (self.fmt >> (self.n_args - 1 - i)) & 1 == 1
    }

    /// Words taken by the arguments.
    pub fn arg_words(&self) -> usize {
        (0..self.n_args)
            .map(|i| if self.is_wide(i) { 2 } else { 1 })
            .sum()
    }
}

/// One decoded argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AdvancedArg {
    /// A single signed word.
    Word(i32),
    /// Two words, low first.
    Wide(i64),
}

impl fmt::Display for AdvancedArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Word(v) => write!(f, "{v}"),
            Self::Wide(v) => write!(f, "{v}"),
        }
    }
}

/// A decoded advanced event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdvancedEvent {
    /// Word offset of the header in the stream.
    pub offset: usize,
    /// The header.
    pub header: AdvancedEventHeader,
    /// Arguments in stream order.
    pub args: Vec<AdvancedArg>,
}

impl fmt::Display for AdvancedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ae{}[{}]", self.header.kind, self.header.location)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Iterator over the events of an advanced-event word stream.
///
/// Yields at most one error, after which it is exhausted.
#[derive(Clone, Debug)]
pub struct AdvancedEvents<'a> {
    words: &'a [u32],
    offset: usize,
}

impl<'a> AdvancedEvents<'a> {
    /// Iterate the events packed in `words`.
    pub fn new(words: &'a [u32]) -> Self {
        Self { words, offset: 0 }
    }
}

impl Iterator for AdvancedEvents<'_> {
    type Item = Result<AdvancedEvent, AdvancedEventError>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.offset;
        let header = AdvancedEventHeader::from_word(*self.words.get(offset)?);
        // stop after this record whatever the outcome
        self.offset = self.words.len();

        if header.n_args > MAX_ADVANCED_ARGS {
            return Some(Err(AdvancedEventError::TooManyArguments {
                offset,
                n_args: header.n_args,
            }));
        }
        let needed = header.arg_words();
        let available = self.words.len() - offset - 1;
        if needed > available {
            return Some(Err(AdvancedEventError::Truncated {
                offset,
                needed,
                available,
            }));
        }

        let mut at = offset + 1;
        let mut args = Vec::with_capacity(header.n_args as usize);
        for i in 0..header.n_args {
            if header.is_wide(i) {
                let v = self.words[at] as u64 | (self.words[at + 1] as u64) << 32;
                args.push(AdvancedArg::Wide(v as i64));
                at += 2;
            } else {
                args.push(AdvancedArg::Word(self.words[at] as i32));
                at += 1;
            }
        }
        self.offset = at;
        Some(Ok(AdvancedEvent {
            offset,
            header,
            args,
        }))
    }
}

/// Decode every event of an advanced-event word stream.
pub fn decode_advanced_events(words: &[u32]) -> Result<Vec<AdvancedEvent>, AdvancedEventError> {
    AdvancedEvents::new(words).collect()
}
