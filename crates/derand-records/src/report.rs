//! Per-stream storage size reports.

use std::fmt;

/// Size attributed to one stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageEntry {
    /// Stream name.
    pub name: String,
    /// Size in bytes.
    pub bytes: u64,
}

/// Whether a report measures the stored form or the compact-encoding estimate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportKind {
    /// Bytes of the uncompressed in-memory records.
    Raw,
    /// Estimated bytes under the compact encodings.
    Compressed,
}

/// Ordered per-stream sizes with a grand total.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageReport {
    kind: ReportKind,
    entries: Vec<StorageEntry>,
}

impl StorageReport {
    /// An empty report.
    pub fn new(kind: ReportKind) -> Self {
        Self {
            kind,
            entries: Vec::new(),
        }
    }

    /// Append a stream's size.
    pub fn push(&mut self, name: impl Into<String>, bytes: u64) {
        self.entries.push(StorageEntry {
            name: name.into(),
            bytes,
        });
    }

    /// What this report measures.
    pub fn kind(&self) -> ReportKind {
        self.kind
    }

    /// Entries in report order.
    pub fn entries(&self) -> &[StorageEntry] {
        &self.entries
    }

    /// Size of the named stream.
    pub fn get(&self, name: &str) -> Option<u64> {
        self.entries.iter().find(|e| e.name == name).map(|e| e.bytes)
    }

    /// Sum over every entry.
    pub fn total(&self) -> u64 {
        self.entries.iter().map(|e| e.bytes).sum()
    }
}

impl fmt::Display for StorageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for e in &self.entries {
            writeln!(f, "{}: {}", e.name, e.bytes)?;
        }
        match self.kind {
            ReportKind::Raw => writeln!(f, "total: {}", self.total()),
            ReportKind::Compressed => writeln!(f, "compressed total: {}", self.total()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_and_lookup() {
        let mut r = StorageReport::new(ReportKind::Compressed);
        r.push("events", 10);
        r.push("sockcalls", 5);
        assert_eq!(r.total(), 15);
        assert_eq!(r.get("sockcalls"), Some(5));
        assert_eq!(r.get("drops"), None);
        assert_eq!(r.to_string(), "events: 10\nsockcalls: 5\ncompressed total: 15\n");
    }
}
