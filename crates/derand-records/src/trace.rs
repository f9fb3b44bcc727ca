//! The trace aggregate: every stream recorded for one connection.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use derand_core::{
    Event, FourTuple, GeneralEvent, InitialSocketSnapshot, JiffiesStream, MemoryAllocatedStream,
    SkbMstamp, Sockcall, SockcallPayload,
};

use crate::auxiliary::AuxStream;
use crate::canonical::{canonicalize_streams, CanonicalSummary};
use crate::codec::{decode_trace, encode_trace};
use crate::config::TraceConfig;
use crate::effect_bool::EffectBoolQueue;
use crate::error::TraceError;
use crate::estimate;
use crate::pressure::MemoryPressureQueue;
use crate::render;
use crate::report::StorageReport;

/// Everything recorded for one TCP connection.
///
/// Built empty by [`Trace::new`] and filled by the capture side, or loaded
/// from a trace file. [`canonicalize`](Trace::canonicalize) brings it to the
/// canonical form that [`persist`](Trace::persist) writes.
#[derive(Clone, Debug, PartialEq)]
pub struct Trace {
    /// Schema the trace is persisted under.
    pub config: TraceConfig,
    /// Capture mode.
    pub mode: u32,
    /// Nonzero if the capture hit an unrecoverable condition.
    pub broken: u32,
    /// Nonzero if the capture raised an alert.
    pub alert: u32,
    /// Connection endpoints.
    pub tuple: FourTuple,
    /// Socket state at capture start.
    pub snapshot: InitialSocketSnapshot,
    /// Ordered nondeterministic events.
    pub events: Vec<Event>,
    /// Socket calls referenced by the event stream.
    pub sockcalls: Vec<Sockcall>,
    /// Sequence numbers of dropped packets.
    pub drops: Vec<u32>,
    /// Jiffies reads.
    pub jiffies: JiffiesStream,
    /// Memory-pressure reads.
    pub memory_pressure: MemoryPressureQueue,
    /// `memory_allocated` reads.
    pub memory_allocated: MemoryAllocatedStream,
    /// Number of `n_sockets_allocated` reads.
    pub n_sockets_allocated: u32,
    /// `skb_mstamp` reads.
    pub mstamps: Vec<SkbMstamp>,
    /// `skb_still_in_host_queue` results.
    pub in_host_queue: Vec<u8>,
    /// Transmit timestamps; persisted when [`TraceConfig::tx_stamps`] is set.
    pub tx_stamps: Vec<i32>,
    /// One queue per monitored effect-bool location.
    pub effect_bools: Vec<EffectBoolQueue>,
    /// Debug event log; persisted when [`TraceConfig::debug_events`] is set.
    pub general_events: Vec<GeneralEvent>,
    /// Advanced-event words; persisted when [`TraceConfig::advanced_events`] is set.
    pub advanced_events: Vec<u32>,
}

impl Trace {
    /// An empty trace under `config`.
    pub fn new(config: TraceConfig) -> Result<Self, TraceError> {
        config.validate()?;
        Ok(Self::empty(config))
    }

    fn empty(config: TraceConfig) -> Self {
        let effect_bools = (0..config.effect_bool_locations)
            .map(EffectBoolQueue::new)
            .collect();
        Self {
            config,
            mode: 0,
            broken: 0,
            alert: 0,
            tuple: FourTuple::default(),
            snapshot: InitialSocketSnapshot::zeroed(),
            events: Vec::new(),
            sockcalls: Vec::new(),
            drops: Vec::new(),
            jiffies: JiffiesStream::new(),
            memory_pressure: MemoryPressureQueue::new(),
            memory_allocated: MemoryAllocatedStream::new(),
            n_sockets_allocated: 0,
            mstamps: Vec::new(),
            in_host_queue: Vec::new(),
            tx_stamps: Vec::new(),
            effect_bools,
            general_events: Vec::new(),
            advanced_events: Vec::new(),
        }
    }

    /// Bring the trace to canonical form. Idempotent.
    ///
    /// Fails without modifying anything if an event references a sockcall
    /// past the end of the sockcall array.
    pub fn canonicalize(&mut self) -> Result<CanonicalSummary, TraceError> {
        let summary = canonicalize_streams(&mut self.events, &mut self.sockcalls)?;
        self.memory_pressure.transform();
        for eb in &mut self.effect_bools {
            eb.transform();
        }
        log::debug!(
            "canonicalized {}: {} threads, {} sockcalls referenced",
            self.tuple,
            summary.threads,
            summary.reorder.referenced
        );
        Ok(summary)
    }

    /// Canonicalize, then write the trace file to `w`.
    pub fn persist(&mut self, w: &mut dyn Write) -> Result<(), TraceError> {
        self.canonicalize()?;
        encode_trace(w, self)
    }

    /// Canonicalize, then write the trace file to `path`, or to
    /// [`FourTuple::default_file_name`] when `path` is `None`.
    ///
    /// Returns the path written.
    pub fn persist_path(&mut self, path: Option<&Path>) -> Result<PathBuf, TraceError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => PathBuf::from(self.tuple.default_file_name()),
        };
        let mut w = BufWriter::new(File::create(&path)?);
        self.persist(&mut w)?;
        w.flush()?;
        log::info!("wrote trace {} to {}", self.tuple, path.display());
        Ok(path)
    }

    /// Read a trace written under `config`.
    pub fn load(r: &mut dyn Read, config: TraceConfig) -> Result<Self, TraceError> {
        decode_trace(r, config)
    }

    /// Read the trace file at `path`.
    pub fn load_path(path: &Path, config: TraceConfig) -> Result<Self, TraceError> {
        let mut r = BufReader::new(File::open(path)?);
        let trace = Self::load(&mut r, config)?;
        log::info!("loaded trace {} from {}", trace.tuple, path.display());
        Ok(trace)
    }

    /// Replace the contents of `self` with a trace read from `r` under the
    /// current config. On error `self` is unchanged.
    pub fn read_in_place(&mut self, r: &mut dyn Read) -> Result<(), TraceError> {
        *self = Self::load(r, self.config.clone())?;
        Ok(())
    }

    /// Empty every stream, keeping the config.
    pub fn clear(&mut self) {
        self.mode = 0;
        self.broken = 0;
        self.alert = 0;
        self.tuple = FourTuple::default();
        self.snapshot = InitialSocketSnapshot::zeroed();
        self.events.clear();
        self.sockcalls.clear();
        self.drops.clear();
        self.jiffies.clear();
        self.memory_pressure.clear();
        self.memory_allocated.clear();
        self.n_sockets_allocated = 0;
        self.mstamps.clear();
        self.in_host_queue.clear();
        self.tx_stamps.clear();
        for eb in &mut self.effect_bools {
            eb.clear();
        }
        self.general_events.clear();
        self.advanced_events.clear();
    }

    /// The sockcall an event references, if any.
    pub fn event_sockcall(&self, e: &Event) -> Option<&Sockcall> {
        e.sockcall_index()
            .and_then(|i| self.sockcalls.get(i as usize))
    }

    /// Bytes passed to `sendmsg`.
    pub fn total_bytes_sent(&self) -> u64 {
        self.sockcalls
            .iter()
            .filter_map(|sc| match sc.payload {
                SockcallPayload::Sendmsg { size, .. } => Some(size),
                _ => None,
            })
            .sum()
    }

    /// Bytes returned by `recvmsg`. Spliced bytes are not counted.
    pub fn total_bytes_received(&self) -> u64 {
        self.sockcalls
            .iter()
            .filter_map(|sc| match sc.payload {
                SockcallPayload::Recvmsg { size, .. } => Some(size),
                _ => None,
            })
            .sum()
    }

    /// Received packets: sequence numbers that carry no event.
    pub fn packets_received(&self) -> u64 {
        (0..self.events.len())
            .map(|i| estimate::packets_before(&self.events, i))
            .sum()
    }

    /// Uncompressed bytes per stream.
    pub fn raw_storage_report(&self) -> StorageReport {
        estimate::raw_storage_report(self)
    }

    /// Compact-encoding estimate per stream.
    pub fn compressed_storage_report(&self) -> StorageReport {
        estimate::compressed_storage_report(self)
    }

    /// Write the human-readable listing.
    pub fn render(&self, w: &mut dyn Write) -> io::Result<()> {
        render::render_trace(w, self)
    }
}

impl Default for Trace {
    fn default() -> Self {
        Self::empty(TraceConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use derand_test_utils::{three_event_capture, RawCapture};

    fn trace_of(capture: RawCapture) -> Trace {
        let mut t = Trace::default();
        t.events = capture.events;
        t.sockcalls = capture.sockcalls;
        t
    }

    #[test]
    fn new_builds_one_queue_per_location() {
        let t = Trace::new(TraceConfig {
            effect_bool_locations: 3,
            ..Default::default()
        })
        .unwrap();
        let locs: Vec<usize> = t.effect_bools.iter().map(|q| q.location()).collect();
        assert_eq!(locs, vec![0, 1, 2]);
    }

    #[test]
    fn new_rejects_invalid_config() {
        let cfg = TraceConfig {
            effect_bool_locations: 0,
            ..Default::default()
        };
        assert!(matches!(Trace::new(cfg), Err(TraceError::Config(_))));
    }

    #[test]
    fn default_matches_new() {
        assert_eq!(Trace::default(), Trace::new(TraceConfig::default()).unwrap());
    }

    #[test]
    fn three_event_counters() {
        let mut t = trace_of(three_event_capture());
        t.canonicalize().unwrap();
        assert_eq!(t.total_bytes_sent(), 100);
        assert_eq!(t.total_bytes_received(), 0);
        assert_eq!(t.packets_received(), 3);
        assert_eq!(t.sockcalls[0].thread_id, 0);
        let sc = t.event_sockcall(&t.events[2]).unwrap();
        assert_eq!(sc.size(), Some(100));
        assert!(t.event_sockcall(&t.events[0]).is_none());
    }

    #[test]
    fn received_counts_recvmsg_only() {
        let mut t = Trace::default();
        t.sockcalls = vec![
            Sockcall::recvmsg(0, 10, 0),
            Sockcall::splice_read(0, 5, 0),
            Sockcall::sendmsg(0, 7, 0),
        ];
        assert_eq!(t.total_bytes_received(), 10);
        assert_eq!(t.total_bytes_sent(), 7);
    }

    #[test]
    fn read_in_place_keeps_self_on_error() {
        let mut t = trace_of(three_event_capture());
        let before = t.clone();
        let garbage = [0u8; 10];
        assert!(t.read_in_place(&mut garbage.as_slice()).is_err());
        assert_eq!(t, before);
    }

    #[test]
    fn clear_empties_streams() {
        let mut t = trace_of(three_event_capture());
        t.effect_bools[0].push(true);
        t.memory_pressure.push(true);
        t.clear();
        assert_eq!(t, Trace::default());
    }
}
