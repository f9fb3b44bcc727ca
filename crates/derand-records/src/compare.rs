//! Trace comparison.
//!
//! Hash-first: traces whose encoded forms hash equal compare equal. On a
//! mismatch the streams are walked in file order to locate the first
//! differing element.

use std::fmt;

use derand_core::{DeltaStream, DeltaValue, Event};

use crate::codec::Section;
use crate::config::TraceConfig;
use crate::error::TraceError;
use crate::hash::trace_hash;
use crate::trace::Trace;

/// Where two traces first differ.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TraceDivergence {
    /// The traces are persisted under different schemas and cannot be
    /// compared stream by stream.
    Schema {
        /// Schema of the left trace.
        left: TraceConfig,
        /// Schema of the right trace.
        right: TraceConfig,
    },
    /// The first differing element of a section.
    Section {
        /// The section holding the difference.
        section: Section,
        /// Index of the first differing element; for a length mismatch,
        /// the length of the shorter side.
        index: usize,
    },
}

impl fmt::Display for TraceDivergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Schema { left, right } => {
                write!(f, "schemas differ: {left:?} vs {right:?}")
            }
            Self::Section { section, index } => {
                write!(f, "first difference in {section} at element {index}")
            }
        }
    }
}

fn first_difference<T, I, J>(a: I, b: J, eq: impl Fn(&T, &T) -> bool) -> Option<usize>
where
    I: IntoIterator<Item = T>,
    J: IntoIterator<Item = T>,
{
    let mut a = a.into_iter();
    let mut b = b.into_iter();
    let mut i = 0;
    loop {
        match (a.next(), b.next()) {
            (None, None) => return None,
            (Some(x), Some(y)) if eq(&x, &y) => i += 1,
            _ => return Some(i),
        }
    }
}

fn slice_difference<T: PartialEq>(a: &[T], b: &[T]) -> Option<usize> {
    first_difference(a, b, |x, y| x == y)
}

fn delta_difference<D: DeltaValue>(a: &DeltaStream<D>, b: &DeltaStream<D>) -> Option<usize> {
    first_difference(a.absolute(), b.absolute(), |x, y| x == y)
}

fn scalar_difference<T: PartialEq>(a: T, b: T) -> Option<usize> {
    (a != b).then_some(0)
}

/// Walk every persisted section of two same-schema traces in file order.
fn first_divergence(a: &Trace, b: &Trace) -> Option<TraceDivergence> {
    let debug = a.config.debug_events;
    let same_event = |x: &&Event, y: &&Event| {
        x.sequence == y.sequence
            && x.event_type == y.event_type
            && (!debug || x.debug_data == y.debug_data)
    };

    let mut checks: Vec<(Section, Option<usize>)> = vec![
        (Section::Mode, scalar_difference(a.mode, b.mode)),
        (Section::Broken, scalar_difference(a.broken, b.broken)),
        (Section::Alert, scalar_difference(a.alert, b.alert)),
        (Section::FourTuple, scalar_difference(a.tuple, b.tuple)),
        (
            Section::Snapshot,
            slice_difference(a.snapshot.as_bytes(), b.snapshot.as_bytes()),
        ),
        (
            Section::Events,
            first_difference(&a.events, &b.events, same_event),
        ),
        (Section::Sockcalls, slice_difference(&a.sockcalls, &b.sockcalls)),
        (Section::Drops, slice_difference(&a.drops, &b.drops)),
        (Section::Jiffies, delta_difference(&a.jiffies, &b.jiffies)),
        (
            Section::MemoryPressure,
            scalar_difference(a.memory_pressure.n_reads(), b.memory_pressure.n_reads()).or_else(
                || {
                    slice_difference(
                        &a.memory_pressure.one_indices(),
                        &b.memory_pressure.one_indices(),
                    )
                },
            ),
        ),
        (
            Section::MemoryAllocated,
            delta_difference(&a.memory_allocated, &b.memory_allocated),
        ),
        (
            Section::SocketsAllocated,
            scalar_difference(a.n_sockets_allocated, b.n_sockets_allocated),
        ),
        (Section::Mstamps, slice_difference(&a.mstamps, &b.mstamps)),
        (
            Section::InHostQueue,
            slice_difference(&a.in_host_queue, &b.in_host_queue),
        ),
    ];
    if a.config.tx_stamps {
        checks.push((
            Section::TxStamps,
            slice_difference(&a.tx_stamps, &b.tx_stamps),
        ));
    }
    for (x, y) in a.effect_bools.iter().zip(&b.effect_bools) {
        checks.push((
            Section::EffectBool(x.location()),
            first_difference(x.iter(), y.iter(), |p, q| p == q)
                .or_else(|| slice_difference(x.words(), y.words())),
        ));
    }
    if debug {
        checks.push((
            Section::GeneralEvents,
            slice_difference(&a.general_events, &b.general_events),
        ));
    }
    if a.config.advanced_events {
        checks.push((
            Section::AdvancedEvents,
            slice_difference(&a.advanced_events, &b.advanced_events),
        ));
    }

    checks.into_iter().find_map(|(section, diff)| {
        diff.map(|index| TraceDivergence::Section { section, index })
    })
}

/// Compare two traces as they would be persisted.
///
/// Returns `Ok(None)` when the encoded forms are identical, otherwise the
/// first divergence in file order.
pub fn compare_traces(a: &Trace, b: &Trace) -> Result<Option<TraceDivergence>, TraceError> {
    if a.config != b.config {
        return Ok(Some(TraceDivergence::Schema {
            left: a.config.clone(),
            right: b.config.clone(),
        }));
    }
    if trace_hash(a)? == trace_hash(b)? {
        return Ok(None);
    }
    Ok(first_divergence(a, b))
}
