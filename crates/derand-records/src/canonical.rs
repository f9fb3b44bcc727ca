//! Canonical form of a captured trace.
//!
//! Two traces of the same connection behavior differ in incidental
//! ways: kernel task ids, and the order in which concurrent threads
//! happened to append to the sockcall array. Canonicalization removes
//! both so that identical behavior produces byte-identical files:
//!
//! 1. thread ids are replaced by dense ids `0, 1, 2, ...` in order of
//!    first appearance in the sockcall array;
//! 2. the sockcall array is reordered so that sockcall `k` is the `k`-th
//!    distinct sockcall referenced by the event stream, and every event
//!    reference is rewritten accordingly.
//!
//! Step 1 runs again after step 2 so the dense ids follow the final
//! array order; with that, the whole transform is idempotent.

use indexmap::IndexSet;

use derand_core::{Event, Sockcall};

use crate::error::TraceError;

/// Outcome of [`reorder_sockcalls`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReorderSummary {
    /// Distinct sockcalls referenced by the event stream.
    pub referenced: usize,
    /// Sockcalls no event references.
    ///
    /// Their slots are not compacted: positions past `referenced` keep
    /// whatever record occupied them before the pass.
    pub unreferenced: usize,
}

/// Outcome of a full canonicalization pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CanonicalSummary {
    /// Distinct threads across the sockcall array.
    pub threads: usize,
    /// Result of the sockcall reordering.
    pub reorder: ReorderSummary,
}

/// Replace every thread id with its dense index, in order of first
/// appearance. Returns the number of distinct threads.
pub fn canonicalize_thread_ids(sockcalls: &mut [Sockcall]) -> usize {
    let mut dense: IndexSet<u64> = IndexSet::with_capacity(4);
    for sc in sockcalls.iter_mut() {
        let (id, _) = dense.insert_full(sc.thread_id);
        sc.thread_id = id as u64;
    }
    dense.len()
}

/// Old sockcall indices in order of first reference.
///
/// The new index of an old index is its position in the set.
fn first_reference_order(events: &[Event], len: usize) -> Result<IndexSet<u32>, TraceError> {
    let mut order: IndexSet<u32> = IndexSet::new();
    for (event_index, e) in events.iter().enumerate() {
        let Some(old) = e.sockcall_index() else {
            continue;
        };
        if old as usize >= len {
            return Err(TraceError::DanglingSockcall {
                event_index,
                sockcall_index: old,
                len,
            });
        }
        order.insert(old);
    }
    Ok(order)
}

/// Reorder `sockcalls` into first-reference order and rewrite the event
/// references to match.
///
/// Every reference is validated before anything is mutated; a reference
/// past the end of the array fails with [`TraceError::DanglingSockcall`]
/// and leaves both slices untouched.
pub fn reorder_sockcalls(
    events: &mut [Event],
    sockcalls: &mut [Sockcall],
) -> Result<ReorderSummary, TraceError> {
    let len = sockcalls.len();
    let order = first_reference_order(events, len)?;

    let original = sockcalls.to_vec();
    for (new, &old) in order.iter().enumerate() {
        sockcalls[new] = original[old as usize];
    }

    for e in events.iter_mut() {
        if let Some(new) = e
            .sockcall_index()
            .and_then(|old| order.get_index_of(&old))
        {
            e.set_sockcall_index(new as u32);
        }
    }

    let summary = ReorderSummary {
        referenced: order.len(),
        unreferenced: len - order.len(),
    };
    if summary.unreferenced > 0 {
        log::warn!(
            "{} of {} sockcalls are not referenced by any event; their records are not preserved",
            summary.unreferenced,
            len
        );
    }
    Ok(summary)
}

/// Canonicalize the event and sockcall streams in place.
///
/// On error neither slice is modified.
pub fn canonicalize_streams(
    events: &mut [Event],
    sockcalls: &mut [Sockcall],
) -> Result<CanonicalSummary, TraceError> {
    first_reference_order(events, sockcalls.len())?;
    canonicalize_thread_ids(sockcalls);
    let reorder = reorder_sockcalls(events, sockcalls)?;
    let threads = canonicalize_thread_ids(sockcalls);
    Ok(CanonicalSummary { threads, reorder })
}

#[cfg(test)]
mod tests {
    use super::*;
    use derand_core::SOCK_ID_BASE;
    use derand_test_utils::{arb_capture, RawCapture};
    use proptest::prelude::*;

    #[test]
    fn thread_ids_become_dense() {
        let mut scs = vec![
            Sockcall::sendmsg(0, 1, 900),
            Sockcall::sendmsg(0, 1, 17),
            Sockcall::sendmsg(0, 1, 900),
            Sockcall::recvmsg(0, 1, 5),
        ];
        assert_eq!(canonicalize_thread_ids(&mut scs), 3);
        let ids: Vec<u64> = scs.iter().map(|s| s.thread_id).collect();
        assert_eq!(ids, vec![0, 1, 0, 2]);
    }

    #[test]
    fn reorder_follows_first_reference() {
        let mut scs = vec![
            Sockcall::sendmsg(0, 10, 0),
            Sockcall::sendmsg(0, 20, 0),
            Sockcall::sendmsg(0, 30, 0),
        ];
        let mut evts = vec![
            Event::sockcall(0, 2),
            Event::new(1, 0),
            Event::sockcall(2, 0),
            Event::sockcall(3, 2),
            Event::sockcall(4, 1),
        ];
        let summary = reorder_sockcalls(&mut evts, &mut scs).unwrap();
        assert_eq!(summary, ReorderSummary { referenced: 3, unreferenced: 0 });
        let sizes: Vec<u64> = scs.iter().filter_map(|s| s.size()).collect();
        assert_eq!(sizes, vec![30, 10, 20]);
        let refs: Vec<Option<u32>> = evts.iter().map(|e| e.sockcall_index()).collect();
        assert_eq!(refs, vec![Some(0), None, Some(1), Some(0), Some(2)]);
    }

    #[test]
    fn reorder_keeps_high_type_bits() {
        let mut scs = vec![Sockcall::close(0, 0), Sockcall::close(1, 0)];
        let tagged = SOCK_ID_BASE | 0x2000_0000 | 1;
        let mut evts = vec![Event::new(0, tagged)];
        reorder_sockcalls(&mut evts, &mut scs).unwrap();
        assert_eq!(evts[0].event_type, SOCK_ID_BASE | 0x2000_0000);
    }

    #[test]
    fn dangling_reference_is_rejected_untouched() {
        let mut scs = vec![Sockcall::close(0, 0), Sockcall::close(1, 0)];
        let mut evts = vec![Event::sockcall(0, 1), Event::sockcall(1, 5)];
        let before = (evts.clone(), scs.clone());
        let err = reorder_sockcalls(&mut evts, &mut scs).unwrap_err();
        assert!(matches!(
            err,
            TraceError::DanglingSockcall {
                event_index: 1,
                sockcall_index: 5,
                len: 2
            }
        ));
        assert_eq!((evts, scs), before);
    }

    #[test]
    fn unreferenced_slots_keep_prior_contents() {
        let mut scs = vec![
            Sockcall::sendmsg(0, 1, 0),
            Sockcall::sendmsg(0, 2, 0),
            Sockcall::sendmsg(0, 3, 0),
        ];
        let mut evts = vec![Event::sockcall(0, 2)];
        let summary = reorder_sockcalls(&mut evts, &mut scs).unwrap();
        assert_eq!(summary.unreferenced, 2);
        let sizes: Vec<u64> = scs.iter().filter_map(|s| s.size()).collect();
        assert_eq!(sizes, vec![3, 2, 3]);
    }

    #[test]
    fn thread_ids_follow_final_order() {
        let mut scs = vec![Sockcall::sendmsg(0, 1, 111), Sockcall::recvmsg(0, 1, 222)];
        let mut evts = vec![Event::sockcall(0, 1), Event::sockcall(1, 0)];
        let summary = canonicalize_streams(&mut evts, &mut scs).unwrap();
        assert_eq!(summary.threads, 2);
        assert_eq!(scs[0], Sockcall::recvmsg(0, 1, 0));
        assert_eq!(scs[1], Sockcall::sendmsg(0, 1, 1));
    }

    fn canonical(capture: &RawCapture) -> (Vec<Event>, Vec<Sockcall>) {
        let mut evts = capture.events.clone();
        let mut scs = capture.sockcalls.clone();
        canonicalize_streams(&mut evts, &mut scs).unwrap();
        (evts, scs)
    }

    proptest! {
        #[test]
        fn canonicalization_is_idempotent(capture in arb_capture()) {
            let once = canonical(&capture);
            let mut twice = once.clone();
            canonicalize_streams(&mut twice.0, &mut twice.1).unwrap();
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn thread_ids_are_dense_in_order(capture in arb_capture()) {
            let (_, scs) = canonical(&capture);
            let mut next = 0u64;
            for sc in &scs {
                prop_assert!(sc.thread_id <= next);
                if sc.thread_id == next {
                    next += 1;
                }
            }
        }

        #[test]
        fn references_follow_first_use(capture in arb_capture()) {
            let (evts, scs) = canonical(&capture);
            let mut next = 0u32;
            for e in &evts {
                if let Some(idx) = e.sockcall_index() {
                    prop_assert!((idx as usize) < scs.len());
                    prop_assert!(idx <= next);
                    if idx == next {
                        next += 1;
                    }
                }
            }
        }

        #[test]
        fn references_resolve_to_the_same_call(capture in arb_capture()) {
            let (evts, scs) = canonical(&capture);
            for (before, after) in capture.events.iter().zip(&evts) {
                prop_assert_eq!(before.sequence, after.sequence);
                if let (Some(old), Some(new)) = (before.sockcall_index(), after.sockcall_index()) {
                    let old_call = capture.sockcalls[old as usize];
                    prop_assert!(old_call.same_call(&scs[new as usize]));
                }
            }
        }
    }
}
