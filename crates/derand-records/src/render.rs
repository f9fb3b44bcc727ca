//! Human-readable trace listing.

use std::io::{self, Write};

use derand_core::{AdvancedEvents, EventKind, Sockcall, SockcallPayload};

use crate::auxiliary::AuxStream;
use crate::trace::Trace;

fn write_sockcall(w: &mut dyn Write, sc: &Sockcall) -> io::Result<()> {
    match &sc.payload {
        SockcallPayload::Setsockopt(opt) if !opt.is_valid() => {
            write!(w, "Error: unsupported setsockopt")
        }
        _ => write!(w, "{sc}"),
    }
}

/// Write every stream of `trace`, header first.
pub fn render_trace(w: &mut dyn Write, trace: &Trace) -> io::Result<()> {
    writeln!(w, "broken: {:x}", trace.broken)?;
    writeln!(w, "alert: {:x}", trace.alert)?;
    writeln!(w, "mode: {}", trace.mode)?;
    writeln!(w, "{}", trace.tuple)?;
    writeln!(w, "total bytes sent: {}", trace.total_bytes_sent())?;
    writeln!(w, "total bytes received: {}", trace.total_bytes_received())?;
    writeln!(w, "packets received: {}", trace.packets_received())?;

    writeln!(w, "{} sockcalls", trace.sockcalls.len())?;
    for (i, sc) in trace.sockcalls.iter().enumerate() {
        write!(w, "{i} ")?;
        write_sockcall(w, sc)?;
        writeln!(w)?;
    }

    writeln!(w, "{} events", trace.events.len())?;
    for e in &trace.events {
        write!(w, "{} {}", e.sequence, e.kind())?;
        if let EventKind::Sockcall(_) = e.kind() {
            match trace.event_sockcall(e) {
                Some(sc) => {
                    write!(w, " ")?;
                    write_sockcall(w, sc)?;
                }
                None => write!(w, " <dangling>")?,
            }
        }
        if trace.config.debug_events {
            write!(w, " {}", e.debug_data)?;
        }
        writeln!(w)?;
    }

    writeln!(w, "{} drops", trace.drops.len())?;
    for d in &trace.drops {
        writeln!(w, "{d}")?;
    }

    writeln!(w, "{} new jiffies", trace.jiffies.len())?;
    if let Some(head) = trace.jiffies.head() {
        writeln!(w, "first: {head}")?;
        for d in trace.jiffies.deltas() {
            writeln!(w, "{} {}", d.index_delta, d.value_delta)?;
        }
    }

    writeln!(w, "memory_pressure:")?;
    trace.memory_pressure.print(w)?;

    writeln!(
        w,
        "{} new values of reading memory_allocated",
        trace.memory_allocated.len()
    )?;
    if let Some(head) = trace.memory_allocated.head() {
        writeln!(w, "first: {head}")?;
        for d in trace.memory_allocated.deltas() {
            writeln!(w, "{} {}", d.index_delta, d.value_delta)?;
        }
    }

    writeln!(w, "{} reads to n_sockets_allocated", trace.n_sockets_allocated)?;

    writeln!(w, "{} skb_mstamp_get:", trace.mstamps.len())?;
    for m in &trace.mstamps {
        writeln!(w, "{} {}", m.stamp_us, m.stamp_jiffies)?;
    }

    writeln!(w, "{} skb_still_in_host_queue:", trace.in_host_queue.len())?;
    for b in &trace.in_host_queue {
        writeln!(w, "{b}")?;
    }

    if trace.config.tx_stamps {
        writeln!(w, "{} tsq:", trace.tx_stamps.len())?;
        for t in &trace.tx_stamps {
            writeln!(w, "{t}")?;
        }
    }

    for eb in &trace.effect_bools {
        eb.print(w)?;
    }

    if trace.config.debug_events {
        writeln!(w, "{} general events", trace.general_events.len())?;
        for (i, ge) in trace.general_events.iter().enumerate() {
            write!(w, "{i} {}", ge.queue_name())?;
            match ge.kind {
                // event queue entries carry an event type
                0 => match u32::try_from(ge.data) {
                    Ok(t) => writeln!(w, " {}", EventKind::from_type(t))?,
                    Err(_) => writeln!(w, " {}", ge.data)?,
                },
                _ => writeln!(w, " {}", ge.data)?,
            }
        }
    }

    if trace.config.advanced_events {
        writeln!(
            w,
            "{} u32 for advanced events",
            trace.advanced_events.len()
        )?;
        for (i, ae) in AdvancedEvents::new(&trace.advanced_events).enumerate() {
            match ae {
                Ok(ae) => writeln!(w, "{i} {} {ae}", ae.offset)?,
                Err(e) => writeln!(w, "Error: {e}")?,
            }
        }
    }
    Ok(())
}
