//! Call-graph profiling over `tracing` spans.
//!
//! [`ProfileLayer`] times every span created while its [`Profiler`] is
//! enabled. When a span closes, its busy time is charged to its call site
//! (inclusive) and, minus the busy time of its child spans, as exclusive
//! time. Child busy time is handed to the parent span on close.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::span;
use tracing::{Metadata, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

use crate::{Error, Result};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct CallSite {
    name: &'static str,
    target: &'static str,
    file: Option<&'static str>,
    line: Option<u32>,
}

impl CallSite {
    fn of(meta: &'static Metadata<'static>) -> Self {
        Self {
            name: meta.name(),
            target: meta.target(),
            file: meta.file(),
            line: meta.line(),
        }
    }

    fn location(&self) -> String {
        match (self.file, self.line) {
            (Some(file), Some(line)) => format!("{file}:{line}"),
            (Some(file), None) => file.to_string(),
            _ => self.target.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct SiteStats {
    calls: u64,
    exclusive: Duration,
    cumulative: Duration,
}

#[derive(Debug, Default)]
struct SpanTiming {
    entered_at: Option<Instant>,
    depth: usize,
    busy: Duration,
    children: Duration,
}

#[derive(Debug, Default)]
struct Shared {
    enabled: AtomicBool,
    sites: Mutex<HashMap<CallSite, SiteStats>>,
}

impl Shared {
    fn record(&self, site: CallSite, busy: Duration, children: Duration) {
        let Ok(mut sites) = self.sites.lock() else {
            return;
        };
        let stats = sites.entry(site).or_default();
        stats.calls += 1;
        stats.cumulative += busy;
        stats.exclusive += busy.saturating_sub(children);
    }
}

/// Handle used to switch profiling on and off and to read the results.
/// Cloning shares the underlying statistics.
#[derive(Clone, Debug, Default)]
pub struct Profiler {
    shared: Arc<Shared>,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Layer that feeds this profiler. Install it once in the subscriber.
    pub fn layer(&self) -> ProfileLayer {
        ProfileLayer {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn enable(&self) {
        self.shared.enabled.store(true, Ordering::Release);
    }

    pub fn disable(&self) {
        self.shared.enabled.store(false, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Acquire)
    }

    /// Drops everything recorded so far.
    pub fn reset(&self) {
        if let Ok(mut sites) = self.shared.sites.lock() {
            sites.clear();
        }
    }

    /// Snapshot of the statistics, sorted by exclusive time.
    pub fn report(&self) -> ProfileReport {
        let entries = match self.shared.sites.lock() {
            Ok(sites) => sites
                .iter()
                .map(|(site, stats)| ProfileEntry {
                    name: site.name.to_string(),
                    location: site.location(),
                    calls: stats.calls,
                    exclusive: stats.exclusive,
                    cumulative: stats.cumulative,
                })
                .collect(),
            Err(_) => Vec::new(),
        };
        ProfileReport::from_entries(entries)
    }
}

pub struct ProfileLayer {
    shared: Arc<Shared>,
}

impl<S> Layer<S> for ProfileLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, _attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        if !self.shared.enabled.load(Ordering::Acquire) {
            return;
        }
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(SpanTiming::default());
        }
    }

    fn on_enter(&self, id: &span::Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut ext = span.extensions_mut();
        if let Some(timing) = ext.get_mut::<SpanTiming>() {
            if timing.depth == 0 {
                timing.entered_at = Some(Instant::now());
            }
            timing.depth += 1;
        }
    }

    fn on_exit(&self, id: &span::Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut ext = span.extensions_mut();
        if let Some(timing) = ext.get_mut::<SpanTiming>() {
            timing.depth = timing.depth.saturating_sub(1);
            if timing.depth == 0 {
                if let Some(t0) = timing.entered_at.take() {
                    timing.busy += t0.elapsed();
                }
            }
        }
    }

    fn on_close(&self, id: span::Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(&id) else { return };
        let Some(timing) = span.extensions_mut().remove::<SpanTiming>() else {
            return;
        };

        if let Some(parent) = span.parent() {
            if let Some(parent_timing) = parent.extensions_mut().get_mut::<SpanTiming>() {
                parent_timing.children += timing.busy;
            }
        }

        self.shared
            .record(CallSite::of(span.metadata()), timing.busy, timing.children);
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProfileEntry {
    pub name: String,
    pub location: String,
    pub calls: u64,
    /// Time spent in the operation itself, excluding instrumented sub-calls.
    pub exclusive: Duration,
    /// Time spent in the operation including sub-calls.
    pub cumulative: Duration,
}

/// Profiling results ordered by descending exclusive time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProfileReport {
    pub entries: Vec<ProfileEntry>,
}

impl ProfileReport {
    pub fn from_entries(mut entries: Vec<ProfileEntry>) -> Self {
        entries.sort_by(|a, b| {
            b.exclusive
                .cmp(&a.exclusive)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.location.cmp(&b.location))
        });
        Self { entries }
    }

    pub fn total_calls(&self) -> u64 {
        self.entries.iter().map(|e| e.calls).sum()
    }

    pub fn total_time(&self) -> Duration {
        self.entries.iter().map(|e| e.exclusive).sum()
    }

    /// First entry recorded for an operation name.
    pub fn get(&self, name: &str) -> Option<&ProfileEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| Error::io(path, e))?;
        let mut out = BufWriter::new(file);
        write!(out, "{self}").map_err(|e| Error::io(path, e))?;
        out.flush().map_err(|e| Error::io(path, e))?;
        Ok(())
    }
}

fn per_call(total: Duration, calls: u64) -> f64 {
    if calls == 0 {
        0.0
    } else {
        total.as_secs_f64() / calls as f64
    }
}

impl fmt::Display for ProfileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "         {} calls in {:.6} seconds",
            self.total_calls(),
            self.total_time().as_secs_f64()
        )?;
        writeln!(f)?;
        writeln!(f, "   Ordered by: internal time")?;
        writeln!(f)?;
        writeln!(
            f,
            "{:>9} {:>10} {:>10} {:>10} {:>10} location(operation)",
            "ncalls", "tottime", "percall", "cumtime", "percall"
        )?;
        for e in &self.entries {
            writeln!(
                f,
                "{:>9} {:>10.6} {:>10.6} {:>10.6} {:>10.6} {}({})",
                e.calls,
                e.exclusive.as_secs_f64(),
                per_call(e.exclusive, e.calls),
                e.cumulative.as_secs_f64(),
                per_call(e.cumulative, e.calls),
                e.location,
                e.name
            )?;
        }
        Ok(())
    }
}
