use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::route::ServiceRef;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read workload trace {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse workload trace {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// A scheduled unit of synthetic traffic. Immutable once scheduled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Submission deadline relative to the run start.
    pub offset: Duration,
    pub target: ServiceRef,
}

/// Startup grace added to every trace offset so the dispatch loop is up
/// before the first deadline.
pub const FILE_START_GRACE: Duration = Duration::from_secs(2);

/// Startup grace for synthesized periodic workloads.
pub const PERIODIC_START_GRACE: Duration = Duration::from_secs(10);

/// Slow start: the first events of a greedy burst are spread on a linear
/// ramp to avoid a thundering herd.
pub const SLOW_START_EVENTS: u64 = 32;
pub const SLOW_START_STEP: Duration = Duration::from_millis(100);

/// One record of a trace document: millisecond offset plus target.
#[derive(Debug, Deserialize)]
struct TraceRecord {
    time: u64,
    service: ServiceRef,
}

/// Supplies the ordered event sequence for one run. Trace events are loaded
/// up front; synthetic sequences are produced lazily while the dispatch loop
/// walks the iterator.
#[derive(Debug, Clone)]
pub enum WorkloadSource {
    Trace {
        events: Vec<Event>,
    },
    Periodic {
        events: u64,
        rate: f64,
        target: ServiceRef,
    },
    Burst {
        events: u64,
        target: ServiceRef,
    },
}

impl WorkloadSource {
    /// Loads a JSON trace of `{"time", "service"}` records, shifting each
    /// offset by the startup grace.
    pub fn from_trace_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let records: Vec<TraceRecord> =
            serde_json::from_str(&raw).map_err(|source| Error::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let events = records
            .into_iter()
            .map(|record| Event {
                offset: FILE_START_GRACE + Duration::from_millis(record.time),
                target: record.service,
            })
            .collect();

        Ok(Self::Trace { events })
    }

    /// `events` identical events, `1/rate` seconds apart, after the periodic
    /// startup grace. `rate` must be positive (validated at configuration
    /// load).
    #[must_use]
    pub fn periodic(events: u64, rate: f64, target: ServiceRef) -> Self {
        Self::Periodic {
            events,
            rate,
            target,
        }
    }

    /// `events` identical events submitted back-to-back, with the slow-start
    /// ramp on the first [`SLOW_START_EVENTS`].
    #[must_use]
    pub fn burst(events: u64, target: ServiceRef) -> Self {
        Self::Burst { events, target }
    }

    #[must_use]
    pub fn len(&self) -> u64 {
        match self {
            Self::Trace { events } => events.len() as u64,
            Self::Periodic { events, .. } | Self::Burst { events, .. } => *events,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events in non-decreasing offset order.
    pub fn events(&self) -> Box<dyn Iterator<Item = Event> + Send + '_> {
        match self {
            Self::Trace { events } => Box::new(events.iter().cloned()),
            Self::Periodic {
                events,
                rate,
                target,
            } => {
                let rate = *rate;
                Box::new((0..*events).map(move |i| Event {
                    offset: PERIODIC_START_GRACE
                        + Duration::from_secs_f64(i as f64 / rate),
                    target: target.clone(),
                }))
            }
            Self::Burst { events, target } => Box::new((0..*events).map(move |i| Event {
                offset: SLOW_START_STEP * u32::try_from(i.min(SLOW_START_EVENTS - 1)).unwrap_or(u32::MAX),
                target: target.clone(),
            })),
        }
    }
}
