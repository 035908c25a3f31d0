//! Per-kind and per-resource results of a pipeline run.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{error, info};

use crate::error::Result;
use crate::resource::{Direction, ResourceKind, ResourceSelector};

/// Items moved for one resource.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransferCounts {
    pub transferred: u64,
    /// Rows left alone because their key already existed (strict import)
    pub skipped: u64,
}

impl std::ops::AddAssign for TransferCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.transferred += rhs.transferred;
        self.skipped += rhs.skipped;
    }
}

/// Counters shared by the concurrent tasks of one resource.
#[derive(Debug, Default)]
pub struct TransferCounter {
    transferred: AtomicU64,
    skipped: AtomicU64,
}

impl TransferCounter {
    pub fn inc_transferred(&self) {
        self.transferred.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn counts(&self) -> TransferCounts {
        TransferCounts {
            transferred: self.transferred.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug)]
pub struct ResourceOutcome {
    pub selector: ResourceSelector,
    pub result: Result<TransferCounts>,
}

impl ResourceOutcome {
    pub(crate) fn new(
        direction: Direction,
        selector: ResourceSelector,
        result: Result<TransferCounts>,
    ) -> Self {
        match &result {
            Ok(counts) => info!(
                direction = %direction,
                resource = %selector,
                transferred = counts.transferred,
                skipped = counts.skipped,
                "Resource complete"
            ),
            Err(e) => error!(
                direction = %direction,
                resource = %selector,
                error = %e,
                "Resource failed"
            ),
        }
        Self { selector, result }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Result of one kind's branch. `Err` means the resources could not be
/// listed at all.
#[derive(Debug)]
pub struct KindReport {
    pub kind: ResourceKind,
    pub result: Result<Vec<ResourceOutcome>>,
}

impl KindReport {
    pub fn is_success(&self) -> bool {
        match &self.result {
            Ok(outcomes) => outcomes.iter().all(ResourceOutcome::is_success),
            Err(_) => false,
        }
    }

    /// Sum over the resources that succeeded.
    pub fn totals(&self) -> TransferCounts {
        let mut totals = TransferCounts::default();
        if let Ok(outcomes) = &self.result {
            for counts in outcomes.iter().filter_map(|o| o.result.as_ref().ok()) {
                totals += *counts;
            }
        }
        totals
    }

    pub fn failures(&self) -> Vec<&ResourceOutcome> {
        match &self.result {
            Ok(outcomes) => outcomes.iter().filter(|o| !o.is_success()).collect(),
            Err(_) => Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub direction: Direction,
    pub kinds: Vec<KindReport>,
}

impl RunReport {
    /// True when every requested kind and every resource succeeded.
    pub fn is_success(&self) -> bool {
        self.kinds.iter().all(KindReport::is_success)
    }

    pub fn kind(&self, kind: ResourceKind) -> Option<&KindReport> {
        self.kinds.iter().find(|k| k.kind == kind)
    }
}

/// Run one kind's branch if it was requested. Unrequested branches resolve
/// immediately without touching anything.
pub(crate) async fn branch<F>(
    direction: Direction,
    kind: ResourceKind,
    requested: bool,
    work: F,
) -> Option<KindReport>
where
    F: Future<Output = Result<Vec<ResourceOutcome>>>,
{
    if !requested {
        return None;
    }
    info!(direction = %direction, kind = %kind, "Starting");
    let result = work.await;
    if let Err(e) = &result {
        error!(direction = %direction, kind = %kind, error = %e, "Branch failed");
    }
    Some(KindReport { kind, result })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn outcome(name: &str, result: Result<TransferCounts>) -> ResourceOutcome {
        ResourceOutcome {
            selector: ResourceSelector::new(ResourceKind::Tables, name),
            result,
        }
    }

    #[test]
    fn test_counter() {
        let counter = TransferCounter::default();
        counter.inc_transferred();
        counter.inc_transferred();
        counter.inc_skipped();
        assert_eq!(
            counter.counts(),
            TransferCounts {
                transferred: 2,
                skipped: 1
            }
        );
    }

    #[test]
    fn test_report_success() {
        let ok = TransferCounts {
            transferred: 3,
            skipped: 1,
        };
        let report = RunReport {
            direction: Direction::Import,
            kinds: vec![KindReport {
                kind: ResourceKind::Tables,
                result: Ok(vec![outcome("A", Ok(ok)), outcome("B", Ok(ok))]),
            }],
        };
        assert!(report.is_success());
        assert_eq!(
            report.kind(ResourceKind::Tables).unwrap().totals(),
            TransferCounts {
                transferred: 6,
                skipped: 2
            }
        );
        assert!(report.kind(ResourceKind::Blobs).is_none());
    }

    #[test]
    fn test_report_failure() {
        let kind = KindReport {
            kind: ResourceKind::Tables,
            result: Ok(vec![
                outcome("A", Ok(TransferCounts::default())),
                outcome("B", Err(Error::Config("boom".to_string()))),
            ]),
        };
        assert!(!kind.is_success());
        assert_eq!(kind.failures().len(), 1);
        assert_eq!(kind.failures()[0].selector.name, "B");

        let listing = KindReport {
            kind: ResourceKind::Queues,
            result: Err(Error::Config("no listing".to_string())),
        };
        assert!(!listing.is_success());
    }
}
