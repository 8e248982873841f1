use chrono::Utc;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info};

use crate::database_manager::{ask, DatabaseRequest};
use crate::wager_manager::WagerRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Done,
    Failed,
    Panicked,
}

/// Runs one job in its own task so a panic cannot take the caller down.
pub async fn run_job<J>(name: &'static str, job: J) -> JobOutcome
where
    J: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    match tokio::spawn(job).await {
        Ok(Ok(())) => JobOutcome::Done,
        Ok(Err(err)) => {
            error!(job = name, error = %err, "job failed");
            JobOutcome::Failed
        }
        Err(join_err) if join_err.is_panic() => {
            error!(job = name, "job panicked");
            JobOutcome::Panicked
        }
        Err(join_err) => {
            error!(job = name, error = %join_err, "job did not finish");
            JobOutcome::Failed
        }
    }
}

/// Periodic settle and expiry sweeps.
pub struct Scheduler {
    wager_tx: mpsc::Sender<WagerRequest>,
    db_tx: mpsc::Sender<DatabaseRequest>,
    settle_interval: Duration,
    expiry_interval: Duration,
}

impl Scheduler {
    pub fn new(
        wager_tx: mpsc::Sender<WagerRequest>,
        db_tx: mpsc::Sender<DatabaseRequest>,
        settle_interval: Duration,
        expiry_interval: Duration,
    ) -> Self {
        Self {
            wager_tx,
            db_tx,
            settle_interval,
            expiry_interval,
        }
    }

    pub async fn run(self) {
        let mut settle = time::interval(self.settle_interval);
        let mut expiry = time::interval(self.expiry_interval);
        settle.set_missed_tick_behavior(MissedTickBehavior::Delay);
        expiry.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = settle.tick() => {
                    run_job("settle", settle_sweep(self.wager_tx.clone())).await;
                }
                _ = expiry.tick() => {
                    run_job("expiry", expiry_sweep(self.db_tx.clone())).await;
                }
            }
        }
    }
}

async fn settle_sweep(wager_tx: mpsc::Sender<WagerRequest>) -> anyhow::Result<()> {
    let report = ask(&wager_tx, |responder| WagerRequest::SettleDue { responder }).await?;
    if !report.settled.is_empty() || !report.failed.is_empty() {
        info!(
            settled = report.settled.len(),
            not_ready = report.not_ready,
            failed = report.failed.len(),
            "settle sweep"
        );
    }
    Ok(())
}

async fn expiry_sweep(db_tx: mpsc::Sender<DatabaseRequest>) -> anyhow::Result<()> {
    let now = Utc::now();
    let removed = ask(&db_tx, |responder| DatabaseRequest::SweepExpired { now, responder }).await?;
    if removed > 0 {
        info!(removed, "expired modifiers removed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wager_manager::SweepReport;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn explode() -> anyhow::Result<()> {
        panic!("feed exploded")
    }

    async fn fine() -> anyhow::Result<()> {
        Ok(())
    }

    async fn broken() -> anyhow::Result<()> {
        anyhow::bail!("db down")
    }

    #[tokio::test]
    async fn a_panicking_job_does_not_stop_the_next() {
        assert_eq!(run_job("boom", explode()).await, JobOutcome::Panicked);
        assert_eq!(run_job("fine", fine()).await, JobOutcome::Done);
    }

    #[tokio::test]
    async fn errors_are_reported_as_failures() {
        assert_eq!(run_job("bad", broken()).await, JobOutcome::Failed);
    }

    #[tokio::test]
    async fn ticks_drive_both_sweeps() {
        let (wager_tx, mut wager_rx) = mpsc::channel(8);
        let (db_tx, mut db_rx) = mpsc::channel(8);
        let settles = Arc::new(AtomicUsize::new(0));
        let sweeps = Arc::new(AtomicUsize::new(0));

        let settle_count = settles.clone();
        tokio::spawn(async move {
            while let Some(WagerRequest::SettleDue { responder }) = wager_rx.recv().await {
                settle_count.fetch_add(1, Ordering::SeqCst);
                let _ = responder.send(Ok(SweepReport::default()));
            }
        });
        let sweep_count = sweeps.clone();
        tokio::spawn(async move {
            while let Some(request) = db_rx.recv().await {
                if let DatabaseRequest::SweepExpired { responder, .. } = request {
                    sweep_count.fetch_add(1, Ordering::SeqCst);
                    let _ = responder.send(Ok(0));
                }
            }
        });

        let scheduler = Scheduler::new(
            wager_tx,
            db_tx,
            Duration::from_millis(10),
            Duration::from_millis(15),
        );
        let handle = tokio::spawn(scheduler.run());

        let waited = time::timeout(Duration::from_secs(5), async {
            while settles.load(Ordering::SeqCst) < 2 || sweeps.load(Ordering::SeqCst) < 2 {
                time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        handle.abort();
        assert!(waited.is_ok());
    }
}
