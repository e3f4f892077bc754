//! Worker pool: a fixed number of tasks pulling job ids from the channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::{JobId, StatusUpdate};
use crate::queue::Claim;
use crate::queue::shared::Shared;
use crate::runtime::Runtime;

/// Worker pool handle.
/// - `request_shutdown()` で全ワーカーが新しいジョブを取らなくなる
/// - `shutdown_and_join()` は期限付きで終了まで待つ
pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `n` workers.
    pub(crate) fn spawn(n: usize, shared: Arc<Shared>, runtime: Runtime) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let shared = Arc::clone(&shared);
            let runtime = runtime.clone();
            let mut rx = shutdown_rx.clone();

            let join = tokio::spawn(async move {
                worker_loop(worker_id, shared, runtime, &mut rx).await;
            });
            joins.push(join);
        }

        Self { shutdown_tx, joins }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    /// Request shutdown for all workers.
    /// 実行中の処理は中断しない。現在のジョブの結果を記録してから抜ける。
    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for all workers, sharing one `timeout` budget.
    ///
    /// Returns the number of workers that did not exit in time. Those are
    /// detached: they finish their current job and then stop.
    pub async fn shutdown_and_join(self, timeout: Duration) -> usize {
        self.request_shutdown();
        let deadline = tokio::time::Instant::now() + timeout;

        let mut stragglers = 0;
        for (worker_id, join) in self.joins.into_iter().enumerate() {
            match tokio::time::timeout_at(deadline, join).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(worker = worker_id, error = %e, "worker task ended abnormally"),
                Err(_) => {
                    warn!(worker = worker_id, "worker did not stop in time, detaching");
                    stragglers += 1;
                }
            }
        }
        stragglers
    }
}

async fn worker_loop(
    worker_id: usize,
    shared: Arc<Shared>,
    runtime: Runtime,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    info!(worker = worker_id, "worker started");

    loop {
        if *shutdown_rx.borrow() || !shared.is_running() {
            break;
        }

        // dequeue はブロックするので stop シグナルと競争させる
        let next = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            next = shared.channel.dequeue() => next,
        };

        // sentinel: フラグを再確認するだけ
        let Some(job_id) = next else {
            continue;
        };

        handle_job(worker_id, &shared, &runtime, job_id).await;
        shared.sweep();
        shared.signal_finished();
    }

    info!(worker = worker_id, "worker stopped");
}

/// Claim -> process -> record -> notify for one dequeued id.
async fn handle_job(worker_id: usize, shared: &Shared, runtime: &Runtime, job_id: JobId) {
    // 1) レコードを確保（Queued -> Processing）。cancel 済みならスキップ
    let now = shared.clock.now();
    let claim = shared.table().claim(&job_id, now);
    let record = match claim {
        Claim::Started(record) => record,
        Claim::Missing => {
            debug!(worker = worker_id, job = %job_id, "job no longer tracked, skipping");
            return;
        }
        Claim::NotQueued(status) => {
            debug!(worker = worker_id, job = %job_id, status = %status, "job not queued, skipping");
            return;
        }
    };

    info!(
        worker = worker_id,
        job = %job_id,
        conversation = %record.correlation_key,
        "processing job"
    );
    runtime.notify(&StatusUpdate::from_record(&record));

    // 2) ロックを持たずに処理関数を実行
    let outcome = runtime.execute(&record).await;
    if let Err(e) = &outcome {
        warn!(worker = worker_id, job = %job_id, error = %e, "job failed");
    }

    // 3) 結果を記録（active_workers の減算も同じクリティカルセクション）
    let now = shared.clock.now();
    let finished = shared.table().finish(&job_id, outcome, now);
    match finished {
        Ok(Some(update)) => {
            info!(worker = worker_id, job = %job_id, status = %update.status, "job finished");
            runtime.notify(&update);
        }
        Ok(None) => {
            debug!(worker = worker_id, job = %job_id, "job dropped while processing");
        }
        Err(e) => {
            error!(worker = worker_id, error = %e, "could not record job outcome");
        }
    }
}
