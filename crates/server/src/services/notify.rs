// Outbound "task assigned" notifications.
// Producers never wait on delivery: a full or closed queue drops the event
// with a warning instead of failing the mutation that raised it.

use tokio::{sync::mpsc, task::JoinHandle};

use crate::db::{lookup, models::Id, Database};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskAssigned {
    pub task_id: Id,
    pub assignee_id: Id,
}

#[derive(Clone)]
pub struct Notifier {
    tx: Option<mpsc::Sender<TaskAssigned>>,
}

impl Notifier {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<TaskAssigned>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx: Some(tx) }, rx)
    }

    /// A notifier with no queue behind it; every event is dropped.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn task_assigned(&self, task_id: Id, assignee_id: Id) {
        let Some(tx) = &self.tx else {
            tracing::debug!(task_id, assignee_id, "notifications disabled, dropping event");
            return;
        };

        let event = TaskAssigned {
            task_id,
            assignee_id,
        };
        if let Err(e) = tx.try_send(event) {
            tracing::warn!(task_id, assignee_id, error = %e, "could not enqueue assignment notification");
        }
    }
}

/// Drains the queue until every sender is gone.
pub fn spawn_worker(db: Database, mut rx: mpsc::Receiver<TaskAssigned>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            deliver(&db, event).await;
        }
        tracing::debug!("notification worker stopped");
    })
}

async fn deliver(db: &Database, event: TaskAssigned) {
    match lookup::find_task(&db.pool, event.task_id).await {
        Ok(Some(task)) => {
            tracing::info!(
                task_id = event.task_id,
                assignee_id = event.assignee_id,
                title = %task.title,
                "task assigned"
            );
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(task_id = event.task_id, error = %e, "failed to load task for notification");
        }
    }
}
