//! Concurrent update dispatch
//!
//! Each user gets a worker task fed by its own channel: one user's updates
//! are handled in arrival order while different users proceed in parallel.

use super::{Bot, ContentStore, Transport};
use crate::db::UserId;
use crate::transport::Update;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

const QUEUE_CAPACITY: usize = 32;

pub struct Dispatcher<S, T> {
    bot: Arc<Bot<S, T>>,
    queues: HashMap<UserId, mpsc::Sender<Update>>,
    workers: JoinSet<()>,
}

impl<S, T> Dispatcher<S, T>
where
    S: ContentStore + 'static,
    T: Transport + 'static,
{
    pub fn new(bot: Arc<Bot<S, T>>) -> Self {
        Self {
            bot,
            queues: HashMap::new(),
            workers: JoinSet::new(),
        }
    }

    /// Queue an update behind the user's earlier ones
    pub async fn dispatch(&mut self, update: Update) {
        let user = update.user;
        let queue = match self.queues.get(&user) {
            Some(tx) if !tx.is_closed() => tx.clone(),
            _ => self.spawn_worker(user),
        };
        if let Err(e) = queue.send(update).await {
            tracing::warn!(user_id = user, error = %e, "User worker gone, dropping update");
        }
    }

    fn spawn_worker(&mut self, user: UserId) -> mpsc::Sender<Update> {
        let (tx, mut rx) = mpsc::channel::<Update>(QUEUE_CAPACITY);
        let bot = Arc::clone(&self.bot);
        self.workers.spawn(async move {
            while let Some(update) = rx.recv().await {
                bot.handle(update).await;
            }
        });
        tracing::debug!(user_id = user, "Started user worker");
        self.queues.insert(user, tx.clone());
        tx
    }

    /// Close every queue and wait for the queued updates to be handled
    pub async fn shutdown(mut self) {
        self.queues.clear();
        while let Some(result) = self.workers.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "User worker failed");
            }
        }
    }
}
