pub mod couriers;
pub mod exposures;
pub mod jobs;

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::courier::Courier;
use crate::models::exposure::Exposure;
use crate::models::job::Job;
use crate::models::message::{Message, MessageSender};
use crate::models::requester::Requester;

/// In-memory storage behind the dispatch core. Injected as part of the shared
/// application state; opened once at startup and dropped at shutdown.
///
/// Concurrency rules:
/// - every guarded multi-entity transition runs under the commit lock, so its
///   read-check-write sequence is one atomic step relative to other writers;
/// - no method holds a map guard while touching a second map — lookups clone
///   out of the maps first, then act.
pub struct Store {
    pub(crate) couriers: DashMap<Uuid, Courier>,
    pub(crate) requesters: DashMap<Uuid, Requester>,
    pub(crate) jobs: DashMap<Uuid, Job>,
    pub(crate) exposures: DashMap<(Uuid, Uuid), Exposure>,
    pub(crate) messages: DashMap<Uuid, Vec<Message>>,
    commit: Mutex<()>,
}

impl Store {
    pub fn open() -> Self {
        Self {
            couriers: DashMap::new(),
            requesters: DashMap::new(),
            jobs: DashMap::new(),
            exposures: DashMap::new(),
            messages: DashMap::new(),
            commit: Mutex::new(()),
        }
    }

    pub(crate) fn commit_lock(&self) -> MutexGuard<'_, ()> {
        // A poisoned lock only means another writer panicked mid-transition;
        // the plain () guard carries no state to repair.
        self.commit.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_requester(&self, requester: Requester) {
        self.requesters.insert(requester.id, requester);
    }

    pub fn requester(&self, id: Uuid) -> Result<Requester, AppError> {
        self.requesters
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("requester {id} not found")))
    }

    pub fn append_message(
        &self,
        job_id: Uuid,
        sender: MessageSender,
        text: String,
    ) -> Result<Message, AppError> {
        if !self.jobs.contains_key(&job_id) {
            return Err(AppError::NotFound(format!("job {job_id} not found")));
        }

        let message = Message {
            id: Uuid::new_v4(),
            job_id,
            sender,
            text,
            sent_at: Utc::now(),
        };

        self.messages
            .entry(job_id)
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    pub fn job_messages(&self, job_id: Uuid) -> Result<Vec<Message>, AppError> {
        if !self.jobs.contains_key(&job_id) {
            return Err(AppError::NotFound(format!("job {job_id} not found")));
        }

        Ok(self
            .messages
            .get(&job_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::Store;
    use crate::models::message::MessageSender;
    use crate::testing::seed_pending_job;

    #[test]
    fn messages_require_an_existing_job() {
        let store = Store::open();
        let missing = Uuid::new_v4();

        assert!(store
            .append_message(missing, MessageSender::Requester, "oi".to_string())
            .is_err());
        assert!(store.job_messages(missing).is_err());
    }

    #[test]
    fn messages_are_kept_in_send_order() {
        let store = Store::open();
        let job_id = seed_pending_job(&store, "delivery", 20.0);

        store
            .append_message(job_id, MessageSender::Requester, "chegou?".to_string())
            .unwrap();
        store
            .append_message(job_id, MessageSender::Courier, "2 min".to_string())
            .unwrap();

        let log = store.job_messages(job_id).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].text, "chegou?");
        assert_eq!(log[1].sender, MessageSender::Courier);
    }
}
