//! Subscription registry: admits subscribers against the shared token and
//! owns the broadcast group.
//!
//! Membership is an explicit map from connection id to that connection's
//! outbound queue. The map is the only shared mutable structure in the
//! service; all mutation goes through this type and the lock is never held
//! across an await point. A group send snapshots the membership first, so
//! joins and leaves that race with a tick never cause partial delivery to
//! stale recipients.

use crate::state::{new_state, Shared};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;
use uuid::Uuid;

/// Wire envelope for every server-to-client event.
#[derive(Debug, Serialize)]
struct Event<'a, T: Serialize> {
    event: &'a str,
    data: T,
}

/// Serialize an event payload into its wire form.
pub fn envelope<T: Serialize>(event: &str, data: &T) -> serde_json::Result<String> {
    serde_json::to_string(&Event { event, data })
}

#[derive(Clone)]
pub struct Registry {
    token: Arc<str>,
    members: Shared<HashMap<Uuid, UnboundedSender<String>>>,
}

impl Registry {
    pub fn new(token: String) -> Self {
        Self {
            token: token.into(),
            members: new_state(HashMap::new()),
        }
    }

    /// Exact comparison against the stored token. No trimming: a presented
    /// value with trailing whitespace is a different value.
    pub fn authenticate(&self, presented: &str) -> bool {
        presented == &*self.token
    }

    /// Add an admitted connection to the broadcast group.
    pub fn admit(&self, id: Uuid, sender: UnboundedSender<String>) {
        self.members.lock().insert(id, sender);
    }

    /// Remove a connection from the broadcast group. Safe to call for ids
    /// that were never admitted.
    pub fn remove(&self, id: Uuid) {
        self.members.lock().remove(&id);
    }

    pub fn member_count(&self) -> usize {
        self.members.lock().len()
    }

    /// Send one payload to every current member as a single group-send.
    ///
    /// The member list is snapshotted under the lock, then the sends happen
    /// outside it. Members whose queue has gone away (task already exited)
    /// are pruned. Returns the number of members that accepted the payload.
    pub fn broadcast(&self, payload: &str) -> usize {
        let snapshot: Vec<(Uuid, UnboundedSender<String>)> = self
            .members
            .lock()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (id, tx) in snapshot {
            if tx.send(payload.to_owned()).is_ok() {
                delivered += 1;
            } else {
                dead.push(id);
            }
        }

        if !dead.is_empty() {
            let mut members = self.members.lock();
            for id in &dead {
                members.remove(id);
            }
            debug!("pruned {} dead subscribers", dead.len());
        }

        delivered
    }
}
