//! Remote writes run on the IO task pool so the frame never waits on the
//! network. Each slot has at most one write in flight; saves issued while
//! one is running wait in a single pending entry, and a newer save replaces
//! an older pending one.

use std::collections::HashMap;

use bevy::prelude::*;
use bevy::tasks::{block_on, IoTaskPool, Task};
use serde_json::Value;

use super::remote::RemoteBackend;
use super::store::StoreError;
use crate::auth::Identity;

/// A finished remote write.
#[derive(Debug)]
pub struct RemoteWriteResult {
    pub slot: u8,
    pub result: Result<(), StoreError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submitted {
    /// Started right away.
    Started,
    /// Waiting behind an in-flight write to the same slot.
    Queued,
    /// Replaced a write that was still waiting.
    Superseded,
}

struct PendingWrite {
    doc: Value,
    identity: Identity,
}

struct InFlightWrite {
    task: Task<Result<(), StoreError>>,
    doc: Value,
    user_id: String,
}

#[derive(Default)]
pub struct RemoteWriteQueue {
    in_flight: HashMap<u8, InFlightWrite>,
    pending: HashMap<u8, PendingWrite>,
}

fn spawn_write(backend: &RemoteBackend, slot: u8, doc: Value, identity: Identity) -> InFlightWrite {
    let backend = backend.clone();
    let sent = doc.clone();
    let user_id = identity.id.clone();
    let task = IoTaskPool::get().spawn(async move { backend.write(slot, &sent, Some(&identity)) });
    InFlightWrite { task, doc, user_id }
}

impl RemoteWriteQueue {
    pub fn submit(&mut self, backend: &RemoteBackend, slot: u8, doc: Value, identity: Identity) -> Submitted {
        if !self.in_flight.contains_key(&slot) {
            self.in_flight
                .insert(slot, spawn_write(backend, slot, doc, identity));
            return Submitted::Started;
        }
        match self.pending.insert(slot, PendingWrite { doc, identity }) {
            Some(_) => {
                debug!("Remote save for slot {slot} replaced an older waiting save");
                Submitted::Superseded
            }
            None => Submitted::Queued,
        }
    }

    /// Collects finished writes and starts the waiting write of each slot
    /// that just freed up.
    pub fn poll(&mut self, backend: &RemoteBackend) -> Vec<RemoteWriteResult> {
        let mut finished = Vec::new();
        for (&slot, write) in self.in_flight.iter_mut() {
            if let Some(result) = block_on(futures_lite::future::poll_once(&mut write.task)) {
                finished.push(RemoteWriteResult { slot, result });
            }
        }

        for done in &finished {
            self.in_flight.remove(&done.slot);
            if let Some(next) = self.pending.remove(&done.slot) {
                self.in_flight
                    .insert(done.slot, spawn_write(backend, done.slot, next.doc, next.identity));
            }
        }
        finished
    }

    pub fn is_busy(&self, slot: u8) -> bool {
        self.in_flight.contains_key(&slot)
    }

    /// The newest document queued for `slot` of `user_id` that the store
    /// may not have yet.
    pub fn latest_document(&self, slot: u8, user_id: &str) -> Option<&Value> {
        let pending = self
            .pending
            .get(&slot)
            .filter(|write| write.identity.id == user_id)
            .map(|write| &write.doc);
        pending.or_else(|| {
            self.in_flight
                .get(&slot)
                .filter(|write| write.user_id == user_id)
                .map(|write| &write.doc)
        })
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty() && self.pending.is_empty()
    }
}
