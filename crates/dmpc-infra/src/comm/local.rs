// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use dmpc_core::agent::AgentId;
use dmpc_core::comm::{CommunicationInterface, Envelope, RecordKind, StateRecord};
use dmpc_core::error::CommunicationError;

type RecordKey = (AgentId, u64, RecordKind);

/// Inbox of one agent.
///
/// Records arrive on the channel in any order. `receive` parks records it
/// was not asked for in `pending` until their turn comes. Rounds only move
/// forward, so records of earlier rounds are dropped once a later one is
/// asked for.
#[derive(Debug)]
struct Mailbox {
    sender: flume::Sender<Envelope>,
    receiver: flume::Receiver<Envelope>,
    pending: Mutex<HashMap<RecordKey, StateRecord>>,
}

impl Mailbox {
    fn new() -> Self {
        let (sender, receiver) = flume::unbounded();
        Self {
            sender,
            receiver,
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn take_pending(&self, key: &RecordKey) -> Option<StateRecord> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    /// Drops parked records of rounds before `round`.
    fn evict_before(&self, round: u64) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let before = pending.len();
        pending.retain(|&(_, parked, _), _| parked >= round);
        let evicted = before - pending.len();
        if evicted > 0 {
            log::debug!("Comm: dropped {evicted} stale records from rounds before {round}");
        }
    }

    fn park(&self, envelope: Envelope, round: u64) {
        if envelope.round < round {
            log::debug!(
                "Comm: agent {} dropped a stale {:?} from agent {} (round {} < {})",
                envelope.to,
                envelope.kind,
                envelope.from,
                envelope.round,
                round
            );
            return;
        }
        let key = (envelope.from, envelope.round, envelope.kind);
        let replaced = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, envelope.record);
        if replaced.is_some() {
            log::warn!(
                "Comm: agent {} received a duplicate {:?} from agent {} in round {}",
                envelope.to,
                envelope.kind,
                envelope.from,
                envelope.round
            );
        }
    }
}

/// Direct agent-to-agent delivery within one process.
///
/// Each registered agent owns a mailbox. `receive` for a given agent is
/// expected to be driven by one task at a time.
#[derive(Debug, Default)]
pub struct LocalCommunication {
    mailboxes: RwLock<HashMap<AgentId, Arc<Mailbox>>>,
}

impl LocalCommunication {
    /// Creates a transport without any mailboxes.
    pub fn new() -> Self {
        Self::default()
    }

    fn mailbox(&self, agent: AgentId) -> Option<Arc<Mailbox>> {
        self.mailboxes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&agent)
            .cloned()
    }

    /// Puts `envelope` into the receiver's mailbox without waiting.
    ///
    /// ## Errors
    /// [`CommunicationError::Disconnected`] if the receiver has no mailbox and
    /// [`CommunicationError::UnexpectedRecord`] if the payload does not fit
    /// the record kind.
    pub fn deliver(&self, envelope: Envelope) -> Result<(), CommunicationError> {
        if !envelope.record.matches(envelope.kind) {
            return Err(CommunicationError::UnexpectedRecord {
                to: envelope.to,
                from: envelope.from,
                kind: envelope.kind,
            });
        }
        let to = envelope.to;
        let mailbox = self.mailbox(to).ok_or(CommunicationError::Disconnected(to))?;
        log::trace!(
            "Comm: {:?} from agent {} to agent {} (round {})",
            envelope.kind,
            envelope.from,
            to,
            envelope.round
        );
        mailbox
            .sender
            .send(envelope)
            .map_err(|_| CommunicationError::Disconnected(to))
    }

    /// Number of records delivered to `agent` but not yet received.
    pub fn pending(&self, agent: AgentId) -> usize {
        self.mailbox(agent).map_or(0, |mailbox| {
            mailbox.receiver.len()
                + mailbox
                    .pending
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .len()
        })
    }

    /// Whether `agent` currently has a mailbox.
    pub fn is_registered(&self, agent: AgentId) -> bool {
        self.mailbox(agent).is_some()
    }
}

#[async_trait]
impl CommunicationInterface for LocalCommunication {
    fn register(&self, agent: AgentId) {
        let mut mailboxes = self.mailboxes.write().unwrap_or_else(PoisonError::into_inner);
        mailboxes.entry(agent).or_insert_with(|| {
            log::debug!("Comm: opened mailbox of agent {agent}");
            Arc::new(Mailbox::new())
        });
    }

    fn deregister(&self, agent: AgentId) {
        let removed = self
            .mailboxes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&agent);
        if removed.is_some() {
            log::debug!("Comm: closed mailbox of agent {agent}");
        }
    }

    async fn send(&self, envelope: Envelope) -> Result<(), CommunicationError> {
        self.deliver(envelope)
    }

    async fn receive(
        &self,
        to: AgentId,
        from: AgentId,
        round: u64,
        kind: RecordKind,
    ) -> Result<StateRecord, CommunicationError> {
        let mailbox = self.mailbox(to).ok_or(CommunicationError::Disconnected(to))?;
        let key = (from, round, kind);
        mailbox.evict_before(round);

        loop {
            if let Some(record) = mailbox.take_pending(&key) {
                return Ok(record);
            }
            let envelope = mailbox
                .receiver
                .recv_async()
                .await
                .map_err(|_| CommunicationError::Disconnected(to))?;
            if (envelope.from, envelope.round, envelope.kind) == key {
                return Ok(envelope.record);
            }
            mailbox.park(envelope, round);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::test_util::multiplier_envelope;
    use std::time::Duration;

    fn mu_u(record: StateRecord) -> f64 {
        match record {
            StateRecord::Multiplier(state) => state.mu_u[0],
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_receive_out_of_order() {
        let comm = LocalCommunication::new();
        comm.register(AgentId(1));

        comm.send(multiplier_envelope(0, 1, 1, 1.0)).await.unwrap();
        comm.send(multiplier_envelope(0, 1, 2, 3.0)).await.unwrap();
        comm.send(multiplier_envelope(2, 1, 1, 2.0)).await.unwrap();

        let kind = RecordKind::CoupledMultiplierState;
        assert_eq!(mu_u(comm.receive(AgentId(1), AgentId(2), 1, kind).await.unwrap()), 2.0);
        assert_eq!(comm.pending(AgentId(1)), 2);
        assert_eq!(mu_u(comm.receive(AgentId(1), AgentId(0), 1, kind).await.unwrap()), 1.0);
        assert_eq!(mu_u(comm.receive(AgentId(1), AgentId(0), 2, kind).await.unwrap()), 3.0);
        assert_eq!(comm.pending(AgentId(1)), 0);
    }

    #[tokio::test]
    async fn test_abandoned_rounds_are_evicted() {
        let comm = LocalCommunication::new();
        comm.register(AgentId(1));
        let kind = RecordKind::CoupledMultiplierState;

        // Round 1 is given up after only one of two records was received.
        comm.send(multiplier_envelope(0, 1, 1, 1.0)).await.unwrap();
        comm.send(multiplier_envelope(2, 1, 1, 2.0)).await.unwrap();
        assert_eq!(mu_u(comm.receive(AgentId(1), AgentId(2), 1, kind).await.unwrap()), 2.0);
        assert_eq!(comm.pending(AgentId(1)), 1);

        // A straggler from round 1 arrives while round 2 is being received.
        comm.send(multiplier_envelope(2, 1, 1, 5.0)).await.unwrap();
        comm.send(multiplier_envelope(0, 1, 2, 3.0)).await.unwrap();
        comm.send(multiplier_envelope(2, 1, 2, 4.0)).await.unwrap();
        assert_eq!(mu_u(comm.receive(AgentId(1), AgentId(2), 2, kind).await.unwrap()), 4.0);
        assert_eq!(comm.pending(AgentId(1)), 1);
        assert_eq!(mu_u(comm.receive(AgentId(1), AgentId(0), 2, kind).await.unwrap()), 3.0);
        assert_eq!(comm.pending(AgentId(1)), 0);
    }

    #[tokio::test]
    async fn test_send_to_unknown_agent_is_disconnected() {
        let comm = LocalCommunication::new();
        let err = comm.send(multiplier_envelope(0, 7, 1, 1.0)).await.unwrap_err();
        assert_eq!(err, CommunicationError::Disconnected(AgentId(7)));
    }

    #[tokio::test]
    async fn test_rejects_record_of_wrong_kind() {
        let comm = LocalCommunication::new();
        comm.register(AgentId(1));
        let mut envelope = multiplier_envelope(0, 1, 1, 1.0);
        envelope.kind = RecordKind::CouplingState;
        let err = comm.send(envelope).await.unwrap_err();
        assert!(matches!(err, CommunicationError::UnexpectedRecord { .. }));
    }

    #[tokio::test]
    async fn test_missing_record_waits_until_timeout() {
        let comm = LocalCommunication::new();
        comm.register(AgentId(1));
        let waited = tokio::time::timeout(
            Duration::from_millis(20),
            comm.receive(AgentId(1), AgentId(0), 1, RecordKind::CoupledMultiplierState),
        )
        .await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn test_deregister_drops_mailbox() {
        let comm = LocalCommunication::new();
        comm.register(AgentId(3));
        comm.send(multiplier_envelope(0, 3, 1, 1.0)).await.unwrap();
        comm.deregister(AgentId(3));
        assert!(!comm.is_registered(AgentId(3)));
        assert_eq!(comm.pending(AgentId(3)), 0);
    }
}
