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

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dmpc_core::agent::AgentId;
use dmpc_core::comm::{CommunicationInterface, Envelope, RecordKind, StateRecord};
use dmpc_core::error::CommunicationError;
use tokio::task::JoinHandle;

use super::LocalCommunication;

/// Star-topology transport: every record passes through a coordinator task
/// before it reaches the receiver's mailbox.
#[derive(Debug)]
pub struct CentralCommunication {
    inbox: flume::Sender<Envelope>,
    mailboxes: Arc<LocalCommunication>,
    relayed: Arc<AtomicU64>,
    coordinator: JoinHandle<()>,
}

impl CentralCommunication {
    /// Starts the coordinator on the current tokio runtime.
    ///
    /// # Panics
    /// When called outside a tokio runtime.
    pub fn spawn() -> Self {
        let (inbox, incoming) = flume::unbounded::<Envelope>();
        let mailboxes = Arc::new(LocalCommunication::new());
        let relayed = Arc::new(AtomicU64::new(0));

        let coordinator = {
            let mailboxes = Arc::clone(&mailboxes);
            let relayed = Arc::clone(&relayed);
            tokio::spawn(async move {
                while let Ok(envelope) = incoming.recv_async().await {
                    let (from, to, kind) = (envelope.from, envelope.to, envelope.kind);
                    match mailboxes.deliver(envelope) {
                        Ok(()) => {
                            relayed.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => log::warn!("Coordinator: dropped {kind:?} from agent {from} to agent {to}: {e}"),
                    }
                }
                log::debug!("Coordinator: inbox closed, shutting down");
            })
        };
        log::info!("Coordinator: started");

        Self {
            inbox,
            mailboxes,
            relayed,
            coordinator,
        }
    }

    /// Number of records the coordinator has forwarded so far.
    pub fn relayed(&self) -> u64 {
        self.relayed.load(Ordering::Relaxed)
    }
}

impl Drop for CentralCommunication {
    fn drop(&mut self) {
        self.coordinator.abort();
    }
}

#[async_trait]
impl CommunicationInterface for CentralCommunication {
    fn register(&self, agent: AgentId) {
        self.mailboxes.register(agent);
    }

    fn deregister(&self, agent: AgentId) {
        self.mailboxes.deregister(agent);
    }

    async fn send(&self, envelope: Envelope) -> Result<(), CommunicationError> {
        if !envelope.record.matches(envelope.kind) {
            return Err(CommunicationError::UnexpectedRecord {
                to: envelope.to,
                from: envelope.from,
                kind: envelope.kind,
            });
        }
        let to = envelope.to;
        if !self.mailboxes.is_registered(to) {
            return Err(CommunicationError::Disconnected(to));
        }
        self.inbox
            .send_async(envelope)
            .await
            .map_err(|_| CommunicationError::Disconnected(to))
    }

    async fn receive(
        &self,
        to: AgentId,
        from: AgentId,
        round: u64,
        kind: RecordKind,
    ) -> Result<StateRecord, CommunicationError> {
        self.mailboxes.receive(to, from, round, kind).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::test_util::multiplier_envelope;

    #[tokio::test]
    async fn test_records_are_relayed_through_coordinator() {
        let comm = CentralCommunication::spawn();
        comm.register(AgentId(0));
        comm.register(AgentId(1));

        comm.send(multiplier_envelope(0, 1, 4, 0.5)).await.unwrap();
        comm.send(multiplier_envelope(1, 0, 4, -0.5)).await.unwrap();

        let kind = RecordKind::CoupledMultiplierState;
        let at_one = comm.receive(AgentId(1), AgentId(0), 4, kind).await.unwrap();
        let at_zero = comm.receive(AgentId(0), AgentId(1), 4, kind).await.unwrap();
        assert!(matches!(at_one, StateRecord::Multiplier(ref s) if s.mu_u[0] == 0.5));
        assert!(matches!(at_zero, StateRecord::Multiplier(ref s) if s.mu_u[0] == -0.5));
        assert_eq!(comm.relayed(), 2);
    }

    #[tokio::test]
    async fn test_unregistered_receiver_is_rejected() {
        let comm = CentralCommunication::spawn();
        let err = comm.send(multiplier_envelope(0, 9, 1, 0.0)).await.unwrap_err();
        assert_eq!(err, CommunicationError::Disconnected(AgentId(9)));
        assert_eq!(comm.relayed(), 0);
    }
}
