//! Actor-based concurrency for the loyalty ledger
//!
//! This module implements the single-writer pattern using Tokio actors:
//! - One task owns the [`UserStore`]; nothing else can touch it
//! - Requests are totally ordered by their arrival in the mailbox
//! - Each message runs to completion before the next one is taken
//! - Async message passing with backpressure
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │              HTTP handlers (many workers)             │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │               LedgerHandle (Clone)                    │
//! │         Sends messages to actor mailbox              │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              LedgerActor (Single Task)                │
//! │   UserStore::register / UserStore::apply             │
//! │                       │                               │
//! │                       ▼                               │
//! │              AuditSink::record()                      │
//! └───────────────────────────────────────────────────────┘
//! ```

use crate::external::AuditSink;
use crate::store::{Applied, UserStore};
use crate::types::{LedgerOperation, NewUser, Registration, User, UserId};
use crate::{Error, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Message sent to the ledger actor
pub enum LedgerMessage {
    /// Create a user and apply the registration bonus
    Register {
        new_user: NewUser,
        voting_power: String,
        response: oneshot::Sender<Result<Registration>>,
    },

    /// Apply a ledger operation
    ApplyDelta {
        user_id: UserId,
        operation: LedgerOperation,
        response: oneshot::Sender<Result<Applied>>,
    },

    /// Get user by ID
    GetUser {
        user_id: UserId,
        response: oneshot::Sender<Result<User>>,
    },

    /// Get user by email
    FindByEmail {
        email: String,
        response: oneshot::Sender<Result<Option<User>>>,
    },

    /// Get direct referrals of a user
    Referrals {
        user_id: UserId,
        response: oneshot::Sender<Result<Vec<UserId>>>,
    },

    /// Count registered users
    UserCount {
        response: oneshot::Sender<Result<usize>>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that processes ledger messages
pub struct LedgerActor {
    /// The user collection, owned exclusively by this task
    store: UserStore,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<LedgerMessage>,

    /// Audit consumer
    audit: Arc<dyn AuditSink>,
}

impl LedgerActor {
    /// Create new actor
    pub fn new(
        store: UserStore,
        mailbox: mpsc::Receiver<LedgerMessage>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            store,
            mailbox,
            audit,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            if let LedgerMessage::Shutdown = msg {
                tracing::info!(users = self.store.len(), "Ledger actor shutting down");
                break;
            }
            self.handle_message(msg);
        }
    }

    /// Handle a single message.
    ///
    /// Synchronous on purpose: no await point can split a mutation.
    fn handle_message(&mut self, msg: LedgerMessage) {
        match msg {
            LedgerMessage::Register {
                new_user,
                voting_power,
                response,
            } => {
                let result = self
                    .store
                    .register(new_user, voting_power)
                    .map(|(registration, events)| {
                        events.iter().for_each(|e| self.audit.record(e));
                        registration
                    });
                if let Err(e) = &result {
                    tracing::debug!("Registration rejected: {}", e);
                }
                let _ = response.send(result);
            }

            LedgerMessage::ApplyDelta {
                user_id,
                operation,
                response,
            } => {
                let result = self.store.apply(user_id, operation).map(|applied| {
                    applied.events.iter().for_each(|e| self.audit.record(e));
                    applied
                });
                let _ = response.send(result);
            }

            LedgerMessage::GetUser { user_id, response } => {
                let _ = response.send(self.store.get(user_id));
            }

            LedgerMessage::FindByEmail { email, response } => {
                let _ = response.send(Ok(self.store.find_by_email(&email)));
            }

            LedgerMessage::Referrals { user_id, response } => {
                let _ = response.send(self.store.referrals(user_id));
            }

            LedgerMessage::UserCount { response } => {
                let _ = response.send(Ok(self.store.len()));
            }

            LedgerMessage::Shutdown => {
                // Handled in main loop
            }
        }
    }
}

/// Handle for sending messages to the actor
#[derive(Clone)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> LedgerMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Register a user
    pub async fn register(&self, new_user: NewUser, voting_power: String) -> Result<Registration> {
        self.call(|response| LedgerMessage::Register {
            new_user,
            voting_power,
            response,
        })
        .await
    }

    /// Apply a ledger operation
    pub async fn apply_delta(&self, user_id: UserId, operation: LedgerOperation) -> Result<Applied> {
        self.call(|response| LedgerMessage::ApplyDelta {
            user_id,
            operation,
            response,
        })
        .await
    }

    /// Get user by ID
    pub async fn get_user(&self, user_id: UserId) -> Result<User> {
        self.call(|response| LedgerMessage::GetUser { user_id, response })
            .await
    }

    /// Get user by email
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = email.to_string();
        self.call(|response| LedgerMessage::FindByEmail { email, response })
            .await
    }

    /// Get direct referrals
    pub async fn referrals(&self, user_id: UserId) -> Result<Vec<UserId>> {
        self.call(|response| LedgerMessage::Referrals { user_id, response })
            .await
    }

    /// Count registered users
    pub async fn user_count(&self) -> Result<usize> {
        self.call(|response| LedgerMessage::UserCount { response })
            .await
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(LedgerMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the ledger actor
pub fn spawn_ledger_actor(
    store: UserStore,
    audit: Arc<dyn AuditSink>,
    mailbox_capacity: usize,
) -> LedgerHandle {
    let (tx, rx) = mpsc::channel(mailbox_capacity); // Bounded channel for backpressure
    let actor = LedgerActor::new(store, rx, audit);

    tokio::spawn(async move {
        actor.run().await;
    });

    LedgerHandle::new(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RewardsConfig;
    use crate::external::MemoryAuditSink;
    use crate::types::{AuditEventKind, Tier, WalletAddress};
    use rust_decimal_macros::dec;

    fn spawn() -> (LedgerHandle, Arc<MemoryAuditSink>) {
        let audit = Arc::new(MemoryAuditSink::new());
        let store = UserStore::new(RewardsConfig::default(), Tier::Bronze);
        (spawn_ledger_actor(store, audit.clone(), 16), audit)
    }

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Grace".to_string(),
            email: email.to_string(),
            wallet: WalletAddress::new("0xB"),
            referral_code: None,
        }
    }

    #[tokio::test]
    async fn test_actor_spawn_and_shutdown() {
        let (handle, _) = spawn();
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_register_and_get() {
        let (handle, audit) = spawn();

        let reg = handle.register(new_user("g@example.com"), "3.0".into()).await.unwrap();
        let fetched = handle.get_user(reg.user.id).await.unwrap();
        assert_eq!(fetched, reg.user);
        assert_eq!(handle.user_count().await.unwrap(), 1);

        let kinds: Vec<_> = audit.events().iter().map(|e| e.event_kind).collect();
        assert_eq!(kinds, vec![AuditEventKind::Registered, AuditEventKind::RegisterBonus]);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_failed_delta_not_audited() {
        let (handle, audit) = spawn();
        let reg = handle.register(new_user("g@example.com"), "0".into()).await.unwrap();

        let result = handle
            .apply_delta(reg.user.id, LedgerOperation::Deposit { amount: dec!(-1) })
            .await;
        assert!(matches!(result, Err(Error::InvalidAmount(_))));
        assert_eq!(audit.events().len(), 2);

        // Actor keeps serving after an error
        let applied = handle
            .apply_delta(reg.user.id, LedgerOperation::Deposit { amount: dec!(1) })
            .await
            .unwrap();
        assert_eq!(applied.user.balance, dec!(1));
    }

    #[tokio::test]
    async fn test_handle_after_shutdown() {
        let (handle, _) = spawn();
        handle.shutdown().await.unwrap();
        // Give the actor a chance to drop its receiver
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let result = handle.user_count().await;
        assert!(matches!(result, Err(Error::Concurrency(_))));
    }
}
