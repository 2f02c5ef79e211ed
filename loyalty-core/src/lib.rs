//! Loyalty Ledger Core
//!
//! Points, tiers and referral bookkeeping on top of wallet registration,
//! with Merkle inclusion proofs over submitted wallet lists.
//!
//! # Architecture
//!
//! - **Single Writer**: One actor task owns the user collection; every
//!   mutation is a message, so no two mutations interleave
//! - **Proof Engine**: Pure Merkle tree construction with canonical pairing
//! - **Collaborators**: Voting power, tier cache, mailer and audit sink
//!   behind traits
//!
//! # Invariants
//!
//! - No lost updates: mutations are totally ordered by mailbox arrival
//! - Referral credit and referred user creation commit together
//! - Failed operations never mutate
//! - Proofs are a pure function of the ordered input list and target

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    clippy::all
)]

pub mod types;
pub mod store;
pub mod ledger;
pub mod merkle;
pub mod external;
pub mod random;
pub mod error;
pub mod actor;
pub mod config;
pub mod metrics;

// Re-exports
pub use error::{Error, Result};
pub use types::{
    AuditEvent, AuditEventKind, LedgerOperation, NewUser, Registration, RewardEntry, Tier, User,
    UserId, WalletAddress,
};
pub use ledger::{Collaborators, Ledger, ProofOutcome};
pub use merkle::{build_proof, verify_proof, MerkleProof, MerkleTree, ProofStep, Side};
pub use config::Config;
