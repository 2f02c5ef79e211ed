//! Core types for the loyalty ledger
//!
//! All types are designed for:
//! - Exact arithmetic (Decimal for balances, integers for points)
//! - Serde round-trips across the service boundary
//! - Cheap cloning of user snapshots out of the actor

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque user identifier, generated at registration and never changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    /// Generate a fresh identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Wallet address as supplied by the caller.
///
/// The core treats it as an opaque string; checksum validation is the
/// caller's job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletAddress(String);

impl WalletAddress {
    /// Create new wallet address
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Raw bytes hashed into a Merkle leaf
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for WalletAddress {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Loyalty tier, ordered from lowest to highest
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Entry tier assigned at registration
    #[default]
    Bronze,
    /// Second tier
    Silver,
    /// Top tier
    Gold,
}

impl Tier {
    /// Lowercase name, as mirrored into the tier cache
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Bronze => "bronze",
            Tier::Silver => "silver",
            Tier::Gold => "gold",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "bronze" => Some(Tier::Bronze),
            "silver" => Some(Tier::Silver),
            "gold" => Some(Tier::Gold),
            _ => None,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Registered user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Immutable identifier
    pub id: UserId,

    /// Display name
    pub name: String,

    /// Email, unique across all users
    pub email: String,

    /// Wallet address
    pub wallet: WalletAddress,

    /// Monetary balance (never negative)
    pub balance: Decimal,

    /// Loyalty points
    pub points: u64,

    /// Referral code handed out to other users
    pub referral_code: String,

    /// Current tier
    pub tier: Tier,

    /// Voting power snapshot taken at registration, never re-synced
    pub voting_power: String,

    /// Registration timestamp
    pub created_at: DateTime<Utc>,
}

/// Validated registration input
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Display name
    pub name: String,
    /// Email
    pub email: String,
    /// Wallet address
    pub wallet: WalletAddress,
    /// Optional referral code of an existing user
    pub referral_code: Option<String>,
}

/// Result of a registration
#[derive(Debug, Clone)]
pub struct Registration {
    /// Newly created user
    pub user: User,
    /// Referrer credited with the bonus, if the code resolved
    pub referrer: Option<User>,
}

/// Mutation applied through the ledger updater
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerOperation {
    /// balance += amount, points += per-unit points × amount
    Deposit {
        /// Deposited amount, must be positive
        amount: Decimal,
    },

    /// One-time registration bonus, with referrer credit when the code resolves
    RegisterBonus {
        /// Referral code supplied at registration
        referral_code: Option<String>,
    },

    /// points = base + random component.
    ///
    /// Overwrites the running total instead of adding to it. This is a
    /// suspected defect, reproduced on purpose until product decides
    /// whether the bonus should accumulate.
    ProofBonus {
        /// Random component in the configured range
        random_component: u64,
    },
}

impl LedgerOperation {
    /// Audit kind for this operation
    pub fn kind(&self) -> AuditEventKind {
        match self {
            LedgerOperation::Deposit { .. } => AuditEventKind::Deposit,
            LedgerOperation::RegisterBonus { .. } => AuditEventKind::RegisterBonus,
            LedgerOperation::ProofBonus { .. } => AuditEventKind::ProofBonus,
        }
    }
}

/// Kind of audited mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    /// User created
    Registered,
    /// Registration bonus awarded
    RegisterBonus,
    /// Referrer balance credited
    ReferralCredit,
    /// Deposit applied
    Deposit,
    /// Proof bonus applied
    ProofBonus,
}

/// Structured audit record emitted for every committed mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// What happened
    pub event_kind: AuditEventKind,
    /// Affected user
    pub user_id: UserId,
    /// When it was committed
    pub timestamp: DateTime<Utc>,
    /// Balance after the mutation
    pub balance: Decimal,
    /// Points after the mutation
    pub points: u64,
    /// Amount involved, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
    /// Free-form detail (referred user id, random component, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AuditEvent {
    /// Snapshot a user after a mutation
    pub fn for_user(event_kind: AuditEventKind, user: &User) -> Self {
        Self {
            event_kind,
            user_id: user.id,
            timestamp: Utc::now(),
            balance: user.balance,
            points: user.points,
            amount: None,
            detail: None,
        }
    }

    /// Attach the amount involved
    pub fn with_amount(mut self, amount: Decimal) -> Self {
        self.amount = Some(amount);
        self
    }

    /// Attach a detail string
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Reward catalog entry (seed data, read-only)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardEntry {
    /// Catalog id
    pub id: String,
    /// Display name
    pub name: String,
    /// Point cost
    pub points: u64,
    /// Remaining stock
    pub stock: u32,
    /// Minimum tier required
    pub tier_required: Tier,
}

impl RewardEntry {
    /// Whether a user of `tier` may redeem this entry
    pub fn available_to(&self, tier: Tier) -> bool {
        tier >= self.tier_required && self.stock > 0
    }
}
