use loyalty_core::{
    merkle::to_hex, MerkleProof, ProofStep, Registration, RewardEntry, Tier, User, UserId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// User registration request
#[derive(Debug, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub wallet: String,
    pub referral_code: Option<String>,
}

/// Deposit request
#[derive(Debug, Deserialize, Serialize)]
pub struct DepositRequest {
    pub amount: Decimal,
}

/// Proof request: the wallet set to build the tree from
#[derive(Debug, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProofRequest {
    #[validate(length(min = 1))]
    pub wallet_list: Vec<String>,
}

/// Stateless proof check
#[derive(Debug, Deserialize, Serialize)]
pub struct VerifyProofRequest {
    pub proof: Vec<ProofStep>,
    /// Leaf hash, 0x-prefixed hex
    pub leaf: String,
    /// Expected root, 0x-prefixed hex
    pub root: String,
}

#[derive(Debug, Deserialize)]
pub struct RewardsQuery {
    pub tier: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub id: UserId,
    pub name: String,
    pub wallet: String,
    pub balance: Decimal,
    pub points: u64,
    pub tier: Tier,
    pub referral_code: String,
    pub voting_power: String,
}

impl From<Registration> for RegisterResponse {
    fn from(registration: Registration) -> Self {
        let user = registration.user;
        Self {
            id: user.id,
            name: user.name,
            wallet: user.wallet.as_str().to_string(),
            balance: user.balance,
            points: user.points,
            tier: user.tier,
            referral_code: user.referral_code,
            voting_power: user.voting_power,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DepositResponse {
    pub id: UserId,
    pub balance: Decimal,
    pub points: u64,
}

impl From<User> for DepositResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            balance: user.balance,
            points: user.points,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofResponse {
    pub proof: Vec<ProofStep>,
    pub root: String,
    pub leaf: String,
    pub leaf_index: usize,
    pub points: u64,
}

impl ProofResponse {
    pub fn new(proof: MerkleProof, points: u64) -> Self {
        Self {
            root: to_hex(&proof.root),
            leaf: to_hex(&proof.leaf),
            leaf_index: proof.leaf_index,
            proof: proof.steps,
            points,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VerifyProofResponse {
    pub valid: bool,
}

/// Public view of a user; the email is never echoed back
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: UserId,
    pub name: String,
    pub wallet: String,
    pub balance: Decimal,
    pub points: u64,
    pub tier: Tier,
    pub referral_code: String,
    pub voting_power: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            wallet: user.wallet.as_str().to_string(),
            balance: user.balance,
            points: user.points,
            tier: user.tier,
            referral_code: user.referral_code,
            voting_power: user.voting_power,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReferralsResponse {
    pub id: UserId,
    pub direct: Vec<UserId>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct RewardsResponse {
    pub tier: Option<Tier>,
    pub rewards: Vec<RewardEntry>,
}
