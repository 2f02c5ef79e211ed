//! In-memory user collection
//!
//! The store itself does no locking. It is owned by the ledger actor, and
//! every method that takes `&mut self` runs as one uninterrupted step of
//! the actor loop. That is the single mutual-exclusion guard for the whole
//! collection, so a registration that also credits a referrer is
//! observed as one unit.

use crate::config::RewardsConfig;
use crate::types::{
    AuditEvent, AuditEventKind, LedgerOperation, NewUser, Registration, Tier, User, UserId,
};
use crate::{Error, Result};
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

const REFERRAL_CODE_LEN: usize = 8;

/// Outcome of one committed mutation
#[derive(Debug, Clone)]
pub struct Applied {
    /// Target user after the mutation
    pub user: User,
    /// Referrer after being credited, when a referral code resolved
    pub referrer: Option<User>,
    /// Audit events, in commit order
    pub events: Vec<AuditEvent>,
}

/// User collection with its secondary indexes and referral edges
#[derive(Debug)]
pub struct UserStore {
    users: HashMap<UserId, User>,
    by_email: HashMap<String, UserId>,
    by_referral_code: HashMap<String, UserId>,
    /// referrer -> directly referred users, in registration order
    referrals: HashMap<UserId, Vec<UserId>>,
    bonus_awarded: HashSet<UserId>,
    rewards: RewardsConfig,
    default_tier: Tier,
}

impl UserStore {
    /// Create an empty store
    pub fn new(rewards: RewardsConfig, default_tier: Tier) -> Self {
        Self {
            users: HashMap::new(),
            by_email: HashMap::new(),
            by_referral_code: HashMap::new(),
            referrals: HashMap::new(),
            bonus_awarded: HashSet::new(),
            rewards,
            default_tier,
        }
    }

    /// Number of users
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether no user is registered
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Look up a user
    pub fn get(&self, user_id: UserId) -> Result<User> {
        self.users
            .get(&user_id)
            .cloned()
            .ok_or_else(|| Error::UserNotFound(user_id.to_string()))
    }

    /// Look up a user by email (case-insensitive)
    pub fn find_by_email(&self, email: &str) -> Option<User> {
        self.by_email
            .get(&email_key(email))
            .and_then(|id| self.users.get(id))
            .cloned()
    }

    /// Users directly referred by `user_id`
    pub fn referrals(&self, user_id: UserId) -> Result<Vec<UserId>> {
        if !self.users.contains_key(&user_id) {
            return Err(Error::UserNotFound(user_id.to_string()));
        }
        Ok(self.referrals.get(&user_id).cloned().unwrap_or_default())
    }

    /// Create a user and award the registration bonus in one step
    pub fn register(&mut self, new_user: NewUser, voting_power: String) -> Result<(Registration, Vec<AuditEvent>)> {
        let key = email_key(&new_user.email);
        if self.by_email.contains_key(&key) {
            return Err(Error::Conflict(format!(
                "Email already registered: {}",
                new_user.email
            )));
        }

        let user = User {
            id: self.fresh_user_id(),
            name: new_user.name,
            email: new_user.email,
            wallet: new_user.wallet,
            balance: Decimal::ZERO,
            points: 0,
            referral_code: self.fresh_referral_code(),
            tier: self.default_tier,
            voting_power,
            created_at: Utc::now(),
        };
        let user_id = user.id;

        self.by_email.insert(key, user_id);
        self.by_referral_code.insert(user.referral_code.clone(), user_id);
        let mut events = vec![AuditEvent::for_user(AuditEventKind::Registered, &user)];
        self.users.insert(user_id, user);

        let applied = self.apply(
            user_id,
            LedgerOperation::RegisterBonus {
                referral_code: new_user.referral_code,
            },
        )?;
        events.extend(applied.events);

        Ok((
            Registration {
                user: applied.user,
                referrer: applied.referrer,
            },
            events,
        ))
    }

    /// Apply one ledger operation to an existing user.
    ///
    /// All checks happen before the first write, so a failed operation
    /// leaves the store untouched.
    pub fn apply(&mut self, user_id: UserId, operation: LedgerOperation) -> Result<Applied> {
        if !self.users.contains_key(&user_id) {
            return Err(Error::UserNotFound(user_id.to_string()));
        }

        match operation {
            LedgerOperation::Deposit { amount } => self.deposit(user_id, amount),
            LedgerOperation::RegisterBonus { referral_code } => {
                self.register_bonus(user_id, referral_code.as_deref())
            }
            LedgerOperation::ProofBonus { random_component } => {
                self.proof_bonus(user_id, random_component)
            }
        }
    }

    fn deposit(&mut self, user_id: UserId, amount: Decimal) -> Result<Applied> {
        if amount <= Decimal::ZERO {
            return Err(Error::InvalidAmount(format!(
                "Deposit amount must be positive, got {}",
                amount
            )));
        }

        let earned = Decimal::from(self.rewards.deposit_points_per_unit)
            .checked_mul(amount)
            .and_then(|p| p.trunc().to_u64())
            .ok_or_else(|| Error::InvalidAmount(format!("Deposit amount too large: {}", amount)))?;

        let user = self.user_mut(user_id)?;
        let balance = user
            .balance
            .checked_add(amount)
            .ok_or_else(|| Error::InvalidAmount(format!("Balance overflow on {}", amount)))?;
        let points = user
            .points
            .checked_add(earned)
            .ok_or_else(|| Error::InvalidAmount("Points overflow".to_string()))?;

        user.balance = balance;
        user.points = points;

        let user = user.clone();
        let event = AuditEvent::for_user(AuditEventKind::Deposit, &user).with_amount(amount);
        Ok(Applied {
            user,
            referrer: None,
            events: vec![event],
        })
    }

    fn register_bonus(&mut self, user_id: UserId, referral_code: Option<&str>) -> Result<Applied> {
        if self.bonus_awarded.contains(&user_id) {
            return Err(Error::Conflict(format!(
                "Registration bonus already awarded to {}",
                user_id
            )));
        }

        // Unknown codes and self-referrals are ignored, not rejected
        let referrer_id = referral_code
            .and_then(|code| self.by_referral_code.get(code).copied())
            .filter(|id| *id != user_id);

        let register_points = self.rewards.register_points;
        let referral_bonus = self.rewards.referral_bonus;

        let user = self.user_mut(user_id)?;
        user.points = user.points.saturating_add(register_points);
        let user = user.clone();
        self.bonus_awarded.insert(user_id);

        let mut events = vec![
            AuditEvent::for_user(AuditEventKind::RegisterBonus, &user)
                .with_amount(Decimal::from(register_points)),
        ];

        let referrer = match referrer_id {
            Some(referrer_id) => {
                let referrer = self.user_mut(referrer_id)?;
                referrer.balance += referral_bonus;
                let referrer = referrer.clone();
                self.referrals.entry(referrer_id).or_default().push(user_id);

                events.push(
                    AuditEvent::for_user(AuditEventKind::ReferralCredit, &referrer)
                        .with_amount(referral_bonus)
                        .with_detail(format!("referred={}", user_id)),
                );
                Some(referrer)
            }
            None => None,
        };

        Ok(Applied {
            user,
            referrer,
            events,
        })
    }

    fn proof_bonus(&mut self, user_id: UserId, random_component: u64) -> Result<Applied> {
        let (min, max) = (self.rewards.proof_random_min, self.rewards.proof_random_max);
        if !(min..=max).contains(&random_component) {
            return Err(Error::InvalidAmount(format!(
                "Random component {} outside [{}, {}]",
                random_component, min, max
            )));
        }

        let base = self.rewards.proof_base_points;
        let user = self.user_mut(user_id)?;
        // Suspected defect reproduced on purpose: the bonus replaces the
        // running total instead of adding to it, pending a product decision
        user.points = base.saturating_add(random_component);
        let user = user.clone();

        let event = AuditEvent::for_user(AuditEventKind::ProofBonus, &user)
            .with_detail(format!("random={}", random_component));
        Ok(Applied {
            user,
            referrer: None,
            events: vec![event],
        })
    }

    fn user_mut(&mut self, user_id: UserId) -> Result<&mut User> {
        self.users
            .get_mut(&user_id)
            .ok_or_else(|| Error::UserNotFound(user_id.to_string()))
    }

    fn fresh_user_id(&self) -> UserId {
        loop {
            let id = UserId::generate();
            if !self.users.contains_key(&id) {
                return id;
            }
        }
    }

    fn fresh_referral_code(&self) -> String {
        loop {
            let code = Uuid::new_v4().simple().to_string()[..REFERRAL_CODE_LEN].to_string();
            if !self.by_referral_code.contains_key(&code) {
                return code;
            }
        }
    }
}

fn email_key(email: &str) -> String {
    email.trim().to_lowercase()
}
