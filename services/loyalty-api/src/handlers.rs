use crate::errors::LoyaltyApiError;
use crate::metrics::{self, HTTP_REQUEST_DURATION};
use crate::models::{
    DepositRequest, DepositResponse, ProofRequest, ProofResponse, ReferralsResponse,
    RegisterRequest, RegisterResponse, RewardsQuery, RewardsResponse, UserResponse,
    VerifyProofRequest, VerifyProofResponse,
};
use actix_web::{web, HttpResponse, ResponseError};
use loyalty_core::{
    merkle::parse_hex, verify_proof, Ledger, NewUser, Tier, UserId, WalletAddress,
};
use prometheus::Registry;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Shared state handed to every worker
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
    pub registry: Registry,
}

type HandlerResult = Result<HttpResponse, LoyaltyApiError>;

/// Count the outcome of `endpoint` and pass the result through
fn finish(endpoint: &str, result: HandlerResult) -> HandlerResult {
    let status = match &result {
        Ok(response) => response.status(),
        Err(e) => e.status_code(),
    };
    metrics::observe(endpoint, status.as_u16());
    result
}

/// Health check endpoint
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": "loyalty-api",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Register a user
pub async fn register(
    state: web::Data<AppState>,
    request: web::Json<RegisterRequest>,
) -> HandlerResult {
    let _timer = HTTP_REQUEST_DURATION.with_label_values(&["register"]).start_timer();
    finish("register", register_user(&state.ledger, request.into_inner()).await)
}

async fn register_user(ledger: &Ledger, request: RegisterRequest) -> HandlerResult {
    request.validate()?;

    let registration = ledger
        .register(NewUser {
            name: request.name,
            email: request.email,
            wallet: WalletAddress::new(request.wallet),
            referral_code: request.referral_code.filter(|code| !code.is_empty()),
        })
        .await?;

    Ok(HttpResponse::Created().json(RegisterResponse::from(registration)))
}

/// Deposit into a user's balance
pub async fn deposit(
    state: web::Data<AppState>,
    user_id: web::Path<Uuid>,
    request: web::Json<DepositRequest>,
) -> HandlerResult {
    let _timer = HTTP_REQUEST_DURATION.with_label_values(&["deposit"]).start_timer();
    let result = state
        .ledger
        .deposit(UserId::from_uuid(*user_id), request.amount)
        .await
        .map(|user| HttpResponse::Ok().json(DepositResponse::from(user)))
        .map_err(LoyaltyApiError::from);
    finish("deposit", result)
}

/// Prove the user's wallet is in the submitted list and award the proof bonus
pub async fn generate_proof(
    state: web::Data<AppState>,
    user_id: web::Path<Uuid>,
    request: web::Json<ProofRequest>,
) -> HandlerResult {
    let _timer = HTTP_REQUEST_DURATION.with_label_values(&["proof"]).start_timer();
    let user_id = UserId::from_uuid(*user_id);
    finish("proof", prove_membership(&state.ledger, user_id, request.into_inner()).await)
}

async fn prove_membership(ledger: &Ledger, user_id: UserId, request: ProofRequest) -> HandlerResult {
    request.validate()?;
    let wallets: Vec<WalletAddress> = request
        .wallet_list
        .into_iter()
        .map(WalletAddress::new)
        .collect();

    let outcome = ledger.generate_proof(user_id, &wallets).await?;
    Ok(HttpResponse::Ok().json(ProofResponse::new(outcome.proof, outcome.user.points)))
}

/// Check a proof without touching any user
pub async fn verify(request: web::Json<VerifyProofRequest>) -> HandlerResult {
    finish("verify", check_proof(&request))
}

fn check_proof(request: &VerifyProofRequest) -> HandlerResult {
    let leaf = parse_hex(&request.leaf)?;
    let root = parse_hex(&request.root)?;
    let valid = verify_proof(&request.proof, &leaf, &root);
    Ok(HttpResponse::Ok().json(VerifyProofResponse { valid }))
}

/// Get a user
pub async fn get_user(state: web::Data<AppState>, user_id: web::Path<Uuid>) -> HandlerResult {
    let result = state
        .ledger
        .get_user(UserId::from_uuid(*user_id))
        .await
        .map(|user| HttpResponse::Ok().json(UserResponse::from(user)))
        .map_err(LoyaltyApiError::from);
    finish("get_user", result)
}

/// Users directly referred by a user
pub async fn get_referrals(state: web::Data<AppState>, user_id: web::Path<Uuid>) -> HandlerResult {
    let id = UserId::from_uuid(*user_id);
    let result = state
        .ledger
        .referrals(id)
        .await
        .map(|direct| {
            HttpResponse::Ok().json(ReferralsResponse {
                id,
                total: direct.len(),
                direct,
            })
        })
        .map_err(LoyaltyApiError::from);
    finish("referrals", result)
}

/// Reward catalog, optionally narrowed to what a tier may redeem
pub async fn list_rewards(
    state: web::Data<AppState>,
    query: web::Query<RewardsQuery>,
) -> HandlerResult {
    finish("rewards", rewards_for(&state.ledger, query.tier.as_deref()))
}

fn rewards_for(ledger: &Ledger, tier: Option<&str>) -> HandlerResult {
    let tier = match tier {
        Some(t) => Some(
            Tier::parse(t)
                .ok_or_else(|| LoyaltyApiError::Validation(format!("Unknown tier: {}", t)))?,
        ),
        None => None,
    };

    let rewards = match tier {
        Some(tier) => ledger.eligible_rewards(tier),
        None => ledger.rewards_catalog().to_vec(),
    };
    Ok(HttpResponse::Ok().json(RewardsResponse { tier, rewards }))
}

/// Prometheus metrics endpoint
pub async fn metrics_endpoint(state: web::Data<AppState>) -> HttpResponse {
    match metrics::render(&state.registry, state.ledger.metrics()) {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(body),
        Err(e) => HttpResponse::InternalServerError().json(json!({
            "error": "Failed to gather metrics",
            "details": e.to_string()
        })),
    }
}

/// Configure routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/register", web::post().to(register))
        .service(
            web::scope("/users/{id}")
                .route("", web::get().to(get_user))
                .route("/deposit", web::put().to(deposit))
                .route("/proof", web::post().to(generate_proof))
                .route("/referrals", web::get().to(get_referrals)),
        )
        .route("/proofs/verify", web::post().to(verify))
        .route("/rewards", web::get().to(list_rewards))
        .route("/metrics", web::get().to(metrics_endpoint))
        .route("/health", web::get().to(health_check));
}
