//! Axum REST API handlers.
//!
//! The acting identity is taken from the `x-actor-address` header. It is
//! treated as an already-authenticated signer; capability checks happen in
//! the services and on the ledger. Aggregate reads are deduplicated per
//! client, identified by `x-client-id` or else the actor header.

use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use equinex_ledger::{Address, AssetId, LoanId, MilestoneId, Profile};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::amount::{format_units, parse_units};
use crate::assets::{IpAssetDraft, StartupDraft};
use crate::errors::{MarketError, Result};
use crate::gateway::{Caller, ListingKind};
use crate::loans::LoanApplication;
use crate::metadata::IpMetadataPatch;
use crate::Marketplace;

pub const ACTOR_HEADER: &str = "x-actor-address";
pub const CLIENT_HEADER: &str = "x-client-id";

#[derive(Clone)]
pub struct ApiState {
    pub market: Marketplace,
}

/// Signer of the request.
pub struct Actor(pub Address);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = MarketError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        header(parts, ACTOR_HEADER)
            .map(|s| Actor(Address::new(s)))
            .ok_or(MarketError::MissingActor)
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        Ok(header(parts, CLIENT_HEADER)
            .or_else(|| header(parts, ACTOR_HEADER))
            .map_or(Caller::Anonymous, Caller::client))
    }
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/assets", get(list_assets))
        .route("/assets/startups", post(create_startup))
        .route("/assets/ip", post(create_ip_asset))
        .route("/assets/:id", get(asset_detail))
        .route("/assets/:id/available", get(available_funds))
        .route("/assets/:id/invest", post(invest))
        .route("/assets/:id/withdraw", post(withdraw))
        .route("/assets/:id/refund", post(refund))
        .route("/assets/:id/verify", post(verify_asset))
        .route("/assets/:id/documents", get(list_documents).post(add_document))
        .route(
            "/assets/:id/ip-metadata",
            get(current_ip_metadata).patch(update_ip_metadata),
        )
        .route("/assets/:id/milestones", post(create_milestone))
        .route(
            "/assets/:id/milestones/:milestone_id/complete",
            post(complete_milestone),
        )
        .route("/portfolio/:address", get(portfolio))
        .route("/portfolio/:address/assets/:id", get(investment))
        .route(
            "/verification/requests",
            get(verification_requests).post(submit_verification),
        )
        .route("/verification/verified", get(verified_users))
        .route("/verification/:address", get(verification_status))
        .route("/verification/:address/approve", post(approve_verification))
        .route("/verification/:address/reject", post(reject_verification))
        .route("/loans", get(list_loans).post(request_loan))
        .route("/loans/:id", get(loan))
        .route("/loans/:id/fund", post(fund_loan))
        .route("/loans/:id/withdraw", post(withdraw_loan))
        .route("/loans/:id/repay", post(repay_loan))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub kind: ListingKind,
}

#[derive(Deserialize)]
pub struct AmountRequest {
    /// Decimal string, e.g. `"2.5"`.
    pub amount: String,
}

#[derive(Deserialize)]
pub struct Upload {
    pub file_name: String,
    pub content_base64: String,
}

impl Upload {
    fn decode(self) -> Result<(String, Vec<u8>)> {
        let bytes = STANDARD
            .decode(self.content_base64.trim())
            .map_err(|e| MarketError::BadRequest(format!("content_base64: {e}")))?;
        Ok((self.file_name, bytes))
    }
}

#[derive(Deserialize)]
pub struct DocumentRequest {
    #[serde(flatten)]
    pub upload: Upload,
    pub document_type: String,
}

#[derive(Deserialize)]
pub struct MilestoneRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub fund_amount: String,
}

#[derive(Deserialize)]
pub struct CompletionRequest {
    /// Hash of evidence already in the store.
    #[serde(default)]
    pub proof: Option<String>,
    /// Evidence to upload first.
    #[serde(default)]
    pub evidence: Option<Upload>,
}

fn amount_json(amount: u128) -> serde_json::Value {
    json!({ "base_units": amount.to_string(), "display": format_units(amount) })
}

// ─────────────────────────────────────────────────────────
// Handlers — assets
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /assets?kind=all|startup|ip`
pub async fn list_assets(
    State(state): State<Arc<ApiState>>,
    caller: Caller,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse> {
    let listing = state.market.gateway.list_assets(&caller, query.kind).await?;
    Ok(Json(listing))
}

/// `POST /assets/startups`
pub async fn create_startup(
    State(state): State<Arc<ApiState>>,
    Actor(actor): Actor,
    Json(draft): Json<StartupDraft>,
) -> Result<impl IntoResponse> {
    let asset_id = state.market.assets.create_startup(&actor, draft).await?;
    Ok((StatusCode::CREATED, Json(json!({ "asset_id": asset_id }))))
}

/// `POST /assets/ip`
pub async fn create_ip_asset(
    State(state): State<Arc<ApiState>>,
    Actor(actor): Actor,
    Json(draft): Json<IpAssetDraft>,
) -> Result<impl IntoResponse> {
    let asset_id = state.market.assets.create_ip_asset(&actor, draft).await?;
    Ok((StatusCode::CREATED, Json(json!({ "asset_id": asset_id }))))
}

/// `GET /assets/:id`
pub async fn asset_detail(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<AssetId>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.market.gateway.asset_detail(id).await?))
}

/// `GET /assets/:id/available`
pub async fn available_funds(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<AssetId>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.market.milestones.available(id).await?))
}

/// `POST /assets/:id/verify`
pub async fn verify_asset(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<AssetId>,
    Actor(actor): Actor,
) -> Result<impl IntoResponse> {
    state.market.assets.verify(&actor, id).await?;
    Ok(Json(json!({ "asset_id": id, "is_verified": true })))
}

// ─────────────────────────────────────────────────────────
// Handlers — funding
// ─────────────────────────────────────────────────────────

/// `POST /assets/:id/invest`
pub async fn invest(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<AssetId>,
    Actor(actor): Actor,
    Json(req): Json<AmountRequest>,
) -> Result<impl IntoResponse> {
    let amount = parse_units(&req.amount)?;
    let investment = state.market.funding.invest(&actor, id, amount).await?;
    Ok((StatusCode::CREATED, Json(investment)))
}

/// `POST /assets/:id/withdraw`
pub async fn withdraw(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<AssetId>,
    Actor(actor): Actor,
) -> Result<impl IntoResponse> {
    let released = state.market.funding.withdraw(&actor, id).await?;
    Ok(Json(json!({ "asset_id": id, "released": amount_json(released) })))
}

/// `POST /assets/:id/refund`
pub async fn refund(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<AssetId>,
    Actor(actor): Actor,
) -> Result<impl IntoResponse> {
    let refunded = state.market.funding.refund(&actor, id).await?;
    Ok(Json(json!({ "asset_id": id, "refunded": amount_json(refunded) })))
}

/// `GET /portfolio/:address`
pub async fn portfolio(
    State(state): State<Arc<ApiState>>,
    caller: Caller,
    Path(address): Path<String>,
) -> Result<impl IntoResponse> {
    let investor = Address::new(address);
    Ok(Json(state.market.gateway.portfolio(&caller, &investor).await?))
}

/// `GET /portfolio/:address/assets/:id`
pub async fn investment(
    State(state): State<Arc<ApiState>>,
    Path((address, id)): Path<(String, AssetId)>,
) -> Result<impl IntoResponse> {
    let investor = Address::new(address);
    let amount = state.market.funding.investment_amount(&investor, id).await?;
    Ok(Json(json!({
        "investor": investor,
        "asset_id": id,
        "invested": amount > 0,
        "amount": amount_json(amount),
    })))
}

// ─────────────────────────────────────────────────────────
// Handlers — documents
// ─────────────────────────────────────────────────────────

/// `GET /assets/:id/documents`
pub async fn list_documents(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<AssetId>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.market.documents.documents(id).await?))
}

/// `POST /assets/:id/documents`
pub async fn add_document(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<AssetId>,
    Actor(actor): Actor,
    Json(req): Json<DocumentRequest>,
) -> Result<impl IntoResponse> {
    let (file_name, bytes) = req.upload.decode()?;
    let document = state
        .market
        .documents
        .add_document(&actor, id, &file_name, bytes, &req.document_type)
        .await?;
    Ok((StatusCode::CREATED, Json(document)))
}

/// `GET /assets/:id/ip-metadata`
pub async fn current_ip_metadata(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<AssetId>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.market.documents.current_ip_metadata(id).await?))
}

/// `PATCH /assets/:id/ip-metadata`
pub async fn update_ip_metadata(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<AssetId>,
    Actor(actor): Actor,
    Json(patch): Json<IpMetadataPatch>,
) -> Result<impl IntoResponse> {
    let merged = state
        .market
        .documents
        .update_ip_metadata(&actor, id, patch)
        .await?;
    Ok(Json(merged))
}

// ─────────────────────────────────────────────────────────
// Handlers — milestones
// ─────────────────────────────────────────────────────────

/// `POST /assets/:id/milestones`
pub async fn create_milestone(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<AssetId>,
    Actor(actor): Actor,
    Json(req): Json<MilestoneRequest>,
) -> Result<impl IntoResponse> {
    let fund_amount = parse_units(&req.fund_amount)?;
    let milestone_id = state
        .market
        .milestones
        .create(&actor, id, &req.title, &req.description, fund_amount)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "asset_id": id, "milestone_id": milestone_id })),
    ))
}

/// `POST /assets/:id/milestones/:milestone_id/complete`
pub async fn complete_milestone(
    State(state): State<Arc<ApiState>>,
    Path((id, milestone_id)): Path<(AssetId, MilestoneId)>,
    Actor(actor): Actor,
    Json(req): Json<CompletionRequest>,
) -> Result<impl IntoResponse> {
    let milestones = &state.market.milestones;
    let (proof, completed_at) = match req.evidence {
        Some(upload) => {
            let (file_name, bytes) = upload.decode()?;
            milestones
                .complete_with_evidence(&actor, id, milestone_id, &file_name, bytes)
                .await?
        }
        None => {
            let proof = req.proof.unwrap_or_default();
            let completed_at = milestones.complete(&actor, id, milestone_id, &proof).await?;
            (proof, completed_at)
        }
    };
    Ok(Json(json!({
        "asset_id": id,
        "milestone_id": milestone_id,
        "proof": proof,
        "completed_at": completed_at,
    })))
}

// ─────────────────────────────────────────────────────────
// Handlers — identity verification
// ─────────────────────────────────────────────────────────

/// `GET /verification/requests`
pub async fn verification_requests(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(state.market.gateway.verification_requests().await)
}

/// `GET /verification/verified`
pub async fn verified_users(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(state.market.gateway.verified_users().await)
}

/// `POST /verification/requests`
pub async fn submit_verification(
    State(state): State<Arc<ApiState>>,
    Actor(actor): Actor,
    Json(profile): Json<Profile>,
) -> Result<impl IntoResponse> {
    state.market.verification.submit_request(&actor, profile).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "address": actor, "status": "pending" })),
    ))
}

/// `GET /verification/:address`
pub async fn verification_status(
    State(state): State<Arc<ApiState>>,
    Path(address): Path<String>,
) -> Result<impl IntoResponse> {
    let address = Address::new(address);
    let status = state.market.verification.status(&address).await?;
    Ok(Json(json!({ "address": address, "status": status })))
}

/// `POST /verification/:address/approve`
pub async fn approve_verification(
    State(state): State<Arc<ApiState>>,
    Path(address): Path<String>,
    Actor(actor): Actor,
) -> Result<impl IntoResponse> {
    let address = Address::new(address);
    let already_approved = state.market.verification.approve(&actor, &address).await?;
    Ok(Json(json!({
        "address": address,
        "status": "approved",
        "already_approved": already_approved,
    })))
}

/// `POST /verification/:address/reject`
pub async fn reject_verification(
    State(state): State<Arc<ApiState>>,
    Path(address): Path<String>,
    Actor(actor): Actor,
) -> Result<impl IntoResponse> {
    let address = Address::new(address);
    state.market.verification.reject(&actor, &address).await?;
    Ok(Json(json!({ "address": address, "status": "rejected" })))
}

// ─────────────────────────────────────────────────────────
// Handlers — loans
// ─────────────────────────────────────────────────────────

/// `GET /loans`
pub async fn list_loans(
    State(state): State<Arc<ApiState>>,
    caller: Caller,
) -> Result<impl IntoResponse> {
    Ok(Json(state.market.gateway.list_loans(&caller).await?))
}

/// `POST /loans`
pub async fn request_loan(
    State(state): State<Arc<ApiState>>,
    Actor(actor): Actor,
    Json(application): Json<LoanApplication>,
) -> Result<impl IntoResponse> {
    let loan_id = state.market.loans.request(&actor, application).await?;
    Ok((StatusCode::CREATED, Json(json!({ "loan_id": loan_id }))))
}

/// `GET /loans/:id`
pub async fn loan(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<LoanId>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.market.loans.loan(id).await?))
}

/// `POST /loans/:id/fund`
pub async fn fund_loan(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<LoanId>,
    Actor(actor): Actor,
    Json(req): Json<AmountRequest>,
) -> Result<impl IntoResponse> {
    let amount = parse_units(&req.amount)?;
    Ok(Json(state.market.loans.fund(&actor, id, amount).await?))
}

/// `POST /loans/:id/withdraw`
pub async fn withdraw_loan(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<LoanId>,
    Actor(actor): Actor,
) -> Result<impl IntoResponse> {
    let disbursed = state.market.loans.withdraw(&actor, id).await?;
    Ok(Json(json!({ "loan_id": id, "disbursed": amount_json(disbursed) })))
}

/// `POST /loans/:id/repay`
pub async fn repay_loan(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<LoanId>,
    Actor(actor): Actor,
    Json(req): Json<AmountRequest>,
) -> Result<impl IntoResponse> {
    let amount = parse_units(&req.amount)?;
    let outstanding = state.market.loans.repay(&actor, id, amount).await?;
    Ok(Json(json!({ "loan_id": id, "outstanding": amount_json(outstanding) })))
}
