//! REST handlers. Every write goes through `LedgerGateway`; reads are fresh
//! ledger projections.

use crate::error::ApiError;
use crate::ServiceState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{SecondsFormat, TimeZone, Utc};
use gateway_core::{messages, Address, GatewayError, WriteOutcome, H256};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Rejects POST bodies that are not declared as `application/json`.
pub async fn require_json(request: Request, next: Next) -> Result<Response, ApiError> {
    let declared = request
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
        .unwrap_or_default();
    let media_type = declared.split(';').next().unwrap_or_default().trim();
    if !media_type.eq_ignore_ascii_case("application/json") {
        return Err(ApiError::bad_request(messages::invalid_mimetype(media_type)));
    }
    Ok(next.run(request).await)
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

fn accepted(transaction_hash: H256) -> Response {
    (
        StatusCode::ACCEPTED,
        Json(json!({
            "message": messages::TRANSACTION_ACCEPTED,
            "transaction": transaction_hash,
        })),
    )
        .into_response()
}

fn rfc3339(timestamp: u64) -> Result<String, ApiError> {
    i64::try_from(timestamp)
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .map(|time| time.to_rfc3339_opts(SecondsFormat::Secs, true))
        .ok_or_else(|| {
            ApiError::from(GatewayError::Ledger(format!(
                "timestamp {timestamp} out of range"
            )))
        })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    status: &'static str,
    service: &'static str,
    backend: &'static str,
    chain_id: u64,
    operator: Address,
    block_number: u64,
}

pub async fn health(State(state): State<ServiceState>) -> Result<Json<HealthResponse>, ApiError> {
    let block = state.gateway.latest_block().await?;
    Ok(Json(HealthResponse {
        status: "ok",
        service: "gateway-service",
        backend: state.gateway.backend(),
        chain_id: state.gateway.chain_id(),
        operator: state.gateway.operator(),
        block_number: block.number,
    }))
}

#[derive(Debug, Deserialize)]
pub struct StampRequest {
    #[serde(default)]
    hash: String,
}

pub async fn stamp(
    State(state): State<ServiceState>,
    payload: Result<Json<StampRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = body(payload)?;
    let response = match state.gateway.stamp(&request.hash).await? {
        WriteOutcome::Confirmed(confirmation) => (
            StatusCode::CREATED,
            Json(json!({
                "transaction": confirmation.transaction_hash,
                "blockNumber": confirmation.record.block_number,
            })),
        )
            .into_response(),
        WriteOutcome::Accepted { transaction_hash } => accepted(transaction_hash),
    };
    Ok(response)
}

pub async fn stamped(
    State(state): State<ServiceState>,
    Path(hash): Path<String>,
) -> Result<Response, ApiError> {
    let record = state.gateway.stamped(&hash).await?;
    Ok(Json(record).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    #[serde(default)]
    call_id: String,
    #[serde(default)]
    closing_time: String,
    #[serde(default)]
    signature: String,
}

pub async fn create(
    State(state): State<ServiceState>,
    payload: Result<Json<CreateRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = body(payload)?;
    let outcome = state
        .gateway
        .create_call(&request.call_id, &request.closing_time, &request.signature)
        .await?;
    let response = match outcome {
        WriteOutcome::Confirmed(call) => (
            StatusCode::CREATED,
            Json(json!({
                "message": messages::OK,
                "callId": call.call_id,
                "creator": call.creator,
                "cfp": call.cfp,
            })),
        )
            .into_response(),
        WriteOutcome::Accepted { transaction_hash } => accepted(transaction_hash),
    };
    Ok(response)
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    address: String,
    #[serde(default)]
    signature: String,
}

fn authorization_response<T>(outcome: WriteOutcome<T>) -> Response {
    match outcome {
        WriteOutcome::Confirmed(_) => {
            (StatusCode::OK, Json(json!({ "message": messages::OK }))).into_response()
        }
        WriteOutcome::Accepted { transaction_hash } => accepted(transaction_hash),
    }
}

pub async fn register(
    State(state): State<ServiceState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = body(payload)?;
    let outcome = state
        .gateway
        .register(&request.address, &request.signature)
        .await?;
    Ok(authorization_response(outcome))
}

#[derive(Debug, Deserialize)]
pub struct ApprovalRequest {
    #[serde(default)]
    signature: String,
}

pub async fn authorize(
    State(state): State<ServiceState>,
    Path(address): Path<String>,
    payload: Result<Json<ApprovalRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = body(payload)?;
    let outcome = state
        .gateway
        .authorize(&address, &request.signature)
        .await?;
    Ok(authorization_response(outcome))
}

pub async fn unauthorize(
    State(state): State<ServiceState>,
    Path(address): Path<String>,
    payload: Result<Json<ApprovalRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = body(payload)?;
    let outcome = state
        .gateway
        .unauthorize(&address, &request.signature)
        .await?;
    Ok(authorization_response(outcome))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalRequest {
    call_id: Option<String>,
    proposal: Option<String>,
}

pub async fn register_proposal(
    State(state): State<ServiceState>,
    payload: Result<Json<ProposalRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = body(payload)?;
    let outcome = state
        .gateway
        .register_proposal(request.call_id.as_deref(), request.proposal.as_deref())
        .await?;
    let response = match outcome {
        WriteOutcome::Confirmed(record) => (
            StatusCode::CREATED,
            Json(json!({
                "message": messages::OK,
                "sender": record.sender,
                "blockNumber": record.block_number,
                "timestamp": rfc3339(record.timestamp)?,
            })),
        )
            .into_response(),
        WriteOutcome::Accepted { transaction_hash } => accepted(transaction_hash),
    };
    Ok(response)
}

pub async fn authorized(
    State(state): State<ServiceState>,
    Path(address): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let authorized = state.gateway.is_authorized(&address).await?;
    Ok(Json(json!({ "authorized": authorized })))
}

pub async fn registered(
    State(state): State<ServiceState>,
    Path(address): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let registered = state.gateway.is_registered(&address).await?;
    Ok(Json(json!({ "registered": registered })))
}

pub async fn pending(
    State(state): State<ServiceState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let pending = state.gateway.pending().await?;
    Ok(Json(json!({ "pending": pending })))
}

pub async fn creators(
    State(state): State<ServiceState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let creators = state.gateway.creators().await?;
    Ok(Json(json!({ "creators": creators })))
}

pub async fn created_by(
    State(state): State<ServiceState>,
    Path(address): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let calls = state.gateway.created_by(&address).await?;
    Ok(Json(json!({ "calls": calls })))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CallListing {
    call_id: H256,
    creator: Address,
    cfp: Address,
    closing_time: String,
}

pub async fn calls(
    State(state): State<ServiceState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut listing = Vec::new();
    for call in state.gateway.calls().await? {
        listing.push(CallListing {
            call_id: call.call_id,
            creator: call.creator,
            cfp: call.cfp,
            closing_time: rfc3339(call.closing_time)?,
        });
    }
    Ok(Json(json!({ "callsList": listing })))
}

pub async fn call(
    State(state): State<ServiceState>,
    Path(call_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let call = state.gateway.call(&call_id).await?;
    Ok(Json(json!({ "creator": call.creator, "cfp": call.cfp })))
}

pub async fn closing_time(
    State(state): State<ServiceState>,
    Path(call_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let closing_time = state.gateway.closing_time(&call_id).await?;
    Ok(Json(json!({ "closingTime": rfc3339(closing_time)? })))
}

pub async fn proposal_data(
    State(state): State<ServiceState>,
    Path((call_id, proposal)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let record = state.gateway.proposal_data(&call_id, &proposal).await?;
    Ok(Json(json!({
        "timestamp": rfc3339(record.timestamp)?,
        "sender": record.sender,
        "blockNumber": record.block_number,
    })))
}

pub async fn stamper_address(State(state): State<ServiceState>) -> Json<serde_json::Value> {
    Json(json!({ "address": state.gateway.stamper_address() }))
}

pub async fn factory_address(State(state): State<ServiceState>) -> Json<serde_json::Value> {
    Json(json!({ "address": state.gateway.factory_address() }))
}

pub async fn contract_owner(State(state): State<ServiceState>) -> Json<serde_json::Value> {
    Json(json!({ "address": state.gateway.operator() }))
}
