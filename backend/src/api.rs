use crate::db;
use crate::errors::ApiError;
use crate::models::*;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use chrono::Utc;
use shielded_pool::field::from_hex;
use shielded_pool::merkle::MerkleError;
use shielded_pool::{Address, CollectReceipt, Envelope, FinalizeOutcome, TokenLedger, VerifierFamily};
use tower_http::cors::{Any, CorsLayer};

pub fn router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/api/v1/messages", post(deliver_message))
        .route("/api/v1/ledger/mint", post(mint))
        .route("/api/v1/ledger/approve", post(approve))
        .route("/api/v1/remotes", post(enroll_remote))
        .layer(middleware::from_fn(auth_middleware));

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/v1/pool", get(get_pool))
        .route("/api/v1/tree/path/:index", get(get_tree_path))
        .route("/api/v1/events", get(list_events))
        .route("/api/v1/outbox", get(list_outbox))
        .route("/api/v1/zk/vk/:family", get(get_vk))
        .route("/api/v1/ledger/:token/:account", get(get_balance))
        .route("/api/v1/transact", post(transact))
        .route("/api/v1/collect", post(collect))
        .route("/api/v1/withdrawals", post(withdraw_init))
        .route("/api/v1/withdrawals/:key/cancel", post(withdraw_cancel))
        .merge(protected_routes)
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

async fn auth_middleware(
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // In production, this should be a strong secret from environment.
    let expected_key = std::env::var("API_KEY").unwrap_or_else(|_| "dev-secret-key".to_string());

    if let Some(provided_key) = headers.get("X-API-KEY") {
        if provided_key == expected_key.as_str() {
            return Ok(next.run(request).await);
        }
    }

    tracing::warn!("unauthorized access attempt");
    Err(StatusCode::UNAUTHORIZED)
}

fn page(params: &PageParams) -> (u64, u64) {
    (params.offset.unwrap_or(0), params.limit.unwrap_or(50).min(500))
}

async fn get_pool(State(state): State<AppState>) -> Result<Json<PoolInfoResponse>, ApiError> {
    let info = state
        .read(|node| {
            let pool = &node.pool;
            let config = pool.config();
            PoolInfoResponse {
                address: pool.address(),
                domain: config.domain,
                token: config.token,
                owner: config.owner,
                init_code_hash_hex: format!("0x{}", hex::encode(pool.init_code_hash())),
                current_root: pool.current_root(),
                leaf_count: pool.leaf_count(),
                tree_depth: pool.tree().depth(),
                collect_mode: config.collect_mode,
                custody: pool.custody(&node.ledger, &config.token),
                version: pool.version(),
                verifiers: VerifierFamily::ALL
                    .iter()
                    .map(|f| (f.as_str().to_string(), pool.verifier_address(*f)))
                    .collect(),
            }
        })
        .await;

    Ok(Json(info))
}

async fn get_tree_path(State(state): State<AppState>, Path(index): Path<u64>) -> Result<Json<TreePathResponse>, ApiError> {
    state
        .read(|node| {
            let tree = node.pool.tree();
            let path = tree.path_to(index).map_err(|e| match e {
                MerkleError::IndexOutOfRange { .. } => ApiError::NotFound(e.to_string()),
                _ => ApiError::Internal,
            })?;
            Ok(Json(TreePathResponse {
                leaf: tree.leaves()[index as usize],
                root: tree.root(),
                path,
            }))
        })
        .await
}

async fn list_events(State(state): State<AppState>, Query(params): Query<PageParams>) -> Result<Json<EventListResponse>, ApiError> {
    let (offset, limit) = page(&params);
    let events = db::list_events(&state.db, &state.address, offset, limit).await?;
    Ok(Json(EventListResponse { offset, limit, events }))
}

async fn list_outbox(State(state): State<AppState>, Query(params): Query<PageParams>) -> Result<Json<OutboxListResponse>, ApiError> {
    let (offset, limit) = page(&params);
    let envelopes = db::list_outbox(&state.db, &state.address, offset, limit).await?;
    Ok(Json(OutboxListResponse { offset, limit, envelopes }))
}

async fn get_vk(State(state): State<AppState>, Path(family): Path<VerifierFamily>) -> Result<Json<ZkVkResponse>, ApiError> {
    let path = state.vk_path(family);
    let vk_bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| ApiError::NotFound(format!("no verifying key installed for {family}")))?;

    Ok(Json(ZkVkResponse {
        family: family.as_str().to_string(),
        curve: "bn254".to_string(),
        proof_system: "groth16".to_string(),
        vk_b64: base64::engine::general_purpose::STANDARD.encode(vk_bytes),
    }))
}

async fn get_balance(
    State(state): State<AppState>,
    Path((token, account)): Path<(Address, Address)>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state.read(|node| node.ledger.balance_of(&token, &account)).await;
    Ok(Json(BalanceResponse { token, account, balance }))
}

async fn approve(State(state): State<AppState>, Json(req): Json<ApproveRequest>) -> Result<StatusCode, ApiError> {
    state
        .sequenced(|node| {
            node.ledger.approve(&req.token, &req.owner, &req.spender, req.amount);
            Ok(())
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn mint(State(state): State<AppState>, Json(req): Json<MintRequest>) -> Result<StatusCode, ApiError> {
    let minted = state
        .sequenced(|node| Ok(node.ledger.mint(&req.token, &req.to, req.amount)))
        .await?;
    minted.map_err(|e| ApiError::BadRequest(e.to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn transact(State(state): State<AppState>, Json(req): Json<TransactRequest>) -> Result<Json<TransactResponse>, ApiError> {
    let resp = state
        .sequenced(|node| {
            node.pool
                .transact(&mut node.ledger, &req.caller, &req.proof, &req.public_inputs, req.new_root)?;
            Ok(TransactResponse {
                root: node.pool.current_root(),
                leaf_count: node.pool.leaf_count(),
                version: node.pool.version(),
            })
        })
        .await?;
    Ok(Json(resp))
}

async fn collect(State(state): State<AppState>, Json(call): Json<CollectCall>) -> Result<Json<CollectReceipt>, ApiError> {
    let receipt = state
        .sequenced(|node| node.pool.collect(&mut node.ledger, &call.caller, &call.request))
        .await?;
    Ok(Json(receipt))
}

async fn withdraw_init(State(state): State<AppState>, Json(req): Json<WithdrawInitRequest>) -> Result<Json<WithdrawalResponse>, ApiError> {
    let resp = state
        .sequenced(|node| {
            let key = node
                .pool
                .trustless_withdraw_init(&req.caller, &req.proof, &req.public_inputs, Utc::now())?;
            Ok(withdrawal_response(node, key))
        })
        .await?;
    resp.map(Json)
}

async fn withdraw_cancel(State(state): State<AppState>, Path(key): Path<String>) -> Result<Json<WithdrawalResponse>, ApiError> {
    let key = from_hex(&key).map_err(|e| ApiError::BadRequest(format!("invalid withdrawal key: {e}")))?;
    let resp = state
        .sequenced(|node| {
            node.pool.trustless_withdraw_cancel(&key, Utc::now())?;
            Ok(withdrawal_response(node, key))
        })
        .await?;
    resp.map(Json)
}

fn withdrawal_response(node: &crate::state::Node, key: ark_bn254::Fr) -> Result<WithdrawalResponse, ApiError> {
    let pending = node.pool.pending_withdrawal(&key).ok_or(ApiError::Internal)?;
    Ok(WithdrawalResponse {
        key,
        status: pending.status,
        destination_domain: pending.destination_domain,
        expires_at: pending.expires_at,
    })
}

/// Inbound side of the authenticated transport: a relayer hands over an envelope it
/// picked up from another pool's outbox.
async fn deliver_message(State(state): State<AppState>, Json(envelope): Json<Envelope>) -> Result<Json<FinalizeOutcome>, ApiError> {
    let outcome = state
        .sequenced(|node| node.pool.handle_message(&mut node.ledger, &envelope, Utc::now()))
        .await?;
    Ok(Json(outcome))
}

async fn enroll_remote(State(state): State<AppState>, Json(req): Json<EnrollRemoteRequest>) -> Result<StatusCode, ApiError> {
    state
        .sequenced(|node| node.pool.enroll_remote(&req.caller, req.domain, req.pool))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
