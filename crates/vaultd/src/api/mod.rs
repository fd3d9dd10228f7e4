//! The HTTP API.
//!
//! JSON in and out on every route, HTTP Basic authentication with the
//! configured password, and error bodies as plain text. Domain errors map
//! onto status codes: a locked vault is 503, a bad secret 401, unknown
//! seeds and keys 404, and malformed requests 400.

pub mod types;

use std::sync::Arc;

use axum::extract::{Path, Query, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use subtle::ConstantTimeEq as _;
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

use vaultd_core::signer::{self, SignError};
use vaultd_core::{SeedId, Vault, VaultError};
use vaultd_seed::seed_from_phrase;
use vaultd_types::{standard_unlock_conditions, ConsensusState, Network, PublicKey, SpendPolicy};

use crate::chain::Chain;
use types::{
    AddSeedRequest, BlindSignRequest, BlindSignResponse, SeedDeriveRequest, SeedKey,
    SeedKeysResponse, SeedsResponse, SignRequest, SignResponse, SignV2Request, SignV2Response,
    StateResponse, UnlockRequest,
};

/// Shared state of the API handlers.
pub struct ApiState {
    vault: Arc<Vault>,
    chain: Arc<dyn Chain>,
    password: String,
    start_time: DateTime<Utc>,
}

impl ApiState {
    /// Creates the handler state; the start time reported by `/state` is
    /// captured here, once.
    #[must_use]
    pub fn new(vault: Arc<Vault>, chain: Arc<dyn Chain>, password: String) -> Self {
        Self {
            vault,
            chain,
            password,
            start_time: Utc::now(),
        }
    }
}

/// Builds the API router with authentication applied to every route.
#[must_use]
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/state", get(get_state))
        .route("/unlock", post(post_unlock))
        .route("/lock", put(put_lock))
        .route("/seeds", get(get_seeds).post(post_seeds))
        .route("/seeds/{id}", get(get_seed))
        .route("/seeds/{id}/keys", get(get_seed_keys).post(post_seed_keys))
        .route("/sign", post(post_sign))
        .route("/v2/sign", post(post_sign_v2))
        .route("/blind/sign", post(post_blind_sign))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            require_auth,
        ))
        .with_state(state)
}

/// An error response: a status code and a plain-text message.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

impl From<VaultError> for ApiError {
    fn from(err: VaultError) -> Self {
        let status = match err {
            VaultError::Locked => StatusCode::SERVICE_UNAVAILABLE,
            VaultError::Unlocked => StatusCode::BAD_REQUEST,
            VaultError::IncorrectSecret => StatusCode::UNAUTHORIZED,
            VaultError::NotFound => StatusCode::NOT_FOUND,
            VaultError::SaltSet
            | VaultError::InvalidSize
            | VaultError::Closed
            | VaultError::Database(_)
            | VaultError::Crypto(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<SignError> for ApiError {
    fn from(err: SignError) -> Self {
        match err {
            SignError::UnsupportedAfterRequireHeight
            | SignError::UnsupportedBeforeAllowHeight
            | SignError::NoSignaturesAdded
            | SignError::InvalidRequest(_) => Self::bad_request(err.to_string()),
            SignError::Vault(err) => err.into(),
        }
    }
}

async fn require_auth(
    State(state): State<Arc<ApiState>>,
    request: Request,
    next: Next,
) -> Response {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Basic "))
        .and_then(|value| BASE64.decode(value).ok())
        .is_some_and(|decoded| {
            let password = decoded
                .splitn(2, |&b| b == b':')
                .nth(1)
                .unwrap_or_default();
            password.ct_eq(state.password.as_bytes()).into()
        });
    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Basic realm=\"vaultd\"")],
            "unauthorized",
        )
            .into_response();
    }
    next.run(request).await
}

#[derive(Debug, Default, Deserialize)]
struct PageParams {
    limit: Option<i64>,
    offset: Option<i64>,
}

impl PageParams {
    /// Validates the bounds: `limit` in `[1, 500]` (default 100), `offset`
    /// non-negative (default 0).
    fn validate(&self) -> Result<(usize, usize), ApiError> {
        let limit = self.limit.unwrap_or(100);
        if !(1..=500).contains(&limit) {
            return Err(ApiError::bad_request("limit must be between 1 and 500"));
        }
        let offset = self.offset.unwrap_or(0);
        if offset < 0 {
            return Err(ApiError::bad_request("offset must be non-negative"));
        }
        Ok((limit as usize, offset as usize))
    }
}

fn seed_key(pk: PublicKey) -> SeedKey {
    let unlock_conditions = standard_unlock_conditions(pk);
    SeedKey {
        public_key: pk,
        address: unlock_conditions.unlock_hash(),
        spend_policy: SpendPolicy::UnlockConditions(unlock_conditions),
    }
}

async fn get_state(State(state): State<Arc<ApiState>>) -> Json<StateResponse> {
    Json(StateResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: option_env!("VAULTD_GIT_COMMIT").unwrap_or("unknown").to_string(),
        os: std::env::consts::OS.to_string(),
        build_time: option_env!("VAULTD_BUILD_TIME")
            .and_then(|value| value.parse().ok())
            .unwrap_or(DateTime::UNIX_EPOCH),
        start_time: state.start_time,
    })
}

async fn post_unlock(
    State(state): State<Arc<ApiState>>,
    Json(mut request): Json<UnlockRequest>,
) -> Result<Json<()>, ApiError> {
    let result = state.vault.unlock(&request.secret);
    request.secret.zeroize();
    result?;
    Ok(Json(()))
}

async fn put_lock(State(state): State<Arc<ApiState>>) -> Json<()> {
    state.vault.lock();
    Json(())
}

async fn get_seeds(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<PageParams>,
) -> Result<Json<SeedsResponse>, ApiError> {
    let (limit, offset) = params.validate()?;
    let seeds = state.vault.seeds(limit, offset)?;
    Ok(Json(SeedsResponse { seeds }))
}

async fn post_seeds(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<AddSeedRequest>,
) -> Result<Json<vaultd_core::SeedMeta>, ApiError> {
    let mut seed = Zeroizing::new([0u8; 32]);
    seed_from_phrase(&mut seed, &request.phrase)
        .map_err(|err| ApiError::bad_request(err.to_string()))?;

    let meta = state.vault.add_seed(&mut seed)?;
    Ok(Json(meta))
}

async fn get_seed(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<i64>,
) -> Result<Json<vaultd_core::SeedMeta>, ApiError> {
    Ok(Json(state.vault.seed_meta(SeedId(id))?))
}

async fn get_seed_keys(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<i64>,
    Query(params): Query<PageParams>,
) -> Result<Json<SeedKeysResponse>, ApiError> {
    let (limit, offset) = params.validate()?;
    let keys = state.vault.seed_keys(SeedId(id), offset, limit)?;
    Ok(Json(SeedKeysResponse {
        keys: keys.into_iter().map(seed_key).collect(),
    }))
}

async fn post_seed_keys(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<i64>,
    Json(request): Json<SeedDeriveRequest>,
) -> Result<Json<SeedKeysResponse>, ApiError> {
    let mut keys = Vec::new();
    for _ in 0..request.count {
        keys.push(seed_key(state.vault.next_key(SeedId(id))?));
    }
    Ok(Json(SeedKeysResponse { keys }))
}

/// Resolves the consensus state of a sign request: both parts, or neither
/// (falling back to the chain tip).
async fn consensus_state(
    state: &ApiState,
    request_state: Option<ConsensusState>,
    network: Option<Network>,
) -> Result<ConsensusState, ApiError> {
    match (request_state, network) {
        (Some(mut cs), Some(network)) => {
            cs.network = network;
            Ok(cs)
        }
        (None, None) => {
            debug!("getting consensus state from chain");
            state
                .chain
                .tip_state()
                .await
                .map_err(|err| ApiError::bad_request(err.to_string()))
        }
        (None, Some(_)) => Err(ApiError::bad_request(
            "state must be provided if network is provided",
        )),
        (Some(_), None) => Err(ApiError::bad_request(
            "network must be provided if state is provided",
        )),
    }
}

async fn post_sign(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<SignRequest>,
) -> Result<Json<SignResponse>, ApiError> {
    let cs = consensus_state(&state, request.state, request.network).await?;
    let signed = signer::sign_v1(&state.vault, &cs, request.transaction)?;
    Ok(Json(SignResponse {
        transaction: signed.transaction,
        fully_signed: signed.fully_signed,
    }))
}

async fn post_sign_v2(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<SignV2Request>,
) -> Result<Json<SignV2Response>, ApiError> {
    let cs = consensus_state(&state, request.state, request.network).await?;
    let signed = signer::sign_v2(&state.vault, &cs, request.transaction)?;
    Ok(Json(SignV2Response {
        transaction: signed.transaction,
        fully_signed: signed.fully_signed,
    }))
}

async fn post_blind_sign(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<BlindSignRequest>,
) -> Result<Json<BlindSignResponse>, ApiError> {
    let signature = state.vault.sign(request.public_key, request.sig_hash)?;
    Ok(Json(BlindSignResponse { signature }))
}
