use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::{Value, json};
use threadkeep_common::ThreadkeepError;
use threadkeep_social::twitter::{
    ThreadContext, Tweet,
    client::{API_KEY_HEADER, MAX_BATCH_IDS},
};
use threadkeep_store::SecretCipher;

use crate::{
    auth::{AuthUser, current_user},
    error::AppError,
    state::SharedState,
};

pub async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Deserialize)]
pub struct TweetsQuery {
    ids: Option<String>,
}

pub async fn tweets_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): Query<TweetsQuery>,
) -> Result<Json<Value>, AppError> {
    let ids = parse_ids(query.ids.as_deref().unwrap_or_default())?;
    let api_key = resolve_api_key(&state, &headers).await?;

    let tweets = state.tweet_api(&api_key).get_tweets(&ids).await?;
    tracing::info!(requested = ids.len(), returned = tweets.len(), "server.tweets.fetched");
    Ok(Json(json!({ "tweets": tweets })))
}

pub async fn tweet_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Tweet>, AppError> {
    let id = validate_id(&id)?;
    let api_key = resolve_api_key(&state, &headers).await?;
    Ok(Json(state.tweet_api(&api_key).get_tweet(id).await?))
}

#[derive(Deserialize)]
pub struct ThreadQuery {
    max_pages: Option<u32>,
}

pub async fn thread_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<ThreadQuery>,
) -> Result<Json<ThreadContext>, AppError> {
    let id = validate_id(&id)?;
    let cap = state.config.thread.max_pages.max(1);
    let max_pages = query.max_pages.unwrap_or(cap).clamp(1, cap);
    let api_key = resolve_api_key(&state, &headers).await?;

    let thread = state.tweet_api(&api_key).get_thread(id, max_pages).await?;
    tracing::info!(
        tweet_id = id,
        pages = thread.pages,
        tweets = thread.tweets.len(),
        truncated = thread.truncated,
        "server.thread.fetched"
    );
    Ok(Json(thread))
}

pub async fn get_key_handler(
    State(state): State<SharedState>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let cipher = sync_cipher(&state)?;
    let stored = state
        .store
        .get_api_key(&user_id, cipher)
        .await?
        .ok_or_else(|| AppError::NotFound("no API key stored".into()))?;
    Ok(Json(stored))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutKey {
    api_key: String,
}

pub async fn put_key_handler(
    State(state): State<SharedState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<PutKey>,
) -> Result<impl IntoResponse, AppError> {
    let cipher = sync_cipher(&state)?;
    let api_key = payload.api_key.trim();
    if api_key.is_empty() {
        return Err(AppError::BadRequest("apiKey must not be empty".into()));
    }
    let updated_at = state.store.put_api_key(&user_id, api_key, cipher).await?;
    Ok(Json(json!({ "updatedAt": updated_at })))
}

pub async fn delete_key_handler(
    State(state): State<SharedState>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    sync_cipher(&state)?;
    let removed = state.store.delete_api_key(&user_id).await?;
    tracing::info!(user_id = %user_id, removed, "server.api_key.deleted");
    Ok(StatusCode::NO_CONTENT)
}

fn sync_cipher(state: &SharedState) -> Result<&SecretCipher, AppError> {
    state.cipher.as_ref().ok_or(AppError::SyncDisabled)
}

/// Key precedence: request header, the caller's stored key, the server default.
pub async fn resolve_api_key(state: &SharedState, headers: &HeaderMap) -> Result<String, AppError> {
    let header_key = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty());
    if let Some(key) = header_key {
        return Ok(key.to_string());
    }

    if let (Some(cipher), Some(user_id)) = (&state.cipher, current_user(state, headers).await) {
        match state.store.get_api_key(&user_id, cipher).await {
            Ok(Some(stored)) => return Ok(stored.api_key),
            Ok(None) => {}
            // A key sealed under a retired key id cannot be opened; the
            // configured default still serves the request.
            Err(err) if err.downcast_ref::<ThreadkeepError>().is_some() => {
                tracing::warn!(user_id = %user_id, error = %err, "server.api_key.unreadable");
            }
            Err(err) => return Err(err.into()),
        }
    }

    state
        .config
        .provider
        .api_key()
        .map(str::to_string)
        .ok_or_else(|| AppError::Unauthorized("no provider API key available".into()))
}

fn validate_id(id: &str) -> Result<&str, AppError> {
    let id = id.trim();
    if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) {
        Ok(id)
    } else {
        Err(AppError::BadRequest(format!("invalid tweet id `{id}`")))
    }
}

/// Comma separated ids; blanks are ignored and duplicates collapse.
fn parse_ids(raw: &str) -> Result<Vec<String>, AppError> {
    let mut ids: Vec<String> = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let id = validate_id(part)?;
        if !ids.iter().any(|seen| seen == id) {
            ids.push(id.to_string());
        }
    }
    if ids.is_empty() {
        return Err(AppError::BadRequest("ids query parameter is required".into()));
    }
    if ids.len() > MAX_BATCH_IDS {
        return Err(AppError::BadRequest(format!(
            "too many ids: {} (max {MAX_BATCH_IDS})",
            ids.len()
        )));
    }
    Ok(ids)
}
