//! HTTP handlers: one per route, translating requests into engine calls.

use std::collections::HashMap;
use std::str::FromStr;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::json;
use tracing::{error, info};

use spool_core::{EngineError, Job, MAX_BODY_SIZE};

use super::errors::{engine_error_to_response, internal_error, json_error};
use super::AppState;

/// Parse an optional query parameter, 400 on malformed values.
fn query_param<T: FromStr>(
    params: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, Response> {
    match params.get(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| json_error(StatusCode::BAD_REQUEST, format!("invalid {key}"))),
    }
}

fn job_payload(job: &Job) -> serde_json::Value {
    json!({
        "namespace": job.namespace,
        "queue": job.queue,
        "job_id": job.id.to_string(),
        "data": BASE64.encode(&job.body),
        "ttl": job.ttl,
        "elapsed_ms": job.elapsed_ms(),
    })
}

/// PUT /:namespace/:queue
/// query: delay u32 (default 0), ttl u32 (default configured), tries u16
/// (default 1)
pub async fn publish(
    State(state): State<AppState>,
    Path((namespace, queue)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    let delay = match query_param(&params, "delay", 0u32) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let ttl = match query_param(&params, "ttl", state.default_ttl) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    // ttl == 0 means forever, so it's always longer than any delay.
    if ttl > 0 && ttl < delay {
        return json_error(StatusCode::BAD_REQUEST, "ttl is shorter than delay");
    }
    let tries = match query_param(&params, "tries", 1u16) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if tries == 0 {
        return json_error(
            StatusCode::BAD_REQUEST,
            "tries shouldn't be zero, or the task would never be consumed",
        );
    }
    if body.len() > MAX_BODY_SIZE {
        return json_error(StatusCode::PAYLOAD_TOO_LARGE, "body too large");
    }

    match state
        .engine
        .publish(&namespace, &queue, body.to_vec(), ttl, delay, tries)
        .await
    {
        Ok(job_id) => {
            info!(%namespace, %queue, job_id = %job_id, delay, ttl, tries, "job published");
            (
                StatusCode::CREATED,
                Json(json!({ "msg": "published", "job_id": job_id.to_string() })),
            )
                .into_response()
        }
        Err(EngineError::InvalidArgument(msg)) => json_error(StatusCode::BAD_REQUEST, msg),
        Err(err) => {
            error!(%err, %namespace, %queue, delay, ttl, tries, "failed to publish");
            internal_error()
        }
    }
}

/// GET /:namespace/:queue[,queue]*
/// query: ttr u32 (default 60), timeout u32 (default 0)
///
/// RFC 3986 allows "," in a path segment, so it separates queue names.
pub async fn consume(
    State(state): State<AppState>,
    Path((namespace, queues)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let queue_list: Vec<String> = queues
        .split(',')
        .filter(|q| !q.is_empty())
        .map(str::to_string)
        .collect();

    let ttr = match query_param(&params, "ttr", 60u32) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let timeout = match query_param(&params, "timeout", 0u32) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let result = match queue_list.as_slice() {
        [] => return json_error(StatusCode::BAD_REQUEST, "invalid queue name(s)"),
        [queue] => state.engine.consume(&namespace, queue, ttr, timeout).await,
        _ => {
            if timeout == 0 {
                return json_error(
                    StatusCode::BAD_REQUEST,
                    "timeout must be provided to consume multiple queues",
                );
            }
            state
                .engine
                .consume_multi(&namespace, &queue_list, ttr, timeout)
                .await
        }
    };

    match result {
        Ok(Some(job)) => {
            info!(%namespace, queue = %job.queue, job_id = %job.id, ttl = job.ttl, ttr, "job consumed");
            let mut payload = job_payload(&job);
            payload["msg"] = json!("new job");
            (StatusCode::OK, Json(payload)).into_response()
        }
        Ok(None) => json_error(StatusCode::NOT_FOUND, "no job available"),
        Err(EngineError::InvalidArgument(msg)) => json_error(StatusCode::BAD_REQUEST, msg),
        Err(err) => {
            error!(%err, %namespace, %queues, "failed to consume");
            internal_error()
        }
    }
}

/// DELETE /:namespace/:queue/job/:job_id
pub async fn delete_job(
    State(state): State<AppState>,
    Path((namespace, queue, job_id)): Path<(String, String, String)>,
) -> Response {
    match state.engine.delete(&namespace, &queue, &job_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            error!(%err, %namespace, %queue, %job_id, "failed to delete");
            internal_error()
        }
    }
}

/// GET /:namespace/:queue/peek
pub async fn peek_queue(
    State(state): State<AppState>,
    Path((namespace, queue)): Path<(String, String)>,
) -> Response {
    match state.engine.peek(&namespace, &queue, None).await {
        Ok(job) => (StatusCode::OK, Json(job_payload(&job))).into_response(),
        Err(err @ EngineError::NotFound) => engine_error_to_response(&err),
        Err(err) => {
            error!(%err, %namespace, %queue, "failed to peek");
            engine_error_to_response(&err)
        }
    }
}

/// GET /:namespace/:queue/job/:job_id
pub async fn peek_job(
    State(state): State<AppState>,
    Path((namespace, queue, job_id)): Path<(String, String, String)>,
) -> Response {
    match state.engine.peek(&namespace, &queue, Some(&job_id)).await {
        Ok(job) => (StatusCode::OK, Json(job_payload(&job))).into_response(),
        Err(err @ EngineError::NotFound) => engine_error_to_response(&err),
        Err(err) => {
            error!(%err, %namespace, %queue, %job_id, "failed to peek");
            engine_error_to_response(&err)
        }
    }
}

/// GET /:namespace/:queue/size
pub async fn size(
    State(state): State<AppState>,
    Path((namespace, queue)): Path<(String, String)>,
) -> Response {
    match state.engine.size(&namespace, &queue).await {
        Ok(size) => (
            StatusCode::OK,
            Json(json!({ "namespace": namespace, "queue": queue, "size": size })),
        )
            .into_response(),
        Err(err) => {
            error!(%err, %namespace, %queue, "failed to get queue size");
            engine_error_to_response(&err)
        }
    }
}

/// GET /:namespace/:queue/deadletter
pub async fn peek_deadletter(
    State(state): State<AppState>,
    Path((namespace, queue)): Path<(String, String)>,
) -> Response {
    match state.engine.peek_dead_letter(&namespace, &queue).await {
        Ok((size, head)) => (
            StatusCode::OK,
            Json(json!({
                "namespace": namespace,
                "queue": queue,
                "deadletter_size": size,
                "deadletter_head": head.unwrap_or_default(),
            })),
        )
            .into_response(),
        Err(err) => {
            error!(%err, %namespace, %queue, "failed to peek deadletter");
            engine_error_to_response(&err)
        }
    }
}

/// PUT /:namespace/:queue/deadletter
/// query: limit i64 >= 1 (default 1), ttl i64 >= 0 (default configured)
pub async fn respawn_deadletter(
    State(state): State<AppState>,
    Path((namespace, queue)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let limit = match query_param(&params, "limit", 1i64) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if limit <= 0 {
        return json_error(StatusCode::BAD_REQUEST, "invalid limit");
    }
    let ttl = match query_param(&params, "ttl", i64::from(state.default_ttl)) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if ttl < 0 {
        return json_error(StatusCode::BAD_REQUEST, "invalid ttl");
    }

    match state
        .engine
        .respawn_dead_letter(&namespace, &queue, limit, ttl)
        .await
    {
        Ok(count) => {
            info!(%namespace, %queue, limit, count, "deadletter respawned");
            (StatusCode::OK, Json(json!({ "msg": "respawned", "count": count }))).into_response()
        }
        Err(err) => {
            error!(%err, %namespace, %queue, limit, "failed to respawn deadletter");
            engine_error_to_response(&err)
        }
    }
}

/// DELETE /:namespace/:queue/deadletter
/// query: limit i64 >= 1 (default 1)
pub async fn delete_deadletter(
    State(state): State<AppState>,
    Path((namespace, queue)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let limit = match query_param(&params, "limit", 1i64) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if limit <= 0 {
        return json_error(StatusCode::BAD_REQUEST, "invalid limit");
    }

    match state
        .engine
        .delete_dead_letter(&namespace, &queue, limit)
        .await
    {
        Ok(count) => {
            info!(%namespace, %queue, limit, count, "deadletter deleted");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => {
            error!(%err, %namespace, %queue, limit, "failed to delete deadletter");
            engine_error_to_response(&err)
        }
    }
}

/// DELETE /:namespace/:queue
pub async fn destroy_queue(
    State(state): State<AppState>,
    Path((namespace, queue)): Path<(String, String)>,
) -> Response {
    match state.engine.destroy(&namespace, &queue).await {
        Ok(count) => {
            info!(%namespace, %queue, count, "queue destroyed");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => {
            error!(%err, %namespace, %queue, "failed to destroy queue");
            engine_error_to_response(&err)
        }
    }
}
