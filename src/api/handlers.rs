use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{AppError, AppResult};
use crate::ingest::StreamStatus;
use crate::middleware::request_id::RequestId;
use crate::models::{EventId, EventInteractions, RecommendedEvent, UserId};

use super::AppState;

const DEFAULT_LIMIT: usize = 10;

// Request/Response types

#[derive(Debug, Deserialize)]
pub struct RecommendationQuery {
    pub limit: Option<usize>,
    /// Comma separated event ids
    pub exclude: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SimilarQuery {
    pub user_id: i64,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct InteractionsRequest {
    pub event_ids: Vec<EventId>,
}

#[derive(Debug, Serialize)]
pub struct RecommendationResponse {
    pub user_id: UserId,
    pub recommendations: Vec<RecommendedEvent>,
}

#[derive(Debug, Serialize)]
pub struct AffinityEntry {
    pub event_id: EventId,
    pub weight: f64,
}

#[derive(Debug, Serialize)]
pub struct NeighborEntry {
    pub event_id: EventId,
    pub score: f64,
}

fn parse_exclude(raw: Option<&str>) -> AppResult<HashSet<EventId>> {
    let Some(raw) = raw else {
        return Ok(HashSet::new());
    };

    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<i64>()
                .map(EventId)
                .map_err(|_| AppError::InvalidInput(format!("Invalid event id in exclude: {}", part)))
        })
        .collect()
}

// Handlers

/// Health check endpoint
pub async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// Top-K events for a user
pub async fn recommend(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(user_id): Path<i64>,
    Query(query): Query<RecommendationQuery>,
) -> AppResult<Json<RecommendationResponse>> {
    let user_id = UserId(user_id);
    let exclude = parse_exclude(query.exclude.as_deref())?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);

    tracing::info!(
        request_id = %request_id,
        user_id = %user_id,
        limit,
        excluded = exclude.len(),
        "Processing recommendation request"
    );

    let recommendations = state
        .engine
        .recommend_within_deadline(user_id, exclude, limit)
        .await?;

    tracing::info!(
        request_id = %request_id,
        returned = recommendations.len(),
        "Recommendation completed"
    );

    Ok(Json(RecommendationResponse {
        user_id,
        recommendations,
    }))
}

/// Raw affinity weights of a user, strongest first
pub async fn get_affinities(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Json<Vec<AffinityEntry>> {
    let mut entries: Vec<AffinityEntry> = state
        .engine
        .affinity()
        .affinities_of(UserId(user_id))
        .into_iter()
        .map(|(event_id, weight)| AffinityEntry { event_id, weight })
        .collect();
    entries.sort_by(|a, b| b.weight.total_cmp(&a.weight).then(a.event_id.cmp(&b.event_id)));
    Json(entries)
}

/// Raw similarity neighbours of an event
pub async fn get_neighbors(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> Json<Vec<NeighborEntry>> {
    let neighbors = state
        .engine
        .similarity()
        .neighbors_of(EventId(event_id))
        .into_iter()
        .map(|(event_id, score)| NeighborEntry { event_id, score })
        .collect();
    Json(neighbors)
}

/// Events similar to one event that the user has not seen yet
pub async fn get_similar(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
    Query(query): Query<SimilarQuery>,
) -> AppResult<Json<Vec<RecommendedEvent>>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    let similar = state
        .engine
        .similar_events_within_deadline(EventId(event_id), UserId(query.user_id), limit)
        .await?;
    Ok(Json(similar))
}

/// Summed interaction weight for each requested event
pub async fn interactions_count(
    State(state): State<AppState>,
    Json(request): Json<InteractionsRequest>,
) -> AppResult<Json<Vec<EventInteractions>>> {
    let totals = state
        .engine
        .interactions_count_within_deadline(request.event_ids)
        .await?;
    Ok(Json(totals))
}

/// Per-stream ingestion counters and committed offsets
pub async fn ingest_status(State(state): State<AppState>) -> Json<Vec<StreamStatus>> {
    Json(state.ingest_status())
}
