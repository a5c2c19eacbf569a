use axum::{
    Json, Router,
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use anyhow::Context;
use index::SearchFilter;
use ingest::{ContentExtractor, Metadata, ProcessedContent, SourceType};
use query::{
    Brain, Connection, Exploration, Idea, KnowledgeStats, SearchResult, render_connections,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::cache::CacheStats;
use crate::metrics::{MetricsSnapshot, TimedOperation};
use crate::state::AppState;

const DEFAULT_SEARCH_LIMIT: usize = 5;
const MAX_SEARCH_LIMIT: usize = 50;
const DEFAULT_IDEA_COUNT: usize = 3;
const MAX_IDEA_COUNT: usize = 10;

type ApiError = (StatusCode, String);

fn bad_request(message: impl Into<String>) -> ApiError {
    (StatusCode::BAD_REQUEST, message.into())
}

fn internal(error: anyhow::Error) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", error))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/index", post(index_text))
        .route("/ingest/path", post(ingest_path))
        .route("/ingest/url", post(ingest_url))
        .route("/query", post(answer_query))
        .route("/search", get(search))
        .route("/stats", get(get_stats))
        .route("/graph/entity/:name", get(explore_entity))
        .route("/graph/connections", get(find_connections))
        .route("/graph/ideas", post(generate_ideas))
        .route("/metrics", get(get_metrics))
        .layer(middleware::from_fn_with_state(state.clone(), track_requests))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn track_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    let status = response.status();
    state
        .metrics
        .record_request(status.is_success() || status == StatusCode::NOT_FOUND);
    response
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    knowledge_base: String,
    llm: String,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let knowledge_base = match state.brain.initialize().await {
        Ok(()) => "ok".to_string(),
        Err(e) => format!("error: {}", e),
    };

    let llm = match &state.ollama {
        Some(client) => match client.check_health().await {
            Ok(true) => "ok".to_string(),
            Ok(false) => format!("error: model {} not available", client.model()),
            Err(e) => format!("error: {}", e),
        },
        None => "not configured".to_string(),
    };

    let status = if knowledge_base == "ok" { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        knowledge_base,
        llm,
    })
}

#[derive(Deserialize)]
struct IndexRequest {
    text: String,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    source_type: Option<SourceType>,
    #[serde(default)]
    metadata: Metadata,
}

#[derive(Serialize)]
struct IndexResponse {
    source: String,
    chunks: usize,
    message: String,
}

async fn index_text(
    State(state): State<AppState>,
    Json(req): Json<IndexRequest>,
) -> Result<Json<IndexResponse>, ApiError> {
    let content = ProcessedContent {
        text: req.text,
        source: req.source.unwrap_or_else(|| "text".to_string()),
        source_type: req.source_type.unwrap_or(SourceType::Text),
        metadata: req.metadata,
        error: None,
    };

    index_content(&state, &content).await.map(Json)
}

async fn index_content(
    state: &AppState,
    content: &ProcessedContent,
) -> Result<IndexResponse, ApiError> {
    let timer = TimedOperation::start();
    let chunks = state.brain.index_processed(content).await.map_err(internal)?;
    state.metrics.record_ingest(timer.elapsed(), chunks);

    Ok(IndexResponse {
        source: content.source.clone(),
        chunks,
        message: Brain::indexing_confirmation(&content.source, content.source_type, chunks),
    })
}

#[derive(Deserialize)]
struct IngestPathRequest {
    path: String,
}

#[derive(Serialize)]
struct IngestedDocument {
    source: String,
    chunks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct IngestPathResponse {
    documents: Vec<IngestedDocument>,
    total_chunks: usize,
}

async fn ingest_path(
    State(state): State<AppState>,
    Json(req): Json<IngestPathRequest>,
) -> Result<Json<IngestPathResponse>, ApiError> {
    let root = tokio::fs::canonicalize(&state.ingest_root)
        .await
        .with_context(|| format!("Ingest root {} is unavailable", state.ingest_root.display()))
        .map_err(internal)?;

    // Relative paths resolve against the root; symlinks and `..` are resolved first
    let path = match tokio::fs::canonicalize(root.join(&req.path)).await {
        Ok(path) => path,
        Err(_) => return Err((StatusCode::NOT_FOUND, format!("No such path: {}", req.path))),
    };
    if !path.starts_with(&root) {
        warn!(path = %req.path, "Rejected path outside the ingest root");
        return Err((
            StatusCode::FORBIDDEN,
            format!("Path is outside the ingest root: {}", req.path),
        ));
    }

    let contents = if path.is_file() {
        let content = state
            .files
            .read_file(&path)
            .await
            .map_err(|e| bad_request(e.to_string()))?;
        vec![content]
    } else if path.is_dir() {
        state.files.read_directory(&path).await.map_err(internal)?
    } else {
        return Err((StatusCode::NOT_FOUND, format!("No such path: {}", req.path)));
    };

    let mut documents = Vec::with_capacity(contents.len());
    for content in &contents {
        match index_content(&state, content).await {
            Ok(indexed) => documents.push(IngestedDocument {
                source: indexed.source,
                chunks: indexed.chunks,
                error: None,
            }),
            Err((_, error)) => {
                warn!(source = %content.source, error = %error, "Skipping document");
                documents.push(IngestedDocument {
                    source: content.source.clone(),
                    chunks: 0,
                    error: Some(error),
                });
            }
        }
    }

    let total_chunks: usize = documents.iter().map(|d| d.chunks).sum();
    info!(path = %req.path, documents = documents.len(), total_chunks, "Ingested path");

    Ok(Json(IngestPathResponse {
        documents,
        total_chunks,
    }))
}

#[derive(Deserialize)]
struct IngestUrlRequest {
    url: String,
}

async fn ingest_url(
    State(state): State<AppState>,
    Json(req): Json<IngestUrlRequest>,
) -> Result<Json<IndexResponse>, ApiError> {
    let content = state.web.process(req.url.as_bytes(), None).await;
    if let Some(error) = &content.error {
        return Err((StatusCode::UNPROCESSABLE_ENTITY, error.clone()));
    }

    index_content(&state, &content).await.map(Json)
}

#[derive(Deserialize)]
struct QueryRequest {
    question: String,
}

#[derive(Serialize)]
struct QueryResponse {
    answer: String,
}

async fn answer_query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    if req.question.trim().is_empty() {
        return Err(bad_request("Question is empty"));
    }

    let timer = TimedOperation::start();
    let answer = state.brain.process_query(&req.question).await;
    state.metrics.record_query(timer.elapsed());

    Ok(Json(QueryResponse { answer }))
}

#[derive(Deserialize)]
struct SearchParams {
    q: String,
    limit: Option<usize>,
    source_type: Option<String>,
    min_certainty: Option<f32>,
}

async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<SearchResult>>, ApiError> {
    let source_type = params
        .source_type
        .as_deref()
        .map(str::parse::<SourceType>)
        .transpose()
        .map_err(|e| bad_request(e.to_string()))?;
    let min_certainty = params.min_certainty.unwrap_or(0.0);
    if !(0.0..=1.0).contains(&min_certainty) {
        return Err(bad_request("min_certainty must be between 0 and 1"));
    }
    let filter = SearchFilter {
        source_type,
        min_certainty,
    };
    let limit = params
        .limit
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .clamp(1, MAX_SEARCH_LIMIT);

    let timer = TimedOperation::start();
    let results = state
        .brain
        .search(&params.q, limit, &filter)
        .await
        .map_err(internal)?;
    state.metrics.record_search(timer.elapsed());

    Ok(Json(results))
}

async fn get_stats(State(state): State<AppState>) -> Json<KnowledgeStats> {
    Json(state.brain.get_stats().await)
}

#[derive(Serialize)]
struct EntityResponse {
    #[serde(flatten)]
    exploration: Exploration,
    #[serde(skip_serializing_if = "Option::is_none")]
    tree: Option<String>,
}

async fn explore_entity(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> (StatusCode, Json<EntityResponse>) {
    let exploration = state.ideas.explore_entity(&name).await;

    let (status, tree) = match &exploration {
        Exploration::Found {
            entity, related, ..
        } => (StatusCode::OK, Some(render_connections(&entity.name, related))),
        Exploration::NotFound { .. } => (StatusCode::NOT_FOUND, None),
    };

    (status, Json(EntityResponse { exploration, tree }))
}

#[derive(Deserialize)]
struct ConnectionParams {
    from: String,
    to: String,
}

async fn find_connections(
    State(state): State<AppState>,
    Query(params): Query<ConnectionParams>,
) -> Json<Connection> {
    Json(state.ideas.find_connections(&params.from, &params.to).await)
}

#[derive(Deserialize)]
struct IdeasRequest {
    topic: String,
    count: Option<usize>,
}

#[derive(Serialize)]
struct IdeasResponse {
    topic: String,
    ideas: Vec<Idea>,
}

async fn generate_ideas(
    State(state): State<AppState>,
    Json(req): Json<IdeasRequest>,
) -> Result<Json<IdeasResponse>, ApiError> {
    if req.topic.trim().is_empty() {
        return Err(bad_request("Topic is empty"));
    }
    let count = req.count.unwrap_or(DEFAULT_IDEA_COUNT).clamp(1, MAX_IDEA_COUNT);

    let timer = TimedOperation::start();
    let ideas = state.ideas.generate_ideas(&req.topic, count).await;
    state.metrics.record_ideas(timer.elapsed(), ideas.len());

    Ok(Json(IdeasResponse {
        topic: req.topic,
        ideas,
    }))
}

#[derive(Serialize)]
struct MetricsResponse {
    #[serde(flatten)]
    requests: MetricsSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    embedding_cache: Option<CacheStats>,
}

async fn get_metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        requests: state.metrics.snapshot(),
        embedding_cache: state.embedding_cache.as_ref().map(|cache| cache.stats()),
    })
}
