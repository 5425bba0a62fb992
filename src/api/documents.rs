//! Document and knowledge base endpoints

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiResponse, ApiState};

/// Build documents router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/documents", get(list_documents))
        .route("/api/documents/{id}", get(get_document))
        .route("/api/document", get(current_document).post(reload_document))
        .route("/document.txt", get(document_text))
        .with_state(state)
}

/// Entry in the document listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: String,
    pub title: String,
}

/// A document with its text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentBody {
    pub id: String,
    pub title: String,
    pub content: String,
}

/// Document text only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentContent {
    pub content: String,
}

/// Replacement document
#[derive(Debug, Deserialize)]
pub struct ReloadRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

async fn list_documents(
    State(state): State<Arc<ApiState>>,
) -> Json<ApiResponse<Vec<DocumentSummary>>> {
    let title = state.resolver.lock().await.document().title().to_string();

    Json(ApiResponse::ok(vec![DocumentSummary {
        id: state.document_id.clone(),
        title,
    }]))
}

/// Serve the knowledge base under `{id}_responses`, else the document itself
async fn get_document(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    if id == state.knowledge_id() {
        let kb = state.knowledge.as_ref().ok_or_else(|| {
            ApiError::NotFound(format!("no structured responses for {}", state.document_id))
        })?;
        return Ok(Json(ApiResponse::ok(kb.to_file())).into_response());
    }

    if id != state.document_id {
        tracing::debug!(id = %id, "unknown document requested");
        return Err(ApiError::NotFound(format!("document not found: {id}")));
    }

    let body = {
        let resolver = state.resolver.lock().await;
        DocumentBody {
            id,
            title: resolver.document().title().to_string(),
            content: resolver.document().content().to_string(),
        }
    };

    Ok(Json(ApiResponse::ok(body)).into_response())
}

async fn current_document(
    State(state): State<Arc<ApiState>>,
) -> Json<ApiResponse<DocumentContent>> {
    let content = state.resolver.lock().await.document().content().to_string();
    Json(ApiResponse::ok(DocumentContent { content }))
}

/// Replace the document and drop every cached answer
async fn reload_document(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<ReloadRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<DocumentSummary>>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let content = request
        .content
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Invalid or missing content".to_string()))?;

    let mut resolver = state.resolver.lock().await;
    let title = request
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| resolver.document().title().to_string());

    resolver.load_document(title.clone(), content);

    Ok(Json(ApiResponse::ok(DocumentSummary {
        id: state.document_id.clone(),
        title,
    })))
}

async fn document_text(State(state): State<Arc<ApiState>>) -> Response {
    let content = state.resolver.lock().await.document().content().to_string();

    if content.is_empty() {
        return (StatusCode::NOT_FOUND, "No document loaded").into_response();
    }

    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        content,
    )
        .into_response()
}
