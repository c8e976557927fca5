use super::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;

/// Query params for `GET /create-task`. Both are required; they stay
/// optional here so a missing value maps to a readable 400 instead of a
/// rejection from the extractor.
#[derive(Deserialize)]
pub struct CreateTaskQuery {
    pub contents: Option<String>,
    #[serde(rename = "scoreDifference")]
    pub score_difference: Option<u32>,
}

/// GET /health — liveness only, no state leaked
pub(super) async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /create-task — create a task and wait for its confirmed response
pub(super) async fn handle_create_task(
    State(state): State<AppState>,
    Query(query): Query<CreateTaskQuery>,
) -> impl IntoResponse {
    let (Some(contents), Some(score_difference)) = (query.contents, query.score_difference) else {
        let err = serde_json::json!({
            "error": "Missing required parameters: contents and scoreDifference"
        });
        return (StatusCode::BAD_REQUEST, Json(err));
    };

    match state
        .service
        .create_and_await(&contents, score_difference)
        .await
    {
        Ok(created) => {
            let body = serde_json::json!({
                "status": "success",
                "transactionHash": created.transaction_hash,
                "response": {
                    "taskIndex": created.response.task_index,
                    "textResponse": created.response.text_response,
                    "gameIdResponse": created.response.game_id,
                    "targetScoreResponse": created.response.target_score,
                    "responder": created.response.responder,
                },
            });
            (StatusCode::OK, Json(body))
        }
        Err(e) => {
            tracing::error!(error = %e, "create-task failed");
            let err = serde_json::json!({ "error": e.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(err))
        }
    }
}
