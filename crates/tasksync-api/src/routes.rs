use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tasksync_core::db::TaskStore;
use tasksync_core::services::TaskService;
use tasksync_core::sync::{SyncEngine, SyncResult};
use tasksync_core::{NewTask, Task, TaskChanges, TaskId};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{extract_bearer_token, user_fingerprint, AuthenticatedUser, JwtVerifier};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::rate_limit::{EndpointRateLimiter, ProtectedEndpoint, RateLimitMetricsSnapshot};

const DEFAULT_PAGE_SIZE: usize = 100;
const MAX_PAGE_SIZE: usize = 500;
// Direct edits carry no client version, so a lost race is simply retried.
const EDIT_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    engine: SyncEngine<TaskService>,
    jwt_verifier: Arc<JwtVerifier>,
    endpoint_rate_limiter: Arc<EndpointRateLimiter>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, tasks: TaskService) -> Self {
        Self {
            engine: SyncEngine::with_policy(tasks, config.sync_policy),
            jwt_verifier: Arc::new(JwtVerifier::from_config(&config)),
            endpoint_rate_limiter: Arc::new(EndpointRateLimiter::from_config(&config)),
            config,
        }
    }

    fn tasks(&self) -> &TaskService {
        self.engine.store()
    }
}

pub fn app_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/sync", post(sync_operations))
        .route("/tasks", get(list_tasks).post(create_task))
        .route(
            "/tasks/{id}",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/v1", protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    rate_limit: RateLimitMetricsSnapshot,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
        rate_limit: state.endpoint_rate_limiter.metrics_snapshot(),
    })
}

async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(request.headers())?;
    let user = state.jwt_verifier.verify_access_token(token)?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

// Entries stay untyped so the engine can reject them one at a time.
#[derive(Debug, Deserialize)]
struct SyncRequest {
    operations: Vec<Value>,
}

async fn sync_operations(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    body: Result<Json<SyncRequest>, JsonRejection>,
) -> Result<Json<SyncResult>, AppError> {
    state
        .endpoint_rate_limiter
        .check(ProtectedEndpoint::Sync, &user.user_id)
        .await?;

    let Json(request) = body.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
    let max = state.config.sync_max_operations;
    if request.operations.len() > max {
        return Err(AppError::bad_request(format!(
            "A sync batch may contain at most {max} operations"
        )));
    }

    let submitted = request.operations.len();
    let result = state.engine.process(&user.user_id, request.operations).await;
    tracing::info!(
        endpoint = "sync",
        user = user_fingerprint(&user.user_id),
        session = user.session_id.as_deref().unwrap_or("none"),
        submitted,
        synced = result.synced_count,
        conflicts = result.conflicts.len(),
        "Processed sync batch"
    );
    Ok(Json(result))
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    skip: Option<usize>,
    limit: Option<usize>,
}

async fn list_tasks(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Task>>, AppError> {
    state
        .endpoint_rate_limiter
        .check(ProtectedEndpoint::Tasks, &user.user_id)
        .await?;

    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let tasks = state
        .tasks()
        .list(&user.user_id, limit, query.skip.unwrap_or(0))
        .await?;
    Ok(Json(tasks))
}

async fn get_task(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> Result<Json<Task>, AppError> {
    state
        .endpoint_rate_limiter
        .check(ProtectedEndpoint::Tasks, &user.user_id)
        .await?;

    let task = find_owned(&state, &user, &id).await?;
    Ok(Json(task))
}

async fn create_task(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    body: Result<Json<NewTask>, JsonRejection>,
) -> Result<(StatusCode, Json<Task>), AppError> {
    state
        .endpoint_rate_limiter
        .check(ProtectedEndpoint::Tasks, &user.user_id)
        .await?;

    let Json(fields) = body.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
    if fields.title.trim().is_empty() {
        return Err(AppError::bad_request("Task title must not be empty"));
    }

    if let Some(client_id) = fields.client_id.as_deref() {
        if let Some(existing) = state
            .tasks()
            .find_by_client_id(&user.user_id, client_id)
            .await?
        {
            return Ok((StatusCode::OK, Json(existing)));
        }
    }

    let task = state.tasks().insert(&user.user_id, fields).await?;
    tracing::info!(
        endpoint = "tasks_create",
        user = user_fingerprint(&user.user_id),
        task_id = %task.id,
        "Created task"
    );
    Ok((StatusCode::CREATED, Json(task)))
}

async fn update_task(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    body: Result<Json<TaskChanges>, JsonRejection>,
) -> Result<Json<Task>, AppError> {
    state
        .endpoint_rate_limiter
        .check(ProtectedEndpoint::Tasks, &user.user_id)
        .await?;

    let Json(changes) = body.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
    if changes
        .title
        .as_deref()
        .is_some_and(|title| title.trim().is_empty())
    {
        return Err(AppError::bad_request("Task title must not be empty"));
    }

    let mut attempt = 1;
    loop {
        let current = find_owned(&state, &user, &id).await?;
        match state.tasks().mutate(&current, &changes).await {
            Ok(task) => return Ok(Json(task)),
            Err(tasksync_core::Error::StaleVersion { .. }) if attempt < EDIT_ATTEMPTS => {
                tracing::debug!(task_id = %current.id, attempt, "Retrying direct edit after lost race");
                attempt += 1;
            }
            Err(error) => return Err(error.into()),
        }
    }
}

async fn delete_task(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state
        .endpoint_rate_limiter
        .check(ProtectedEndpoint::Tasks, &user.user_id)
        .await?;

    let task = find_owned(&state, &user, &id).await?;
    state.tasks().delete(&task).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Malformed ids and other owners' tasks are indistinguishable from missing ones.
async fn find_owned(
    state: &AppState,
    user: &AuthenticatedUser,
    raw_id: &str,
) -> Result<Task, AppError> {
    let not_found = || AppError::not_found(format!("Task {raw_id}"));
    let id = raw_id.parse::<TaskId>().map_err(|_| not_found())?;
    state
        .tasks()
        .find_by_id(&user.user_id, &id)
        .await?
        .ok_or_else(not_found)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tasksync_core::sync::{Conflict, ServerUpdate};

    use super::*;

    async fn state_with(overrides: &[(&str, &str)]) -> AppState {
        let mut map = HashMap::from([(
            "TASKSYNC_JWT_SECRET",
            "test-secret-that-is-long-enough-0123456789",
        )]);
        map.extend(overrides.iter().copied());
        let config = AppConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string()))
            .unwrap();
        let tasks = TaskService::open_in_memory().await.unwrap();
        AppState::new(Arc::new(config), tasks)
    }

    fn user(id: &str) -> Extension<AuthenticatedUser> {
        Extension(AuthenticatedUser {
            user_id: id.to_string(),
            session_id: None,
        })
    }

    fn sync_body(operations: serde_json::Value) -> Result<Json<SyncRequest>, JsonRejection> {
        Ok(Json(
            serde_json::from_value(json!({ "operations": operations })).unwrap(),
        ))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sync_endpoint_applies_batch_for_caller() {
        let state = state_with(&[]).await;

        let Json(result) = sync_operations(
            State(state.clone()),
            user("alice"),
            sync_body(json!([
                { "type": "create", "client_id": "c1", "payload": { "title": "Buy milk" } },
                { "type": "update", "client_id": "c1", "payload": { "version": 1, "completed": true } },
            ])),
        )
        .await
        .unwrap();

        assert_eq!(result.synced_count, 2);
        assert!(result.conflicts.is_empty());
        let ServerUpdate::Create { server_id, .. } = &result.server_updates[0] else {
            panic!("expected create update first");
        };

        let stored = state
            .tasks()
            .find_by_id("alice", server_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.version, 2);
        assert!(stored.completed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sync_endpoint_isolates_mistyped_operations() {
        let state = state_with(&[]).await;

        let Json(result) = sync_operations(
            State(state.clone()),
            user("alice"),
            sync_body(json!([
                { "type": "create", "client_id": "c1", "payload": { "title": "first" } },
                { "type": "update", "client_id": "c1", "payload": { "version": "2" } },
                { "type": "create", "client_id": "c3", "payload": { "title": "third" } },
            ])),
        )
        .await
        .unwrap();

        assert_eq!(result.synced_count, 2);
        let [Conflict::Error { operation, .. }] = result.conflicts.as_slice() else {
            panic!("expected a single error conflict");
        };
        assert_eq!(operation["payload"]["version"], "2");
        assert_eq!(state.tasks().list("alice", 10, 0).await.unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sync_endpoint_rejects_oversized_batch() {
        let state = state_with(&[("TASKSYNC_SYNC_MAX_OPERATIONS", "1")]).await;

        let err = sync_operations(
            State(state),
            user("alice"),
            sync_body(json!([
                { "type": "create", "client_id": "c1", "payload": { "title": "a" } },
                { "type": "create", "client_id": "c2", "payload": { "title": "b" } },
            ])),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sync_endpoint_scopes_operations_to_caller() {
        let state = state_with(&[]).await;
        let task = state
            .tasks()
            .insert("alice", NewTask::titled("Private"))
            .await
            .unwrap();

        let Json(result) = sync_operations(
            State(state),
            user("mallory"),
            sync_body(json!([
                { "type": "update", "payload": { "id": task.id.as_str(), "version": 1, "title": "Mine" } },
            ])),
        )
        .await
        .unwrap();

        assert_eq!(result.synced_count, 0);
        assert!(matches!(result.conflicts[0], Conflict::NotFound { .. }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sync_endpoint_is_rate_limited() {
        let state = state_with(&[("TASKSYNC_SYNC_RATE_LIMIT_PER_WINDOW", "1")]).await;

        sync_operations(State(state.clone()), user("alice"), sync_body(json!([])))
            .await
            .unwrap();
        let err = sync_operations(State(state.clone()), user("alice"), sync_body(json!([])))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::TooManyRequests(_, _)));
        let Json(health) = healthz(State(state)).await;
        assert_eq!(health.rate_limit.sync_limited, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_task_is_idempotent_on_client_id() {
        let state = state_with(&[]).await;
        let fields = NewTask::titled("Buy milk").with_client_id("c1");

        let (status, Json(first)) =
            create_task(State(state.clone()), user("alice"), Ok(Json(fields.clone())))
                .await
                .unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let (status, Json(second)) = create_task(State(state), user("alice"), Ok(Json(fields)))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second.id, first.id);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_task_rejects_blank_title() {
        let state = state_with(&[]).await;

        let err = create_task(State(state), user("alice"), Ok(Json(NewTask::titled("   "))))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn update_task_bumps_version() {
        let state = state_with(&[]).await;
        let task = state
            .tasks()
            .insert("alice", NewTask::titled("Buy milk"))
            .await
            .unwrap();

        let changes = TaskChanges {
            completed: Some(true),
            ..TaskChanges::default()
        };
        let Json(updated) = update_task(
            State(state),
            user("alice"),
            Path(task.id.as_str()),
            Ok(Json(changes)),
        )
        .await
        .unwrap();

        assert_eq!(updated.version, 2);
        assert!(updated.completed);
        assert_eq!(updated.title, "Buy milk");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn task_lookups_hide_other_owners_and_bad_ids() {
        let state = state_with(&[]).await;
        let task = state
            .tasks()
            .insert("alice", NewTask::titled("Private"))
            .await
            .unwrap();

        let err = get_task(State(state.clone()), user("bob"), Path(task.id.as_str()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = get_task(State(state), user("alice"), Path("not-a-uuid".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_then_list_omits_task() {
        let state = state_with(&[]).await;
        let keep = state
            .tasks()
            .insert("alice", NewTask::titled("Keep"))
            .await
            .unwrap();
        let gone = state
            .tasks()
            .insert("alice", NewTask::titled("Drop"))
            .await
            .unwrap();

        let status = delete_task(State(state.clone()), user("alice"), Path(gone.id.as_str()))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        let err = delete_task(State(state.clone()), user("alice"), Path(gone.id.as_str()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let Json(tasks) = list_tasks(State(state), user("alice"), Query(ListQuery::default()))
            .await
            .unwrap();
        let ids: Vec<_> = tasks.iter().map(|task| task.id).collect();
        assert_eq!(ids, vec![keep.id]);
    }
}
