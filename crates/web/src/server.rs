//! Web server implementation

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, delete, get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use personatest_common::llm::{ChatModel, LlmClient};
use personatest_common::{is_valid_url, AppConfig, Audience, Error, Session, SessionDeps};

use crate::functions::{self, FunctionResponse, CORS_HEADERS};

/// Web server state
#[derive(Clone)]
pub struct WebServer {
    state: Arc<WebServerState>,
}

struct WebServerState {
    config: AppConfig,
    deps: SessionDeps,
    model: Arc<dyn ChatModel>,
    /// Live sessions: session id -> entry
    sessions: RwLock<HashMap<String, SessionEntry>>,
}

struct SessionEntry {
    session: Arc<Session>,
    last_seen: Instant,
}

/// Errors returned by API handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] Error),

    #[error("Session {0} not found")]
    SessionNotFound(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Core(e) => match e {
                Error::Validation(_) => StatusCode::BAD_REQUEST,
                Error::InvalidPersona(_) => StatusCode::UNPROCESSABLE_ENTITY,
                Error::NotFound { .. } => StatusCode::NOT_FOUND,
                Error::Locked(_) => StatusCode::CONFLICT,
                Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                e if e.is_upstream() => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = %self, "Request failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

type ApiResult = std::result::Result<Response, ApiError>;

pub async fn serve(addr: SocketAddr, config: AppConfig) -> anyhow::Result<()> {
    let server = WebServer::new(config)?;
    server.serve(addr).await
}

impl WebServer {
    /// Create a server with collaborators built from configuration
    pub fn new(config: AppConfig) -> personatest_common::Result<Self> {
        let deps = SessionDeps::from_config(&config)?;
        let model: Arc<dyn ChatModel> = Arc::new(LlmClient::from_config(&config.llm)?);
        Ok(Self::with_parts(config, deps, model))
    }

    /// Create a server with explicit collaborators
    pub fn with_parts(config: AppConfig, deps: SessionDeps, model: Arc<dyn ChatModel>) -> Self {
        Self {
            state: Arc::new(WebServerState {
                config,
                deps,
                model,
                sessions: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Create router
    pub fn router(&self) -> Router {
        // The generate function answers its own preflight requests
        let function_routes = Router::new()
            .route("/api/v1/functions/personas/generate", any(function_raw_handler))
            .route("/api/personas/generate", any(function_http_handler));

        Router::new()
            .route("/api/health", get(health_handler))
            .route("/api/validate", get(validate_handler))
            // Sessions
            .route("/api/sessions", post(create_session_handler))
            .route(
                "/api/sessions/:id",
                get(get_session_handler).delete(delete_session_handler),
            )
            .route("/api/sessions/:id/url", post(set_url_handler))
            .route("/api/sessions/:id/personas", post(add_persona_handler))
            .route("/api/sessions/:id/personas/:pid", delete(remove_persona_handler))
            .route("/api/sessions/:id/personas/:pid/lock", post(toggle_lock_handler))
            .route("/api/sessions/:id/personas/:pid/refresh", post(refresh_persona_handler))
            .route("/api/sessions/:id/shuffle", post(shuffle_handler))
            .route("/api/sessions/:id/test", post(start_testing_handler))
            .route("/api/sessions/:id/chat", post(chat_handler))
            .route("/api/sessions/:id/report", get(report_handler))
            .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
            .merge(function_routes)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Start the web server
    pub async fn serve(self, addr: SocketAddr) -> anyhow::Result<()> {
        info!("personatest API starting on http://{}", addr);

        let state = self.state.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(state.config.server.sweep_interval());
            loop {
                ticker.tick().await;
                let evicted = state.evict_idle(state.config.server.session_ttl()).await;
                if evicted > 0 {
                    info!(evicted, "Evicted idle sessions");
                }
            }
        });

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, self.router()).await?;

        Ok(())
    }
}

impl WebServerState {
    /// Look up a session and mark it as used
    async fn session(&self, id: &str) -> std::result::Result<Arc<Session>, ApiError> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .get_mut(id)
            .ok_or_else(|| ApiError::SessionNotFound(id.to_string()))?;
        entry.last_seen = Instant::now();
        Ok(entry.session.clone())
    }

    /// Register a session, evicting the least recently used one when full
    async fn insert(&self, session: Arc<Session>) {
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.config.server.max_sessions {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, entry)| entry.last_seen)
                .map(|(id, _)| id.clone());
            if let Some(oldest) = oldest {
                sessions.remove(&oldest);
                info!(session = %oldest, "Evicted least recently used session");
            }
        }
        sessions.insert(
            session.id().to_string(),
            SessionEntry {
                session,
                last_seen: Instant::now(),
            },
        );
    }

    /// Drop sessions untouched for `ttl`. Sessions with work in progress stay.
    async fn evict_idle(&self, ttl: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|id, entry| {
            let keep = entry.last_seen.elapsed() < ttl || entry.session.is_loading();
            if !keep {
                debug!(session = %id, "Session expired");
            }
            keep
        });
        before - sessions.len()
    }
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct WaitQuery {
    /// Run the operation to completion before responding
    #[serde(default)]
    wait: bool,
}

fn accepted(session: &Session) -> Response {
    (StatusCode::ACCEPTED, Json(session.snapshot())).into_response()
}

/// Run `op` in the background, logging its failure
fn spawn_logged<F, T>(what: &'static str, op: F)
where
    F: std::future::Future<Output = personatest_common::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = op.await {
            warn!(operation = what, error = %e, "Background operation failed");
        }
    });
}

async fn health_handler(State(state): State<Arc<WebServerState>>) -> impl IntoResponse {
    let sessions = state.sessions.read().await.len();
    Json(serde_json::json!({
        "status": "ok",
        "service": "personatest-web",
        "version": personatest_common::VERSION,
        "sessions": sessions,
        "time": Utc::now().to_rfc3339(),
    }))
}

#[derive(Debug, Deserialize)]
struct ValidateQuery {
    #[serde(default)]
    url: String,
}

async fn validate_handler(Query(query): Query<ValidateQuery>) -> impl IntoResponse {
    Json(serde_json::json!({ "url": query.url, "valid": is_valid_url(&query.url) }))
}

async fn create_session_handler(State(state): State<Arc<WebServerState>>) -> impl IntoResponse {
    let session = Arc::new(Session::new(state.config.session.clone(), state.deps.clone()));
    let snapshot = session.snapshot();
    state.insert(session).await;
    info!(session = %snapshot.id, "Session created");
    (StatusCode::CREATED, Json(snapshot))
}

async fn get_session_handler(
    State(state): State<Arc<WebServerState>>,
    Path(id): Path<String>,
) -> ApiResult {
    let session = state.session(&id).await?;
    Ok(Json(session.snapshot()).into_response())
}

async fn delete_session_handler(
    State(state): State<Arc<WebServerState>>,
    Path(id): Path<String>,
) -> ApiResult {
    match state.sessions.write().await.remove(&id) {
        Some(_) => {
            info!(session = %id, "Session deleted");
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        None => Err(ApiError::SessionNotFound(id)),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetUrlRequest {
    url: String,
    #[serde(default)]
    persona_type: Option<Audience>,
}

async fn set_url_handler(
    State(state): State<Arc<WebServerState>>,
    Path(id): Path<String>,
    Query(query): Query<WaitQuery>,
    Json(req): Json<SetUrlRequest>,
) -> ApiResult {
    let session = state.session(&id).await?;
    if let Some(audience) = req.persona_type {
        session.set_persona_type(audience);
    }

    if query.wait {
        let outcome = session.set_url(&req.url).await?;
        return Ok(Json(serde_json::json!({
            "outcome": outcome,
            "session": session.snapshot(),
        }))
        .into_response());
    }

    let background = session.clone();
    tokio::spawn(async move {
        match background.set_url(&req.url).await {
            Ok(outcome) => debug!(?outcome, "URL processed"),
            Err(e) => warn!(error = %e, "URL processing failed"),
        }
    });
    Ok(accepted(&session))
}

async fn add_persona_handler(
    State(state): State<Arc<WebServerState>>,
    Path(id): Path<String>,
    Query(query): Query<WaitQuery>,
) -> ApiResult {
    let session = state.session(&id).await?;
    if query.wait {
        let persona_id = session.add_persona().await?;
        return Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": persona_id }))).into_response());
    }
    let background = session.clone();
    spawn_logged("add", async move { background.add_persona().await });
    Ok(accepted(&session))
}

async fn remove_persona_handler(
    State(state): State<Arc<WebServerState>>,
    Path((id, pid)): Path<(String, String)>,
) -> ApiResult {
    let session = state.session(&id).await?;
    let removed = session.remove_persona(&pid)?;
    Ok(Json(removed).into_response())
}

async fn toggle_lock_handler(
    State(state): State<Arc<WebServerState>>,
    Path((id, pid)): Path<(String, String)>,
) -> ApiResult {
    let session = state.session(&id).await?;
    let locked = session.toggle_lock(&pid)?;
    Ok(Json(serde_json::json!({ "id": pid, "isLocked": locked })).into_response())
}

async fn refresh_persona_handler(
    State(state): State<Arc<WebServerState>>,
    Path((id, pid)): Path<(String, String)>,
    Query(query): Query<WaitQuery>,
) -> ApiResult {
    let session = state.session(&id).await?;
    {
        let collection = session.collection().lock();
        let persona = collection
            .get(&pid)
            .ok_or_else(|| Error::not_found("persona", &pid))?;
        if persona.is_locked {
            return Err(Error::Locked(pid).into());
        }
    }

    if query.wait {
        session.refresh_persona(&pid).await?;
        return Ok(Json(session.snapshot()).into_response());
    }
    let background = session.clone();
    spawn_logged("refresh", async move { background.refresh_persona(&pid).await });
    Ok(accepted(&session))
}

async fn shuffle_handler(
    State(state): State<Arc<WebServerState>>,
    Path(id): Path<String>,
    Query(query): Query<WaitQuery>,
) -> ApiResult {
    let session = state.session(&id).await?;
    if query.wait {
        let shuffled = session.shuffle().await?;
        return Ok(Json(serde_json::json!({ "shuffled": shuffled })).into_response());
    }
    let background = session.clone();
    spawn_logged("shuffle", async move { background.shuffle().await });
    Ok(accepted(&session))
}

async fn start_testing_handler(
    State(state): State<Arc<WebServerState>>,
    Path(id): Path<String>,
    Query(query): Query<WaitQuery>,
) -> ApiResult {
    let session = state.session(&id).await?;
    if query.wait {
        let report = session.start_testing().await?;
        return Ok(Json(report).into_response());
    }
    let background = session.clone();
    spawn_logged("test", async move { background.start_testing().await });
    Ok(accepted(&session))
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
}

async fn chat_handler(
    State(state): State<Arc<WebServerState>>,
    Path(id): Path<String>,
    Query(query): Query<WaitQuery>,
    Json(req): Json<ChatRequest>,
) -> ApiResult {
    let session = state.session(&id).await?;
    if req.message.trim().is_empty() {
        return Err(Error::Validation("message is empty".into()).into());
    }
    if query.wait {
        let summary = session.ask(&req.message).await?;
        return Ok(Json(serde_json::json!({ "summary": summary })).into_response());
    }
    let background = session.clone();
    spawn_logged("chat", async move { background.ask(&req.message).await });
    Ok(accepted(&session))
}

async fn report_handler(
    State(state): State<Arc<WebServerState>>,
    Path(id): Path<String>,
) -> ApiResult {
    let session = state.session(&id).await?;
    let report = session.report().ok_or_else(|| Error::not_found("report", &id))?;
    Ok(Json(report).into_response())
}

// ============================================================================
// Generate function
// ============================================================================

fn with_cors(mut response: Response) -> Response {
    let headers = response.headers_mut();
    for (name, value) in CORS_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }
    response
}

async fn run_function(state: &WebServerState, method: Method, body: &str) -> std::result::Result<FunctionResponse, Response> {
    if method == Method::OPTIONS {
        return Err(with_cors(StatusCode::NO_CONTENT.into_response()));
    }
    if method != Method::POST {
        return Err(with_cors(
            (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed").into_response(),
        ));
    }

    let args: Value = if body.trim().is_empty() {
        Value::Object(Default::default())
    } else {
        match serde_json::from_str(body) {
            Ok(args) => args,
            Err(e) => {
                let response = (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({ "error": format!("Invalid request body: {}", e) })),
                )
                    .into_response();
                return Err(with_cors(response));
            }
        }
    };

    Ok(functions::invoke(args, state.model.as_ref()).await)
}

/// Returns the `{statusCode, body}` envelope with HTTP 200
async fn function_raw_handler(
    State(state): State<Arc<WebServerState>>,
    method: Method,
    body: String,
) -> Response {
    match run_function(&state, method, &body).await {
        Ok(envelope) => with_cors((StatusCode::OK, Json(envelope)).into_response()),
        Err(response) => response,
    }
}

/// Maps the envelope onto the HTTP status and body
async fn function_http_handler(
    State(state): State<Arc<WebServerState>>,
    method: Method,
    body: String,
) -> Response {
    match run_function(&state, method, &body).await {
        Ok(envelope) => {
            let status = StatusCode::from_u16(envelope.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let mut response = (status, Json(envelope.body)).into_response();
            response
                .headers_mut()
                .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
            with_cors(response)
        }
        Err(response) => response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use personatest_common::config::SessionConfig;
    use personatest_common::testing::{ScriptedEvaluator, ScriptedModel, ScriptedSource, StaticAvailability};
    use tower::ServiceExt;

    fn server_with(model: ScriptedModel) -> WebServer {
        server_with_config(AppConfig::default(), model)
    }

    fn server_with_config(mut config: AppConfig, model: ScriptedModel) -> WebServer {
        config.session = SessionConfig {
            persona_count: 3,
            chat_delay_min_ms: 0,
            chat_delay_max_ms: 5,
            ..Default::default()
        };
        let deps = SessionDeps {
            source: Arc::new(ScriptedSource::new()),
            availability: Arc::new(StaticAvailability(true)),
            evaluator: Arc::new(ScriptedEvaluator::new()),
        };
        WebServer::with_parts(config, deps, Arc::new(model))
    }

    async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn ready_session(router: &Router) -> String {
        let (status, created) = send(router, "POST", "/api/sessions", None).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_str().unwrap().to_string();
        let (status, body) = send(
            router,
            "POST",
            &format!("/api/sessions/{}/url?wait=true", id),
            Some(serde_json::json!({"url": "github.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "ready");
        id
    }

    #[tokio::test]
    async fn test_health() {
        let router = server_with(ScriptedModel::new()).router();
        let (status, body) = send(&router, "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_validate() {
        let router = server_with(ScriptedModel::new()).router();
        let (_, body) = send(&router, "GET", "/api/validate?url=github.com", None).await;
        assert_eq!(body["valid"], true);
        let (_, body) = send(&router, "GET", "/api/validate?url=nope", None).await;
        assert_eq!(body["valid"], false);
    }

    #[tokio::test]
    async fn test_session_flow() {
        let router = server_with(ScriptedModel::new()).router();
        let id = ready_session(&router).await;

        let (_, snapshot) = send(&router, "GET", &format!("/api/sessions/{}", id), None).await;
        let personas = snapshot["personas"].as_array().unwrap();
        assert_eq!(personas.len(), 3);
        let first = personas[0]["id"].as_str().unwrap().to_string();

        let (status, body) = send(&router, "POST", &format!("/api/sessions/{}/personas/{}/lock", id, first), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isLocked"], true);

        let (status, _) = send(&router, "POST", &format!("/api/sessions/{}/personas/{}/refresh", id, first), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, report) = send(&router, "POST", &format!("/api/sessions/{}/test?wait=true", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["totalTests"], 3);
        assert_eq!(report["completedTests"], 3);

        let (status, report) = send(&router, "GET", &format!("/api/sessions/{}/report", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["overallScore"], 75);

        let (status, body) = send(
            &router,
            "POST",
            &format!("/api/sessions/{}/chat?wait=true", id),
            Some(serde_json::json!({"message": "what do you think?"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["summary"].as_str().unwrap().starts_with("Here's what our personas think:"));

        let (status, _) = send(&router, "DELETE", &format!("/api/sessions/{}/personas/{}", id, first), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&router, "DELETE", &format!("/api/sessions/{}", id), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&router, "GET", &format!("/api/sessions/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_report_missing_before_test() {
        let router = server_with(ScriptedModel::new()).router();
        let id = ready_session(&router).await;
        let (status, body) = send(&router, "GET", &format!("/api/sessions/{}/report", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].is_string());
    }

    async fn create(router: &Router) -> String {
        let (status, created) = send(router, "POST", "/api/sessions", None).await;
        assert_eq!(status, StatusCode::CREATED);
        created["id"].as_str().unwrap().to_string()
    }

    async fn exists(router: &Router, id: &str) -> bool {
        let (status, _) = send(router, "GET", &format!("/api/sessions/{}", id), None).await;
        status == StatusCode::OK
    }

    #[tokio::test]
    async fn test_idle_sessions_are_evicted() {
        let server = server_with(ScriptedModel::new());
        let router = server.router();
        let first = create(&router).await;
        let second = create(&router).await;

        assert_eq!(server.state.evict_idle(Duration::from_secs(3600)).await, 0);
        assert!(exists(&router, &first).await);

        assert_eq!(server.state.evict_idle(Duration::ZERO).await, 2);
        assert!(!exists(&router, &first).await);
        assert!(!exists(&router, &second).await);
        let (_, health) = send(&router, "GET", "/api/health", None).await;
        assert_eq!(health["sessions"], 0);
    }

    #[tokio::test]
    async fn test_session_cap_evicts_least_recently_used() {
        let mut config = AppConfig::default();
        config.server.max_sessions = 2;
        let router = server_with_config(config, ScriptedModel::new()).router();
        let pause = || tokio::time::sleep(Duration::from_millis(5));

        let first = create(&router).await;
        pause().await;
        let second = create(&router).await;
        pause().await;
        assert!(exists(&router, &first).await);
        pause().await;
        let third = create(&router).await;

        assert!(exists(&router, &first).await);
        assert!(!exists(&router, &second).await);
        assert!(exists(&router, &third).await);
        let (_, health) = send(&router, "GET", "/api/health", None).await;
        assert_eq!(health["sessions"], 2);
    }

    #[tokio::test]
    async fn test_generator_client_accepts_function_output() {
        let persona = |name: &str| {
            serde_json::json!({
                "name": name,
                "avatar": "https://images.unsplash.com/photo-1500648767791-00dcc994a43e",
                "type": "Casual Shopper",
                "description": "Browses on the commute",
                "demographics": {
                    "age": 41, "gender": "Male", "occupation": "Nurse",
                    "education": "BSc", "location": "Leeds, UK"
                },
                "goals": ["Find deals"],
                "frustrations": ["Pop-ups"],
                "behaviors": ["Shops on mobile"],
                "motivations": ["Saving time"],
                "techProficiency": "Medium",
                "preferredChannels": ["Email"]
            })
            .to_string()
        };
        let model = ScriptedModel::new().respond(persona("Tom")).respond(persona("Priya"));
        let router = server_with(model).router();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await });

        let client = personatest_common::GeneratorClient::new(
            format!("http://{}/api/personas/generate", addr),
            Duration::from_secs(5),
        )
        .unwrap();
        let personas = client.generate("github.com", 2, Audience::Random).await.unwrap();
        assert_eq!(personas.len(), 2);
        let mut names: Vec<&str> = personas.iter().map(|p| p.name()).collect();
        names.sort();
        assert_eq!(names, ["Priya", "Tom"]);
        let details = personas[0].content.details.as_ref().unwrap();
        assert_eq!(details.goals, vec!["Find deals".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let router = server_with(ScriptedModel::new()).router();
        let (status, _) = send(&router, "POST", "/api/sessions/missing/shuffle", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_function_methods() {
        let router = server_with(ScriptedModel::new()).router();

        let request = Request::builder()
            .method("OPTIONS")
            .uri("/api/v1/functions/personas/generate")
            .body(Body::empty())
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()["access-control-allow-methods"], "POST, OPTIONS");

        let (status, _) = send(&router, "GET", "/api/v1/functions/personas/generate", None).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_function_envelopes() {
        let router = server_with(ScriptedModel::new()).router();

        let (status, envelope) = send(
            &router,
            "POST",
            "/api/v1/functions/personas/generate",
            Some(serde_json::json!({"count": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(envelope["statusCode"], 400);
        assert_eq!(envelope["body"]["error"], "URL is required");

        let (status, body) = send(
            &router,
            "POST",
            "/api/personas/generate",
            Some(serde_json::json!({"count": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "URL is required");
    }
}
