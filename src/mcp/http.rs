//! Transportes HTTP do servidor MCP.
//!
//! - Streamable HTTP: `POST /mcp` (mensagens), `GET /mcp` (stream SSE do
//!   servidor) e `DELETE /mcp` (encerra a sessão), com o header
//!   `mcp-session-id` emitido no `initialize`.
//! - SSE legado: `GET /sse` abre o stream e anuncia o endpoint
//!   `POST /messages?sessionId=<id>`.
//! - `GET /` e `GET /status` devolvem resumos em JSON.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::framing::SanitizingCodec;
use crate::types::config::Config;
use crate::{CriticaError, CriticaResult};

use super::dispatcher::RpcDispatcher;
use super::protocol::JsonRpcOutput;
use super::server::shutdown_signal;
use super::session::SessionRegistry;
use super::tools::ToolHandler;
use super::transport::{Inbound, TransportKind};

/// Header com o id da sessão streamable HTTP.
pub const SESSION_HEADER: &str = "mcp-session-id";

/// Sem sessão válida no pedido.
const NO_SESSION: i32 = -32000;

/// Sessão inexistente ou já encerrada.
const UNKNOWN_SESSION: i32 = -32001;

/// Estado compartilhado pelos handlers.
struct HttpState {
    dispatcher: Arc<RpcDispatcher>,
    sessions: Arc<SessionRegistry>,
    keep_alive: Duration,
    started_at: DateTime<Utc>,
}

/// Servidor MCP sobre HTTP.
pub struct HttpServer {
    state: Arc<HttpState>,
    addr: String,
    bind_attempts: u32,
    bind_retry_delay: Duration,
}

impl HttpServer {
    /// Cria o servidor. Falha se nenhum provedor LLM estiver configurado.
    pub fn new(config: &Config) -> CriticaResult<Self> {
        let tools = ToolHandler::new(config)?;
        Ok(Self::with_dispatcher(Arc::new(RpcDispatcher::new(tools)), config))
    }

    /// Cria o servidor com um dispatcher já montado.
    pub fn with_dispatcher(dispatcher: Arc<RpcDispatcher>, config: &Config) -> Self {
        let sessions = SessionRegistry::new(
            SanitizingCodec::shared(&config.framing),
            &config.framing,
            config.server.max_sessions,
        )
        .with_idle_timeout(Duration::from_secs(config.server.session_idle_timeout_secs));

        Self {
            state: Arc::new(HttpState {
                dispatcher,
                sessions: Arc::new(sessions),
                keep_alive: Duration::from_secs(config.server.keep_alive_secs.max(1)),
                started_at: Utc::now(),
            }),
            addr: format!("{}:{}", config.server.host, config.server.port),
            bind_attempts: config.server.bind_attempts.max(1),
            bind_retry_delay: Duration::from_millis(config.server.bind_retry_delay_ms),
        }
    }

    /// Router com todas as rotas, CORS e trace.
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers([HeaderName::from_static(SESSION_HEADER)]);

        Router::new()
            .route("/", get(handle_info))
            .route("/status", get(handle_status))
            .route(
                "/mcp",
                post(handle_mcp_post)
                    .get(handle_mcp_get)
                    .delete(handle_mcp_delete),
            )
            .route("/sse", get(handle_sse))
            .route("/messages", post(handle_messages))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .with_state(self.state.clone())
    }

    /// Escuta até Ctrl-C/SIGTERM.
    pub async fn run(self) -> CriticaResult<()> {
        let listener = bind_with_retries(&self.addr, self.bind_attempts, self.bind_retry_delay).await?;
        info!(addr = %self.addr, "Critica MCP server listening (streamable HTTP at /mcp, SSE at /sse)");

        let sweeper = self
            .state
            .sessions
            .idle_timeout()
            .map(|idle| tokio::spawn(sweep_sessions(self.state.sessions.clone(), idle)));

        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await;

        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }
        served?;

        self.state.sessions.close_all().await;
        info!("Critica MCP server stopped");
        Ok(())
    }
}

/// Remove periodicamente as sessões ociosas.
async fn sweep_sessions(sessions: Arc<SessionRegistry>, idle: Duration) {
    let period = (idle / 2).clamp(Duration::from_secs(1), Duration::from_secs(60));
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        let evicted = sessions.evict_expired(Utc::now()).await;
        if evicted > 0 {
            debug!(evicted, "Idle sessions swept");
        }
    }
}

async fn bind_with_retries(addr: &str, attempts: u32, delay: Duration) -> CriticaResult<TcpListener> {
    let mut attempt = 1;
    loop {
        match TcpListener::bind(addr).await {
            Ok(listener) => return Ok(listener),
            Err(e) if attempt < attempts => {
                warn!(addr, attempt, error = %e, "Bind failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(CriticaError::transport(format!(
                    "failed to bind {} after {} attempt(s): {}",
                    addr, attempt, e
                )));
            }
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn rpc_error(status: StatusCode, code: i32, message: &str) -> Response {
    (
        status,
        Json(json!({
            "jsonrpc": "2.0",
            "id": null,
            "error": {"code": code, "message": message}
        })),
    )
        .into_response()
}

fn session_error(error: CriticaError) -> Response {
    match error {
        CriticaError::SessionNotFound(_) => {
            rpc_error(StatusCode::NOT_FOUND, UNKNOWN_SESSION, "Session not found")
        }
        CriticaError::SessionLimit(limit) => rpc_error(
            StatusCode::SERVICE_UNAVAILABLE,
            NO_SESSION,
            &format!("Session limit reached ({})", limit),
        ),
        other => rpc_error(StatusCode::INTERNAL_SERVER_ERROR, NO_SESSION, &other.to_string()),
    }
}

fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn accepts_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/event-stream") || accept.contains("*/*"))
}

fn is_initialize(value: &Value) -> bool {
    match value {
        Value::Array(items) => items.iter().any(is_initialize),
        other => other.get("method").and_then(Value::as_str) == Some("initialize"),
    }
}

fn contains_initialize(inbound: &[Inbound]) -> bool {
    inbound.iter().any(|item| match item {
        Inbound::Message(message) => message.parsed.as_ref().is_some_and(is_initialize),
        Inbound::Passthrough(_) => false,
    })
}

/// Despacha os itens recebidos em paralelo; a ordem das saídas segue a das
/// entradas.
async fn dispatch_inbound(dispatcher: &RpcDispatcher, inbound: Vec<Inbound>) -> Vec<JsonRpcOutput> {
    let pending = inbound.into_iter().map(|item| async move {
        match item {
            Inbound::Message(message) => match message.parsed {
                Some(value) => dispatcher.dispatch(value).await,
                None => Some(RpcDispatcher::parse_error(message.error.as_deref())),
            },
            Inbound::Passthrough(text) if text.trim().is_empty() => None,
            Inbound::Passthrough(_) => Some(RpcDispatcher::parse_error(Some("input is not JSON"))),
        }
    });
    join_all(pending).await.into_iter().flatten().collect()
}

/// Eventos SSE: o `endpoint` opcional seguido de uma `message` por linha.
fn sse_events(
    messages: impl Stream<Item = String> + Send + 'static,
    endpoint: Option<String>,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    let first = stream::iter(endpoint.map(|url| Ok(Event::default().event("endpoint").data(url))));
    first.chain(messages.map(|line| Ok(Event::default().event("message").data(line))))
}

/// Remove a sessão SSE legada quando o stream é descartado (cliente
/// desconectou).
struct SessionGuard {
    id: String,
    sessions: Arc<SessionRegistry>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let id = std::mem::take(&mut self.id);
        let sessions = self.sessions.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                debug!(session = %id, "SSE stream dropped");
                sessions.remove(&id).await;
            });
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /
async fn handle_info() -> impl IntoResponse {
    Json(json!({
        "name": "critica",
        "version": env!("CARGO_PKG_VERSION"),
        "transports": {
            "streamableHttp": "/mcp",
            "sse": "/sse",
            "messages": "/messages?sessionId=<id>"
        },
        "tools": ToolHandler::list_tools().into_iter().map(|t| t.name).collect::<Vec<_>>()
    }))
}

/// GET /status
async fn handle_status(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let tools = state.dispatcher.tools();
    let providers: Vec<&str> = tools.registry().providers().iter().map(|p| p.name()).collect();
    let uptime = Utc::now().signed_duration_since(state.started_at).num_seconds();

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSecs": uptime,
        "sessions": state.sessions.counts().await,
        "providers": providers,
        "models": tools.registry().available_models().len(),
        "cache": tools.cache_stats().await
    }))
}

/// POST /mcp
async fn handle_mcp_post(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let body = String::from_utf8_lossy(&body);

    let (session, created) = match session_id(&headers) {
        Some(id) => match state.sessions.get(id).await {
            Ok(session) => (session, false),
            Err(e) => return session_error(e),
        },
        None => (state.sessions.open(TransportKind::StreamableHttp), true),
    };

    let inbound = session.receive(&body).await;

    if created {
        if !contains_initialize(&inbound) {
            return rpc_error(
                StatusCode::BAD_REQUEST,
                NO_SESSION,
                "Bad Request: No valid session ID provided",
            );
        }
        if let Err(e) = state.sessions.insert(session.clone()).await {
            return session_error(e);
        }
    }

    let outputs = dispatch_inbound(&state.dispatcher, inbound).await;

    let mut response = if outputs.is_empty() {
        StatusCode::ACCEPTED.into_response()
    } else {
        let mut lines = Vec::with_capacity(outputs.len());
        for output in &outputs {
            lines.push(session.encode(output).await);
        }
        let body = if lines.len() == 1 {
            lines.remove(0)
        } else {
            format!("[{}]", lines.join(","))
        };
        (StatusCode::OK, [(header::CONTENT_TYPE, "application/json")], body).into_response()
    };

    if created {
        if let Ok(value) = HeaderValue::from_str(session.id()) {
            response
                .headers_mut()
                .insert(HeaderName::from_static(SESSION_HEADER), value);
        }
    }
    response
}

/// GET /mcp: stream SSE de mensagens iniciadas pelo servidor.
async fn handle_mcp_get(State(state): State<Arc<HttpState>>, headers: HeaderMap) -> Response {
    if !accepts_event_stream(&headers) {
        return rpc_error(
            StatusCode::NOT_ACCEPTABLE,
            NO_SESSION,
            "Accept header must include text/event-stream",
        );
    }
    let Some(id) = session_id(&headers) else {
        return rpc_error(
            StatusCode::BAD_REQUEST,
            NO_SESSION,
            "Bad Request: No valid session ID provided",
        );
    };
    let session = match state.sessions.get(id).await {
        Ok(session) => session,
        Err(e) => return session_error(e),
    };
    // a sessão sobrevive ao stream: só DELETE /mcp a encerra
    let Some(lease) = session.lease_outbound() else {
        return rpc_error(StatusCode::CONFLICT, NO_SESSION, "Stream already open for this session");
    };

    Sse::new(sse_events(lease, None))
        .keep_alive(KeepAlive::new().interval(state.keep_alive))
        .into_response()
}

/// DELETE /mcp
async fn handle_mcp_delete(State(state): State<Arc<HttpState>>, headers: HeaderMap) -> Response {
    let Some(id) = session_id(&headers) else {
        return rpc_error(
            StatusCode::BAD_REQUEST,
            NO_SESSION,
            "Bad Request: No valid session ID provided",
        );
    };
    match state.sessions.remove(id).await {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => session_error(CriticaError::SessionNotFound(id.to_string())),
    }
}

/// GET /sse: abre uma sessão SSE legada.
async fn handle_sse(State(state): State<Arc<HttpState>>) -> Response {
    let session = match state.sessions.create(TransportKind::Sse).await {
        Ok(session) => session,
        Err(e) => return session_error(e),
    };
    let Some(rx) = session.take_outbound() else {
        return rpc_error(StatusCode::INTERNAL_SERVER_ERROR, NO_SESSION, "Session stream unavailable");
    };

    let endpoint = format!("/messages?sessionId={}", session.id());
    let guard = SessionGuard {
        id: session.id().to_string(),
        sessions: state.sessions.clone(),
    };
    let messages = UnboundedReceiverStream::new(rx).map(move |line| {
        // mantém a sessão viva enquanto o stream existir
        let _ = &guard;
        line
    });
    Sse::new(sse_events(messages, Some(endpoint)))
        .keep_alive(KeepAlive::new().interval(state.keep_alive))
        .into_response()
}

#[derive(Debug, Deserialize)]
struct MessagesQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

/// POST /messages?sessionId=<id>: as respostas saem pelo stream SSE.
async fn handle_messages(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<MessagesQuery>,
    body: Bytes,
) -> Response {
    let Some(id) = query.session_id.filter(|id| !id.trim().is_empty()) else {
        return rpc_error(
            StatusCode::BAD_REQUEST,
            NO_SESSION,
            "Bad Request: No valid session ID provided",
        );
    };
    let session = match state.sessions.get(&id).await {
        Ok(session) => session,
        Err(e) => return session_error(e),
    };

    let inbound = session.receive(&String::from_utf8_lossy(&body)).await;
    let dispatcher = state.dispatcher.clone();
    tokio::spawn(async move {
        for output in dispatch_inbound(&dispatcher, inbound).await {
            session.send(&output).await;
        }
    });

    (StatusCode::ACCEPTED, "Accepted").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::tools::tests::mock_handler;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn server_with(config: &Config) -> HttpServer {
        HttpServer::with_dispatcher(Arc::new(RpcDispatcher::new(mock_handler(vec![]))), config)
    }

    fn app() -> Router {
        server_with(&Config::default()).router()
    }

    fn post(uri: &str, session: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(id) = session {
            builder = builder.header(SESSION_HEADER, id);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn initialize(app: &Router) -> String {
        let response = app
            .clone()
            .oneshot(post(
                "/mcp",
                None,
                r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        response.headers()[SESSION_HEADER].to_str().unwrap().to_string()
    }

    fn open_stream(session: &str) -> Request<Body> {
        Request::builder()
            .uri("/mcp")
            .header(header::ACCEPT, "text/event-stream")
            .header(SESSION_HEADER, session)
            .body(Body::empty())
            .unwrap()
    }

    async fn next_chunk(body: &mut axum::body::BodyDataStream) -> String {
        let chunk = body.next().await.unwrap().unwrap();
        String::from_utf8(chunk.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_initialize_issues_session() {
        let app = app();
        let response = app
            .clone()
            .oneshot(post(
                "/mcp",
                None,
                r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(SESSION_HEADER));
        let body = json_body(response).await;
        assert_eq!(body["result"]["serverInfo"]["name"], "critica");
    }

    #[tokio::test]
    async fn test_post_without_session_is_rejected() {
        let response = app()
            .oneshot(post("/mcp", None, r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], -32000);
        assert_eq!(body["error"]["message"], "Bad Request: No valid session ID provided");
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let response = app()
            .oneshot(post("/mcp", Some("nope"), r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"]["code"], -32001);
    }

    #[tokio::test]
    async fn test_session_flow() {
        let app = app();
        let session = initialize(&app).await;

        let response = app
            .clone()
            .oneshot(post(
                "/mcp",
                Some(&session),
                r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let response = app
            .clone()
            .oneshot(post(
                "/mcp",
                Some(&session),
                r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"listModels","arguments":{}}}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let content = &body["result"]["structuredContent"];
        assert_eq!(content["modelUsed"], "None");
        assert!(content["availableModels"]["gemini_1_5_pro"].is_object());

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/mcp")
                    .header(SESSION_HEADER, &session)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(post("/mcp", Some(&session), r#"{"jsonrpc":"2.0","id":3,"method":"ping"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_repaired_body_and_multiple_documents() {
        let app = app();
        let session = initialize(&app).await;

        let response = app
            .oneshot(post(
                "/mcp",
                Some(&session),
                r#"{"jsonrpc":"2.0","id":2,"method":"ping"}{"jsonrpc":"2.0","id":3,"method":"ping"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let responses = body.as_array().unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], 2);
        assert_eq!(responses[1]["id"], 3);
    }

    #[tokio::test]
    async fn test_malformed_body_is_parse_error() {
        let app = app();
        let session = initialize(&app).await;

        let response = app
            .oneshot(post("/mcp", Some(&session), "{\"jsonrpc\":\"2.0\",\"id\":"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], -32700);
        assert_eq!(body["id"], Value::Null);
    }

    #[tokio::test]
    async fn test_session_limit() {
        let mut config = Config::default();
        config.server.max_sessions = 1;
        let app = server_with(&config).router();
        initialize(&app).await;

        let response = app
            .oneshot(post(
                "/mcp",
                None,
                r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_get_mcp_requires_event_stream() {
        let app = app();
        let session = initialize(&app).await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/mcp")
                    .header(header::ACCEPT, "application/json")
                    .header(SESSION_HEADER, &session)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
    }

    #[tokio::test]
    async fn test_get_stream_drop_keeps_session() {
        let app = app();
        let session = initialize(&app).await;

        let stream = app.clone().oneshot(open_stream(&session)).await.unwrap();
        assert_eq!(stream.status(), StatusCode::OK);
        let second = app.clone().oneshot(open_stream(&session)).await.unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
        drop(stream);

        let response = app
            .clone()
            .oneshot(post("/mcp", Some(&session), r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["id"], 2);

        // reconexão
        let stream = app.clone().oneshot(open_stream(&session)).await.unwrap();
        assert_eq!(stream.status(), StatusCode::OK);
        drop(stream);

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/mcp")
                    .header(SESSION_HEADER, &session)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_legacy_sse_drop_ends_session() {
        let app = app();
        let response = app
            .clone()
            .oneshot(Request::builder().uri("/sse").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let mut body = response.into_body().into_data_stream();
        let first = next_chunk(&mut body).await;
        let endpoint = first
            .lines()
            .find_map(|l| l.strip_prefix("data: "))
            .unwrap()
            .to_string();
        drop(body);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let response = app
            .oneshot(post(&endpoint, None, r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_legacy_sse_flow() {
        let app = app();
        let response = app
            .clone()
            .oneshot(Request::builder().uri("/sse").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");

        let mut body = response.into_body().into_data_stream();
        let first = next_chunk(&mut body).await;
        assert!(first.contains("event: endpoint"));
        let endpoint = first
            .lines()
            .find_map(|l| l.strip_prefix("data: "))
            .unwrap()
            .to_string();
        assert!(endpoint.starts_with("/messages?sessionId="));

        let response = app
            .clone()
            .oneshot(post(&endpoint, None, r#"{"jsonrpc":"2.0","id":7,"method":"ping"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let message = next_chunk(&mut body).await;
        assert!(message.contains("event: message"));
        let data = message
            .lines()
            .find_map(|l| l.strip_prefix("data: "))
            .unwrap();
        let value: Value = serde_json::from_str(data).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["result"], json!({}));
    }

    #[tokio::test]
    async fn test_messages_unknown_session() {
        let response = app()
            .oneshot(post("/messages?sessionId=missing", None, "{}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_info_and_status() {
        let app = app();

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["name"], "critica");

        initialize(&app).await;
        let response = app
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["sessions"]["streamableHttp"], 1);
        assert_eq!(body["providers"][0], "gemini");
        assert!(body["cache"]["capacity"].is_number());
    }

    #[tokio::test]
    async fn test_bind_retries_exhausted() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let result = bind_with_retries(&addr, 2, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(CriticaError::Transport(_))));
    }
}
