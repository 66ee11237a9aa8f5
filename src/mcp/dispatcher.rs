//! Roteamento de mensagens JSON-RPC decodificadas.

use futures::future::join_all;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::protocol::{
    CallToolParams, InitializeParams, InitializeResult, JsonRpcError, JsonRpcId, JsonRpcOutput,
    JsonRpcRequest, JsonRpcResponse, ListToolsResult,
};
use super::tools::ToolHandler;

/// Dispatcher compartilhado por todos os canais.
pub struct RpcDispatcher {
    tools: ToolHandler,
}

impl RpcDispatcher {
    pub fn new(tools: ToolHandler) -> Self {
        Self { tools }
    }

    pub fn tools(&self) -> &ToolHandler {
        &self.tools
    }

    /// Processa um valor recebido.
    ///
    /// Devolve `None` para notificações, respostas do cliente e lotes
    /// compostos só por notificações.
    pub async fn dispatch(&self, value: Value) -> Option<JsonRpcOutput> {
        match value {
            Value::Array(items) if items.is_empty() => Some(
                JsonRpcResponse::error(JsonRpcId::Null, JsonRpcError::invalid_request()).into(),
            ),
            Value::Array(items) => {
                debug!(size = items.len(), "Dispatching batch");
                let responses: Vec<JsonRpcResponse> =
                    join_all(items.into_iter().map(|item| self.dispatch_one(item)))
                        .await
                        .into_iter()
                        .flatten()
                        .collect();
                if responses.is_empty() {
                    None
                } else {
                    Some(JsonRpcOutput::Batch(responses))
                }
            }
            other => self.dispatch_one(other).await.map(Into::into),
        }
    }

    /// Resposta `-32700` para texto que não pôde ser lido como JSON.
    pub fn parse_error(detail: Option<&str>) -> JsonRpcOutput {
        let error = match detail {
            Some(detail) => JsonRpcError::parse_error().with_data(json!(detail)),
            None => JsonRpcError::parse_error(),
        };
        JsonRpcResponse::error(JsonRpcId::Null, error).into()
    }

    async fn dispatch_one(&self, value: Value) -> Option<JsonRpcResponse> {
        let Some(object) = value.as_object() else {
            return Some(JsonRpcResponse::error(
                JsonRpcId::Null,
                JsonRpcError::invalid_request(),
            ));
        };

        if !object.contains_key("method")
            && (object.contains_key("result") || object.contains_key("error"))
        {
            debug!(id = ?object.get("id"), "Ignoring client response");
            return None;
        }

        // `"id": null` conta como requisição (a resposta leva id null)
        let expects_response = object.contains_key("id");
        let id = JsonRpcId::from_value(&value);

        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Invalid JSON-RPC request");
                return Some(JsonRpcResponse::error(
                    id,
                    JsonRpcError::invalid_request().with_data(json!(e.to_string())),
                ));
            }
        };

        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(
                id,
                JsonRpcError::invalid_request().with_data(json!("jsonrpc must be \"2.0\"")),
            ));
        }

        let response = self.handle_request(request, id).await;
        expects_response.then_some(response)
    }

    /// Processa uma requisição já validada.
    pub async fn handle_request(&self, request: JsonRpcRequest, id: JsonRpcId) -> JsonRpcResponse {
        debug!(method = %request.method, "Handling request");

        match request.method.as_str() {
            // Lifecycle
            "initialize" => self.handle_initialize(request.params, id),
            "notifications/initialized" | "initialized" => {
                info!("Client initialization complete");
                JsonRpcResponse::success(id, json!({}))
            }
            "ping" => JsonRpcResponse::success(id, json!({})),
            "shutdown" => {
                info!("Client requested shutdown");
                JsonRpcResponse::success(id, Value::Null)
            }

            // Tools
            "tools/list" => result(
                id,
                &ListToolsResult {
                    tools: ToolHandler::list_tools(),
                },
            ),
            "tools/call" => self.handle_tools_call(request.params, id).await,

            method if method.starts_with("notifications/") => {
                debug!(method, "Ignoring notification");
                JsonRpcResponse::success(id, json!({}))
            }
            method => JsonRpcResponse::error(id, JsonRpcError::method_not_found(method)),
        }
    }

    fn handle_initialize(&self, params: Option<Value>, id: JsonRpcId) -> JsonRpcResponse {
        let params: InitializeParams = params
            .and_then(|p| serde_json::from_value(p).ok())
            .unwrap_or_default();

        let result = InitializeResult::negotiate(params.protocol_version.as_deref());
        info!(
            client = ?params.client_info,
            requested = ?params.protocol_version,
            negotiated = %result.protocol_version,
            "Client initializing connection"
        );

        self::result(id, &result)
    }

    async fn handle_tools_call(&self, params: Option<Value>, id: JsonRpcId) -> JsonRpcResponse {
        let params: CallToolParams = match params {
            Some(p) => match serde_json::from_value(p) {
                Ok(params) => params,
                Err(e) => {
                    return JsonRpcResponse::error(
                        id,
                        JsonRpcError::invalid_params(format!("Invalid params: {}", e)),
                    );
                }
            },
            None => {
                return JsonRpcResponse::error(id, JsonRpcError::invalid_params("Missing params"));
            }
        };

        if !ToolHandler::has_tool(&params.name) {
            return JsonRpcResponse::error(
                id,
                JsonRpcError::invalid_params(format!("Unknown tool: {}", params.name)),
            );
        }

        info!(tool = %params.name, "Calling tool");
        let tool_result = self.tools.handle_tool_call(&params.name, params.arguments).await;
        result(id, &tool_result)
    }
}

fn result<T: Serialize>(id: JsonRpcId, value: &T) -> JsonRpcResponse {
    match serde_json::to_value(value) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(id, JsonRpcError::internal_error(e.to_string())),
    }
}
