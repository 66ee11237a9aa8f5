//! Servidor MCP do Critica.
//!
//! Expõe as ferramentas de revisão de código por JSON-RPC 2.0, sobre stdio,
//! streamable HTTP (`/mcp`) e SSE legado (`/sse` + `/messages`). Toda
//! mensagem recebida passa pelo [`TransportAdapter`], que enquadra, repara e
//! normaliza o JSON antes do despacho.
//!
//! ## Ferramentas Expostas
//!
//! - `reviewCodeStructured` - Revisão com resposta JSON estruturada
//! - `reviewCodeFreeform` - Revisão em texto livre
//! - `listModels` - Modelos disponíveis nos provedores configurados
//!
//! ## Exemplo de Uso
//!
//! ```ignore
//! use critica::mcp::McpServer;
//! use critica::Config;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::load_or_default();
//!     let server = McpServer::new(&config).unwrap();
//!     server.run().await.unwrap();
//! }
//! ```

mod dispatcher;
#[cfg(feature = "http")]
mod http;
mod protocol;
mod server;
mod session;
mod tools;
mod transport;

pub use dispatcher::RpcDispatcher;
#[cfg(feature = "http")]
pub use http::{HttpServer, SESSION_HEADER};
pub use protocol::{
    CallToolParams, InitializeParams, InitializeResult, JsonRpcError, JsonRpcId,
    JsonRpcNotification, JsonRpcOutput, JsonRpcRequest, JsonRpcResponse, ListToolsResult,
    ServerCapabilities, ServerInfo, ToolContent, ToolDescription, ToolResult, ToolsCapability,
    DEFAULT_PROTOCOL_VERSION, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND,
    PARSE_ERROR, SUPPORTED_PROTOCOL_VERSIONS,
};
pub use server::{install_panic_hook, shutdown_signal, McpServer};
pub use session::{Session, SessionCounts, SessionRegistry};
pub use tools::{ToolHandler, LIST_MODELS, REVIEW_CODE_FREEFORM, REVIEW_CODE_STRUCTURED};
pub use transport::{
    internal_error_envelope, FrameSink, Inbound, QueueSink, SendStatus, TransportAdapter,
    TransportKind, WriterSink,
};
