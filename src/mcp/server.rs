//! Servidor MCP do Critica sobre stdio.
//!
//! Cada fragmento lido de stdin passa pelo [`TransportAdapter`]; cada
//! requisição é despachada numa task própria, então respostas a requisições
//! concorrentes podem sair fora de ordem.

use std::any::Any;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::framing::{MessageCodec, SanitizingCodec};
use crate::types::config::{Config, FramingConfig};
use crate::CriticaResult;

use super::dispatcher::RpcDispatcher;
use super::protocol::JsonRpcOutput;
use super::tools::ToolHandler;
use super::transport::{Inbound, SendStatus, TransportAdapter, TransportKind, WriterSink};

/// Servidor MCP do Critica.
pub struct McpServer {
    dispatcher: Arc<RpcDispatcher>,
    codec: Arc<dyn MessageCodec>,
    max_buffer_bytes: usize,
}

impl McpServer {
    /// Cria um novo servidor MCP.
    ///
    /// Falha se nenhum provedor LLM estiver configurado.
    pub fn new(config: &Config) -> CriticaResult<Self> {
        let tools = ToolHandler::new(config)?;
        Ok(Self::with_dispatcher(
            Arc::new(RpcDispatcher::new(tools)),
            &config.framing,
        ))
    }

    /// Cria o servidor com um dispatcher já montado.
    pub fn with_dispatcher(dispatcher: Arc<RpcDispatcher>, framing: &FramingConfig) -> Self {
        Self {
            dispatcher,
            codec: SanitizingCodec::shared(framing),
            max_buffer_bytes: framing.max_buffer_bytes,
        }
    }

    pub fn dispatcher(&self) -> &Arc<RpcDispatcher> {
        &self.dispatcher
    }

    /// Atende stdin/stdout até EOF.
    pub async fn run(&self) -> CriticaResult<()> {
        info!("Critica MCP server starting on stdio");
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await?;
        info!("Critica MCP server stopped");
        Ok(())
    }

    /// Atende um par leitor/escritor qualquer até EOF.
    ///
    /// No EOF, o que restar no buffer é decodificado, as requisições em
    /// andamento terminam e o canal é fechado.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> CriticaResult<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send,
    {
        let mut reader = BufReader::new(reader);
        let mut adapter = TransportAdapter::new(
            TransportKind::Stdio,
            self.codec.clone(),
            WriterSink::new(writer),
            self.max_buffer_bytes,
        );

        let (tx, mut rx) = mpsc::unbounded_channel::<JsonRpcOutput>();
        let mut tx = Some(tx);
        let mut line = Vec::new();

        loop {
            tokio::select! {
                read = reader.read_until(b'\n', &mut line), if tx.is_some() => {
                    let eof = matches!(read, Ok(0) | Err(_));
                    let inbound = match read {
                        Ok(0) => {
                            info!("Client disconnected");
                            adapter.finish_receive()
                        }
                        Ok(_) => {
                            let chunk = String::from_utf8_lossy(&line).into_owned();
                            line.clear();
                            adapter.on_receive(&chunk)
                        }
                        Err(e) => {
                            warn!(error = %e, "Failed to read from stdin");
                            adapter.finish_receive()
                        }
                    };

                    if let Some(sender) = &tx {
                        self.route(inbound, sender);
                    }
                    if eof {
                        // sem mais entrada: o loop termina quando as tasks acabarem
                        tx = None;
                    }
                }
                output = rx.recv() => {
                    let Some(output) = output else { break };
                    if adapter.send(&output).await == SendStatus::Closed {
                        warn!("Output channel closed");
                        break;
                    }
                }
            }
        }

        adapter.close().await;
        Ok(())
    }

    /// Encaminha os itens recebidos ao dispatcher.
    fn route(&self, inbound: Vec<Inbound>, tx: &mpsc::UnboundedSender<JsonRpcOutput>) {
        for item in inbound {
            match item {
                Inbound::Message(message) => match message.parsed {
                    Some(value) => {
                        let dispatcher = self.dispatcher.clone();
                        let tx = tx.clone();
                        tokio::spawn(async move {
                            if let Some(output) = dispatcher.dispatch(value).await {
                                // o receptor só some quando o canal fecha
                                let _ = tx.send(output);
                            }
                        });
                    }
                    None => {
                        let _ = tx.send(RpcDispatcher::parse_error(message.error.as_deref()));
                    }
                },
                Inbound::Passthrough(text) if text.trim().is_empty() => {}
                Inbound::Passthrough(text) => {
                    debug!(text = %text.trim_end(), "Non-JSON input");
                    let _ = tx.send(RpcDispatcher::parse_error(Some("input is not JSON")));
                }
            }
        }
    }
}

/// Completa no Ctrl-C ou, em Unix, no SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutdown signal received");
}

/// Registra um panic hook que manda panics para o `tracing`, inclusive os
/// das tasks de despacho. Chamar depois de instalar o subscriber.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());
        let thread = std::thread::current();
        error!(
            panic = %panic_message(info.payload()),
            location = %location,
            thread = thread.name().unwrap_or("<unnamed>"),
            "Panic"
        );
    }));
}

/// Texto do payload de um panic (`&str` ou `String`).
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
