//! Adaptador de transporte MCP.
//!
//! Um [`TransportAdapter`] compõe framer, sanitizer e normalizador de chaves
//! em volta de um único canal: o pipe stdio, uma sessão streamable HTTP ou
//! uma sessão SSE. Cada canal tem o seu adaptador e o seu buffer.
//!
//! ## Formato de saída
//!
//! Toda mensagem enviada é uma linha JSON terminada em `\n`, sem quebras de
//! linha embutidas:
//!
//! ```text
//! {"jsonrpc":"2.0","id":1,"result":{...}}\n
//! ```

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::framing::{frame_line, Frame, Message, MessageCodec, MessageFramer};

use super::protocol::{JsonRpcId, INTERNAL_ERROR};

/// Destino das linhas de saída de um canal.
#[async_trait]
pub trait FrameSink: Send {
    /// Escreve uma linha completa (já terminada em `\n`).
    async fn write_frame(&mut self, line: &str) -> io::Result<()>;

    /// Encerra o destino. Escritas posteriores falham.
    async fn shutdown(&mut self) -> io::Result<()>;
}

/// Sink sobre um writer assíncrono (stdout, pipes, `duplex` em testes).
pub struct WriterSink<W> {
    writer: W,
}

impl<W> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> FrameSink for WriterSink<W> {
    async fn write_frame(&mut self, line: &str) -> io::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        // Flush é necessário para a mensagem sair imediatamente
        self.writer.flush().await
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        self.writer.shutdown().await
    }
}

/// Sink que entrega cada mensagem (sem o `\n` final) a uma fila. Usado pelas
/// sessões HTTP, onde as mensagens viram corpos de resposta ou eventos SSE.
pub struct QueueSink {
    tx: Option<mpsc::UnboundedSender<String>>,
}

impl QueueSink {
    /// Cria o sink e a ponta de leitura da fila.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }
}

#[async_trait]
impl FrameSink for QueueSink {
    async fn write_frame(&mut self, line: &str) -> io::Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "queue sink closed"))?;
        tx.send(line.trim_end_matches('\n').to_string())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "queue receiver dropped"))
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        self.tx = None;
        Ok(())
    }
}

/// Tipo de canal, para logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Stdio,
    StreamableHttp,
    Sse,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Stdio => write!(f, "stdio"),
            TransportKind::StreamableHttp => write!(f, "streamable-http"),
            TransportKind::Sse => write!(f, "sse"),
        }
    }
}

/// Item recebido de um canal.
#[derive(Debug, Clone)]
pub enum Inbound {
    /// Documento decodificado (ou falha de parse, com o texto original).
    Message(Message),
    /// Texto sem marcadores JSON.
    Passthrough(String),
}

/// Resultado de um envio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// Mensagem escrita.
    Delivered,
    /// A codificação falhou; o envelope de erro interno foi escrito no lugar.
    Substituted,
    /// O canal está fechado ou a escrita falhou.
    Closed,
}

/// Adaptador de um canal.
pub struct TransportAdapter<S> {
    kind: TransportKind,
    codec: Arc<dyn MessageCodec>,
    inbound: MessageFramer,
    sink: S,
    closed: bool,
}

impl<S: FrameSink> TransportAdapter<S> {
    /// Cria um adaptador com o codec injetado.
    pub fn new(kind: TransportKind, codec: Arc<dyn MessageCodec>, sink: S, max_buffer_bytes: usize) -> Self {
        Self {
            kind,
            codec,
            inbound: MessageFramer::new(max_buffer_bytes),
            sink,
            closed: false,
        }
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Bytes da unidade parcial ainda no buffer de entrada.
    pub fn buffered_len(&self) -> usize {
        self.inbound.buffered_len()
    }

    /// Codifica uma mensagem de saída como uma linha.
    ///
    /// Nunca falha: se a codificação não for possível, devolve o envelope
    /// `-32603` com o id da mensagem (ou `null`) e `true` no segundo campo.
    pub fn encode<T: Serialize + ?Sized>(&self, message: &T) -> (String, bool) {
        let value = match serde_json::to_value(message) {
            Ok(value) => value,
            Err(e) => {
                error!(transport = %self.kind, error = %e, "Failed to serialize outgoing message");
                return (frame_line(&internal_error_envelope(&JsonRpcId::Null)), true);
            }
        };
        let id = JsonRpcId::from_value(&value);

        match self.codec.encode(value) {
            Ok(text) => (frame_line(&text), false),
            Err(e) => {
                error!(transport = %self.kind, error = %e, "Failed to encode outgoing message");
                (frame_line(&internal_error_envelope(&id)), true)
            }
        }
    }

    /// Normaliza, codifica, sanitiza, enquadra e escreve uma mensagem.
    pub async fn send<T: Serialize + ?Sized>(&mut self, message: &T) -> SendStatus {
        if self.closed {
            debug!(transport = %self.kind, "Send on closed transport dropped");
            return SendStatus::Closed;
        }

        let (line, substituted) = self.encode(message);
        match self.sink.write_frame(&line).await {
            Ok(()) if substituted => SendStatus::Substituted,
            Ok(()) => SendStatus::Delivered,
            Err(e) => {
                warn!(transport = %self.kind, error = %e, "Write failed, closing transport");
                self.closed = true;
                self.inbound.reset();
                SendStatus::Closed
            }
        }
    }

    /// Entrega um fragmento recebido ao framer e decodifica as unidades
    /// completas.
    pub fn on_receive(&mut self, chunk: &str) -> Vec<Inbound> {
        if self.closed {
            return Vec::new();
        }
        let frames = self.inbound.feed(chunk);
        self.decode_frames(frames)
    }

    /// Fim do fluxo de entrada: o que restar no buffer é enviado ao sanitizer
    /// como está.
    pub fn finish_receive(&mut self) -> Vec<Inbound> {
        if self.closed {
            return Vec::new();
        }
        self.inbound.flush();
        let frames = self.inbound.drain();
        self.decode_frames(frames)
    }

    /// Descarta o estado parcial e encerra o sink.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let dropped = self.inbound.buffered_len();
        self.inbound.reset();
        if let Err(e) = self.sink.shutdown().await {
            debug!(transport = %self.kind, error = %e, "Sink shutdown failed");
        }
        debug!(transport = %self.kind, dropped_bytes = dropped, "Transport closed");
    }

    fn decode_frames(&self, frames: Vec<Frame>) -> Vec<Inbound> {
        let mut out = Vec::with_capacity(frames.len());
        for frame in frames {
            match frame {
                Frame::Passthrough(text) => out.push(Inbound::Passthrough(text)),
                Frame::Unit(unit) => {
                    for message in self.codec.decode(&unit) {
                        if let Some(e) = &message.error {
                            warn!(
                                transport = %self.kind,
                                error = %e,
                                raw = %message.raw,
                                "Inbound message could not be parsed"
                            );
                        } else if message.was_repaired() {
                            debug!(
                                transport = %self.kind,
                                rules = ?message.repairs,
                                "Inbound message repaired"
                            );
                        }
                        out.push(Inbound::Message(message));
                    }
                }
            }
        }
        out
    }
}

/// Envelope de erro interno usado quando uma resposta não pode ser
/// codificada.
pub fn internal_error_envelope(id: &JsonRpcId) -> String {
    let id = serde_json::to_value(id).unwrap_or(Value::Null);
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {"code": INTERNAL_ERROR, "message": "Internal error"}
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::{KeyNormalizer, KeyStyle, SanitizingCodec, Sanitizer};
    use serde::ser::Error as _;
    use serde::Serializer;
    use std::collections::BTreeMap;

    fn codec() -> Arc<dyn MessageCodec> {
        Arc::new(SanitizingCodec::new(
            Sanitizer::default(),
            Some(KeyNormalizer::new(KeyStyle::Underscore)),
        ))
    }

    fn queue_adapter() -> (TransportAdapter<QueueSink>, mpsc::UnboundedReceiver<String>) {
        let (sink, rx) = QueueSink::channel();
        (
            TransportAdapter::new(TransportKind::StreamableHttp, codec(), sink, 1024),
            rx,
        )
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("not representable"))
        }
    }

    struct FailingCodec;

    impl MessageCodec for FailingCodec {
        fn encode(&self, _value: Value) -> Result<String, serde_json::Error> {
            Err(serde_json::Error::custom("boom"))
        }

        fn decode(&self, _raw: &str) -> Vec<Message> {
            Vec::new()
        }
    }

    fn parsed(inbound: &[Inbound]) -> Vec<Value> {
        inbound
            .iter()
            .filter_map(|i| match i {
                Inbound::Message(m) => m.parsed.clone(),
                Inbound::Passthrough(_) => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_send_writes_one_normalized_line() {
        let (mut adapter, mut rx) = queue_adapter();
        let mut models = BTreeMap::new();
        models.insert("gemini-1.5-pro", "Gemini");

        let status = adapter
            .send(&json!({"jsonrpc": "2.0", "id": 1, "result": {"availableModels": models}}))
            .await;
        assert_eq!(status, SendStatus::Delivered);

        let line = rx.recv().await.unwrap();
        assert!(!line.contains('\n'));
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["result"]["availableModels"]["gemini_1_5_pro"], "Gemini");
    }

    #[tokio::test]
    async fn test_writer_sink_terminates_lines() {
        let mut adapter = TransportAdapter::new(TransportKind::Stdio, codec(), WriterSink::new(Vec::new()), 1024);
        adapter.send(&json!({"jsonrpc": "2.0", "id": 1, "result": {"text": "a\nb"}})).await;
        adapter.send(&json!({"jsonrpc": "2.0", "id": 2, "result": {}})).await;

        let output = String::from_utf8(adapter.sink.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(output.ends_with('\n'));
        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["result"]["text"], "a\nb");
    }

    #[tokio::test]
    async fn test_unserializable_message_is_substituted() {
        let (mut adapter, mut rx) = queue_adapter();
        assert_eq!(adapter.send(&Unserializable).await, SendStatus::Substituted);

        let value: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(value["error"]["code"], INTERNAL_ERROR);
        assert_eq!(value["error"]["message"], "Internal error");
        assert_eq!(value["id"], Value::Null);
    }

    #[tokio::test]
    async fn test_codec_failure_keeps_request_id() {
        let (sink, mut rx) = QueueSink::channel();
        let mut adapter = TransportAdapter::new(TransportKind::Sse, Arc::new(FailingCodec), sink, 1024);

        let status = adapter.send(&json!({"jsonrpc": "2.0", "id": 9, "result": {}})).await;
        assert_eq!(status, SendStatus::Substituted);

        let value: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(value["id"], 9);
        assert_eq!(value["error"]["code"], INTERNAL_ERROR);
    }

    #[tokio::test]
    async fn test_on_receive_fragmented_unit_keeps_raw_text() {
        let (mut adapter, _rx) = queue_adapter();

        assert!(adapter.on_receive(r#"{"jsonrpc":"2.0","id":1,"#).is_empty());
        assert!(adapter.buffered_len() > 0);

        let inbound = adapter.on_receive(r#""method":"ping",}"#);
        assert_eq!(adapter.buffered_len(), 0);
        assert_eq!(inbound.len(), 1);
        match &inbound[0] {
            Inbound::Message(m) => {
                // vírgula final em objeto: nenhuma regra cobre
                assert!(m.error.is_some());
                assert_eq!(m.raw, r#"{"jsonrpc":"2.0","id":1,"method":"ping",}"#);
            }
            other => panic!("unexpected inbound: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_on_receive_concatenated_documents() {
        let (mut adapter, _rx) = queue_adapter();
        let inbound = adapter.on_receive("{\"id\":1,\"method\":\"ping\"}{\"id\":2,\"method\":\"ping\"}\n");
        let values = parsed(&inbound);
        assert_eq!(values.len(), 2);
        assert_eq!(values[1]["id"], 2);
    }

    #[tokio::test]
    async fn test_on_receive_adjacent_strings_repaired() {
        let (mut adapter, _rx) = queue_adapter();
        let inbound = adapter.on_receive("[\"a\" \"b\"]\n");
        match &inbound[..] {
            [Inbound::Message(m)] => {
                assert!(m.was_repaired());
                assert_eq!(m.parsed, Some(json!(["a", "b"])));
            }
            other => panic!("unexpected inbound: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_passthrough_text() {
        let (mut adapter, _rx) = queue_adapter();
        let inbound = adapter.on_receive("hello there\n");
        assert!(matches!(&inbound[..], [Inbound::Passthrough(t)] if t == "hello there\n"));
        assert_eq!(adapter.buffered_len(), 0);
    }

    #[tokio::test]
    async fn test_finish_receive_flushes_partial_unit() {
        let (mut adapter, _rx) = queue_adapter();
        assert!(adapter.on_receive(r#"{"id":1,"method""#).is_empty());

        let inbound = adapter.finish_receive();
        assert_eq!(inbound.len(), 1);
        assert!(matches!(&inbound[0], Inbound::Message(m) if m.error.is_some()));
        assert_eq!(adapter.buffered_len(), 0);
    }

    #[tokio::test]
    async fn test_close_drops_buffer_and_rejects_sends() {
        let (mut adapter, mut rx) = queue_adapter();
        adapter.on_receive(r#"{"partial":"#);

        adapter.close().await;
        assert!(adapter.is_closed());
        assert_eq!(adapter.buffered_len(), 0);
        assert!(adapter.on_receive("{}").is_empty());
        assert_eq!(adapter.send(&json!({})).await, SendStatus::Closed);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_receiver_closes_transport() {
        let (mut adapter, rx) = queue_adapter();
        drop(rx);
        assert_eq!(adapter.send(&json!({"id": 1})).await, SendStatus::Closed);
        assert!(adapter.is_closed());
    }

    #[test]
    fn test_internal_error_envelope() {
        let value: Value = serde_json::from_str(&internal_error_envelope(&"abc".into())).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["id"], "abc");
        assert_eq!(value["error"]["code"], -32603);
    }
}
