//! Sessões dos transportes HTTP.
//!
//! Cada sessão (streamable HTTP ou SSE legado) tem o seu próprio
//! [`TransportAdapter`] sobre um [`QueueSink`]. As mensagens enviadas pelo
//! adaptador chegam à fila de saída, que o stream SSE da sessão consome.
//!
//! Sessões sem stream aberto expiram depois de um tempo ocioso.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::Stream;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::framing::MessageCodec;
use crate::types::config::FramingConfig;
use crate::{CriticaError, CriticaResult};

use super::protocol::JsonRpcOutput;
use super::transport::{Inbound, QueueSink, SendStatus, TransportAdapter, TransportKind};

/// Uma sessão HTTP.
pub struct Session {
    id: String,
    kind: TransportKind,
    created_at: DateTime<Utc>,
    last_active_ms: AtomicI64,
    adapter: Mutex<TransportAdapter<QueueSink>>,
    outbound: StdMutex<Option<mpsc::UnboundedReceiver<String>>>,
}

impl Session {
    fn new(kind: TransportKind, codec: Arc<dyn MessageCodec>, max_buffer_bytes: usize) -> Self {
        let (sink, rx) = QueueSink::channel();
        let created_at = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            created_at,
            last_active_ms: AtomicI64::new(created_at.timestamp_millis()),
            adapter: Mutex::new(TransportAdapter::new(kind, codec, sink, max_buffer_bytes)),
            outbound: StdMutex::new(Some(rx)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Última vez que o cliente enviou algo.
    pub fn last_active(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.last_active_ms.load(Ordering::Relaxed))
            .unwrap_or(self.created_at)
    }

    fn touch(&self) {
        self.last_active_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Decodifica um corpo HTTP completo. O buffer é esvaziado ao final,
    /// mesmo que a unidade não tenha fechado.
    pub async fn receive(&self, body: &str) -> Vec<Inbound> {
        self.touch();
        let mut adapter = self.adapter.lock().await;
        let mut inbound = adapter.on_receive(body);
        inbound.extend(adapter.finish_receive());
        inbound
    }

    /// Codifica uma saída como texto de uma linha (sem o `\n`).
    pub async fn encode(&self, output: &JsonRpcOutput) -> String {
        let adapter = self.adapter.lock().await;
        let (line, _) = adapter.encode(output);
        line.trim_end_matches('\n').to_string()
    }

    /// Envia uma saída pela fila da sessão (stream SSE).
    pub async fn send(&self, output: &JsonRpcOutput) -> SendStatus {
        self.adapter.lock().await.send(output).await
    }

    /// Retira a ponta de leitura da fila de vez. Só um stream pode consumi-la.
    pub fn take_outbound(&self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.outbound.lock().ok()?.take()
    }

    /// Empresta a fila a um stream; ela volta para a sessão quando o stream
    /// é descartado, e o próximo stream recebe o que ficou pendente.
    pub fn lease_outbound(self: &Arc<Self>) -> Option<OutboundLease> {
        let rx = self.take_outbound()?;
        Some(OutboundLease {
            rx: Some(rx),
            session: self.clone(),
        })
    }

    fn restore_outbound(&self, rx: mpsc::UnboundedReceiver<String>) {
        if let Ok(mut slot) = self.outbound.lock() {
            *slot = Some(rx);
        }
        self.touch();
    }

    /// Um stream está consumindo a fila.
    pub fn has_stream(&self) -> bool {
        self.outbound.lock().map(|slot| slot.is_none()).unwrap_or(false)
    }

    /// Sem stream aberto e sem atividade há mais de `idle`.
    pub fn is_expired(&self, now: DateTime<Utc>, idle: Duration) -> bool {
        if self.has_stream() {
            return false;
        }
        now.signed_duration_since(self.last_active())
            .to_std()
            .is_ok_and(|elapsed| elapsed > idle)
    }

    pub async fn close(&self) {
        self.adapter.lock().await.close().await;
    }
}

/// Fila de saída emprestada a um stream `GET /mcp`.
pub struct OutboundLease {
    rx: Option<mpsc::UnboundedReceiver<String>>,
    session: Arc<Session>,
}

impl Stream for OutboundLease {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        match self.rx.as_mut() {
            Some(rx) => rx.poll_recv(cx),
            None => Poll::Ready(None),
        }
    }
}

impl Drop for OutboundLease {
    fn drop(&mut self) {
        if let Some(rx) = self.rx.take() {
            debug!(session = %self.session.id, "Stream detached");
            self.session.restore_outbound(rx);
        }
    }
}

/// Contagem de sessões por transporte.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCounts {
    pub total: usize,
    pub streamable_http: usize,
    pub sse: usize,
}

/// Registro das sessões abertas, indexado pelo id emitido pelo servidor.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    codec: Arc<dyn MessageCodec>,
    max_buffer_bytes: usize,
    max_sessions: usize,
    idle_timeout: Option<Duration>,
}

impl SessionRegistry {
    pub fn new(codec: Arc<dyn MessageCodec>, framing: &FramingConfig, max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            codec,
            max_buffer_bytes: framing.max_buffer_bytes,
            max_sessions: max_sessions.max(1),
            idle_timeout: None,
        }
    }

    /// Expira sessões ociosas depois de `timeout` (zero desliga).
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    /// Cria uma sessão sem registrá-la.
    pub fn open(&self, kind: TransportKind) -> Arc<Session> {
        Arc::new(Session::new(kind, self.codec.clone(), self.max_buffer_bytes))
    }

    /// Registra uma sessão aberta com [`open`](Self::open). As sessões
    /// expiradas saem antes de o limite ser verificado.
    pub async fn insert(&self, session: Arc<Session>) -> CriticaResult<()> {
        self.evict_expired(Utc::now()).await;
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.max_sessions {
            return Err(CriticaError::SessionLimit(self.max_sessions));
        }
        info!(session = %session.id, transport = %session.kind, "Session opened");
        sessions.insert(session.id.clone(), session);
        Ok(())
    }

    /// Cria e registra uma sessão.
    pub async fn create(&self, kind: TransportKind) -> CriticaResult<Arc<Session>> {
        let session = self.open(kind);
        self.insert(session.clone()).await?;
        Ok(session)
    }

    pub async fn get(&self, id: &str) -> CriticaResult<Arc<Session>> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| CriticaError::SessionNotFound(id.to_string()))
    }

    /// Remove e fecha a sessão.
    pub async fn remove(&self, id: &str) -> Option<Arc<Session>> {
        let session = self.sessions.write().await.remove(id)?;
        session.close().await;
        info!(session = %id, "Session closed");
        Some(session)
    }

    /// Remove e fecha as sessões expiradas em `now`. Devolve quantas saíram.
    pub async fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let Some(idle) = self.idle_timeout else {
            return 0;
        };
        let expired: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.write().await;
            let ids: Vec<String> = sessions
                .values()
                .filter(|s| s.is_expired(now, idle))
                .map(|s| s.id.clone())
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };
        for session in &expired {
            session.close().await;
            info!(session = %session.id, idle_secs = idle.as_secs(), "Session expired");
        }
        expired.len()
    }

    pub async fn counts(&self) -> SessionCounts {
        let sessions = self.sessions.read().await;
        let mut counts = SessionCounts {
            total: sessions.len(),
            ..Default::default()
        };
        for session in sessions.values() {
            match session.kind {
                TransportKind::StreamableHttp => counts.streamable_http += 1,
                TransportKind::Sse => counts.sse += 1,
                TransportKind::Stdio => {}
            }
        }
        counts
    }

    /// Fecha todas as sessões (desligamento do servidor).
    pub async fn close_all(&self) {
        let sessions: Vec<Arc<Session>> = self.sessions.write().await.drain().map(|(_, s)| s).collect();
        debug!(count = sessions.len(), "Closing all sessions");
        for session in sessions {
            session.close().await;
        }
    }
}
