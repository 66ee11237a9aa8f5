//! Framer de mensagens: acumula fragmentos de um canal até formar unidades
//! JSON completas.
//!
//! A detecção é um scanner incremental de profundidade de colchetes que
//! respeita strings (`"` e `'`) e escapes. Fragmentos sem nenhum marcador
//! JSON recebidos com o buffer vazio passam direto, sem bufferização.

use std::collections::VecDeque;
use tracing::{debug, warn};

use super::sanitizer::preview;

/// Estado do framer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Nada bufferizado.
    Empty,
    /// Unidade parcial no buffer.
    Accumulating,
    /// Uma ou mais unidades prontas para [`MessageFramer::drain`].
    FlushReady,
}

/// Saída do framer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Texto sem marcadores JSON, repassado sem alteração.
    Passthrough(String),
    /// Candidato a mensagem, pronto para o sanitizer.
    Unit(String),
}

#[derive(Debug, Default)]
struct Scanner {
    unit_start: Option<usize>,
    depth: usize,
    quote: Option<char>,
    escaped: bool,
    /// Texto fora de colchetes (lixo ou fragmento órfão).
    stray: bool,
}

/// Framer por canal. Nunca compartilhado entre conexões.
#[derive(Debug)]
pub struct MessageFramer {
    buffer: String,
    scanned: usize,
    scanner: Scanner,
    ready: VecDeque<Frame>,
    max_buffer_bytes: usize,
}

impl MessageFramer {
    pub fn new(max_buffer_bytes: usize) -> Self {
        Self {
            buffer: String::new(),
            scanned: 0,
            scanner: Scanner::default(),
            ready: VecDeque::new(),
            max_buffer_bytes: max_buffer_bytes.max(1),
        }
    }

    /// Estado atual.
    pub fn state(&self) -> FrameState {
        if !self.ready.is_empty() {
            FrameState::FlushReady
        } else if self.buffer.is_empty() {
            FrameState::Empty
        } else {
            FrameState::Accumulating
        }
    }

    /// Bytes de unidade parcial no buffer.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Recebe um fragmento do canal.
    pub fn push(&mut self, chunk: &str) {
        if self.buffer.is_empty() && !has_marker(chunk) {
            self.ready.push_back(Frame::Passthrough(chunk.to_string()));
            return;
        }

        self.buffer.push_str(chunk);
        self.scan();

        if self.buffer.len() > self.max_buffer_bytes {
            warn!(
                buffered = self.buffer.len(),
                limit = self.max_buffer_bytes,
                "Frame buffer limit exceeded, flushing partial unit"
            );
            self.flush();
        }
    }

    /// Recebe um fragmento e devolve as unidades prontas.
    pub fn feed(&mut self, chunk: &str) -> Vec<Frame> {
        self.push(chunk);
        self.drain()
    }

    /// Retira as unidades prontas, em ordem de chegada.
    pub fn drain(&mut self) -> Vec<Frame> {
        self.ready.drain(..).collect()
    }

    /// Força a saída do que estiver no buffer (fim de stream ou corpo HTTP
    /// completo) e limpa o estado.
    pub fn flush(&mut self) {
        let start = self.scanner.unit_start.unwrap_or(0);
        let residual = self.buffer.get(start..).unwrap_or_default().trim();
        if !residual.is_empty() {
            debug!(preview = %preview(residual), "Flushing residual buffer");
            self.ready.push_back(Frame::Unit(residual.to_string()));
        }
        self.reset();
    }

    /// Descarta o buffer e o estado do scanner. Unidades prontas são mantidas.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
        self.scanner = Scanner::default();
    }

    fn scan(&mut self) {
        let mut completed = Vec::new();
        let s = &mut self.scanner;

        for (offset, c) in self.buffer[self.scanned..].char_indices() {
            let idx = self.scanned + offset;

            let Some(start) = s.unit_start else {
                if c.is_whitespace() {
                    continue;
                }
                s.unit_start = Some(idx);
                if c == '{' || c == '[' {
                    s.depth = 1;
                } else {
                    s.stray = true;
                }
                continue;
            };

            if s.stray {
                match c {
                    '\n' => {
                        completed.push(start..idx);
                        *s = Scanner::default();
                    }
                    '{' | '[' => {
                        completed.push(start..idx);
                        *s = Scanner {
                            unit_start: Some(idx),
                            depth: 1,
                            ..Scanner::default()
                        };
                    }
                    _ => {}
                }
                continue;
            }

            if let Some(q) = s.quote {
                if s.escaped {
                    s.escaped = false;
                } else if c == '\\' {
                    s.escaped = true;
                } else if c == q {
                    s.quote = None;
                }
                continue;
            }

            match c {
                '"' | '\'' => s.quote = Some(c),
                '{' | '[' => s.depth += 1,
                '}' | ']' => {
                    s.depth = s.depth.saturating_sub(1);
                    if s.depth == 0 {
                        completed.push(start..idx + c.len_utf8());
                        *s = Scanner::default();
                    }
                }
                _ => {}
            }
        }

        for range in completed {
            let unit = self.buffer[range].trim();
            if !unit.is_empty() {
                self.ready.push_back(Frame::Unit(unit.to_string()));
            }
        }

        // Compacta: mantém apenas a unidade em aberto.
        match self.scanner.unit_start {
            Some(start) => {
                self.buffer.drain(..start);
                self.scanner.unit_start = Some(0);
                self.scanned = self.buffer.len();
            }
            None => {
                self.buffer.clear();
                self.scanned = 0;
            }
        }
    }
}

impl Default for MessageFramer {
    fn default() -> Self {
        Self::new(4 * 1024 * 1024)
    }
}

fn has_marker(chunk: &str) -> bool {
    chunk.contains('{') || chunk.contains('[') || chunk.contains("jsonrpc")
}

/// Prepara uma mensagem de saída: uma linha terminada em `\n`, sem quebras
/// de linha internas. Vários documentos viram uma linha cada.
pub fn frame_line(text: &str) -> String {
    let text = text.trim_end_matches(['\r', '\n']);
    if !text.contains(['\r', '\n']) {
        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');
        return line;
    }

    let documents: Result<Vec<serde_json::Value>, _> =
        serde_json::Deserializer::from_str(text).into_iter().collect();
    if let Ok(documents) = documents {
        let mut out = String::with_capacity(text.len() + documents.len());
        for document in documents {
            out.push_str(&document.to_string());
            out.push('\n');
        }
        if !out.is_empty() {
            return out;
        }
    }

    let mut line: String = text
        .chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect();
    line.push('\n');
    line
}
