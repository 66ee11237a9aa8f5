//! Tipos compartilhados do Critica.

pub mod config;
pub mod errors;
pub mod requests;
pub mod responses;
