//! Interface de linha de comando do Critica.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::types::config::TransportMode;

/// Critica - servidor MCP de revisão de código.
#[derive(Parser, Debug)]
#[command(name = "critica")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Arquivo de configuração.
    #[arg(short, long, default_value = "critica.toml", global = true)]
    pub config: PathBuf,

    /// Modo verbose.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Modo silencioso.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Comando a executar.
    #[command(subcommand)]
    pub command: Commands,
}

/// Comandos disponíveis.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Cria um critica.toml com os valores padrão.
    Init {
        /// Diretório de destino (padrão: diretório atual).
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Inicia o servidor MCP.
    Serve {
        /// Transporte (stdio ou http).
        #[arg(short, long)]
        transport: Option<TransportMode>,

        /// Endereço do transporte HTTP.
        #[arg(long)]
        host: Option<String>,

        /// Porta do transporte HTTP.
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Mostra provedores, transporte e cache configurados.
    Status,

    /// Lista os modelos disponíveis.
    Models,

    /// Repara JSON lido de um arquivo ou de stdin e escreve em stdout.
    Repair {
        /// Arquivo de entrada (padrão: stdin).
        file: Option<PathBuf>,
    },

    /// Mostra versão.
    Version,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve_flags() {
        let cli = Cli::parse_from([
            "critica", "serve", "--transport", "http", "--host", "0.0.0.0", "--port", "9000",
        ]);
        match cli.command {
            Commands::Serve {
                transport,
                host,
                port,
            } => {
                assert_eq!(transport, Some(TransportMode::Http));
                assert_eq!(host.as_deref(), Some("0.0.0.0"));
                assert_eq!(port, Some(9000));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["critica", "status", "--verbose", "--config", "x.toml"]);
        assert!(cli.verbose);
        assert_eq!(cli.config, PathBuf::from("x.toml"));
    }

    #[test]
    fn test_invalid_transport_rejected() {
        assert!(Cli::try_parse_from(["critica", "serve", "--transport", "carrier-pigeon"]).is_err());
    }
}
