use clap::Parser;
use critica::cli::{Cli, Commands};
use critica::types::config::Config;
use critica::CriticaResult;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load configuration first (no logging yet)
    let mut config = if cli.config.exists() {
        Config::load(&cli.config).unwrap_or_else(|e| {
            eprintln!("Warning: ignoring {}: {}", cli.config.display(), e);
            Config::default_config()
        })
    } else {
        Config::default_config()
    };
    config.apply_env_overrides();

    // CLI flags > LOG_LEVEL > config file
    let log_level = if cli.quiet {
        "error".to_string()
    } else if cli.verbose {
        "debug".to_string()
    } else {
        config.general.log_level.clone()
    };

    let filter = EnvFilter::from_default_env().add_directive(
        format!("critica={}", log_level)
            .parse()
            .unwrap_or_else(|_| "critica=info".parse().expect("fallback directive is valid")),
    );

    // stdout é o canal do protocolo no modo stdio: logs sempre em stderr
    if config.general.log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }

    critica::mcp::install_panic_hook();

    tracing::debug!("Configuration loaded from: {}", cli.config.display());

    if let Err(e) = run(cli, &config).await {
        tracing::error!(error = %e, "Command failed");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &Config) -> CriticaResult<()> {
    match cli.command {
        Commands::Init { path } => {
            critica::cli::commands::init(path).await?;
        }
        Commands::Serve {
            transport,
            host,
            port,
        } => {
            critica::cli::commands::serve(transport, host, port, config).await?;
        }
        Commands::Status => {
            critica::cli::commands::status(config).await?;
        }
        Commands::Models => {
            critica::cli::commands::models(config).await?;
        }
        Commands::Repair { file } => {
            critica::cli::commands::repair(file.as_deref(), config).await?;
        }
        Commands::Version => {
            critica::cli::commands::version();
        }
    }

    Ok(())
}
