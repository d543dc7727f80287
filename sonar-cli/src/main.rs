use clap::{Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "sonar", version)]
#[command(about = "Sonar - local A2A agent discovery and health monitoring")]
struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json, global = true)]
    log_format: LogFormat,

    /// YAML file with known agents and scan targets (overrides SONAR_CONFIG_FILE)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the query API with periodic discovery
    Serve {
        /// Bind address (default: SONAR_BIND_ADDR or 0.0.0.0:8090)
        #[arg(long)]
        bind: Option<SocketAddr>,
        /// Only discover on request
        #[arg(long)]
        no_background: bool,
    },
    /// Run one discovery round and print the results
    Scan {
        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Probe a single base URL
    Check {
        #[arg(long)]
        url: String,
    },
}

fn init_logging(format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();
    let env_filter = match "info".parse() {
        Ok(directive) => env_filter.add_directive(directive),
        Err(_) => env_filter,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);
    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_format);
    let config = cli.config.as_deref();

    let result = match cli.command {
        Commands::Serve {
            bind,
            no_background,
        } => commands::serve(config, bind, !no_background).await.map(|_| true),
        Commands::Scan { json } => commands::scan(config, json).await.map(|_| true),
        Commands::Check { url } => commands::check(&url).await,
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            ExitCode::FAILURE
        }
    }
}
