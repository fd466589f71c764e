use std::sync::Arc;

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{
        EnvFilter, Layer, fmt, layer::SubscriberExt, registry::Registry,
        util::SubscriberInitExt,
    },
    waygate_provider::loopback::LoopbackProvider,
};

#[derive(Parser)]
#[command(name = "waygate", about = "Waygate — multi-tenant messaging gateway")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server.
    Gateway {
        /// Bind address; overrides the config file.
        #[arg(long)]
        bind: Option<String>,
        /// Listen port; overrides the config file.
        #[arg(long, env = "WAYGATE_PORT")]
        port: Option<u16>,
    },
    /// Print the effective configuration.
    Config,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let format: Box<dyn Layer<Registry> + Send + Sync> = if cli.json_logs {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().with_target(false).with_ansi(true).boxed()
    };

    tracing_subscriber::registry().with(format).with(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "waygate starting");

    match cli.command {
        Commands::Gateway { bind, port } => {
            let mut config = waygate_config::discover_and_load();
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            // The loopback provider stands in until a real network binding
            // is linked at this seam.
            let provider = Arc::new(LoopbackProvider::new());
            waygate_gateway::start_gateway(config, provider).await
        },
        Commands::Config => {
            let config = waygate_config::discover_and_load();
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        },
    }
}
