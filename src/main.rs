use std::{net::SocketAddr, path::Path, sync::Arc};

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use meridian::{
    adapters::{self, GatewayHandler, UpstreamClient, spawn_refresh_task},
    config::models::NodeConfig,
    core::{
        ConfigResolver, GatewayService, RouteTable, ServiceRegistry, registry::spawn_eviction_sweeper,
    },
    ports::http_client::HttpClient,
    tracing_setup,
    utils::graceful_shutdown::GracefulShutdown,
};
use tower_http::{compression::CompressionLayer, trace::TraceLayer};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "meridian.yaml")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "meridian.yaml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "meridian.yaml")]
        config: String,
    },
    /// Start the control plane and gateway (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = "meridian.yaml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    let (command, config_path) = match args.command {
        Some(Commands::Validate { config }) => ("validate", config),
        Some(Commands::Init { config }) => ("init", config),
        Some(Commands::Serve { config }) => ("serve", config),
        None => ("serve", args.config), // Default to serve with config from args
    };

    match command {
        "validate" => {
            return validate_config_command(&config_path).await;
        }
        "init" => {
            return init_config_command(&config_path).await;
        }
        "serve" => {
            // Continue with normal server startup
        }
        _ => unreachable!(),
    }

    tracing_setup::init_tracing().map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;

    tracing::info!("Loading configuration from {config_path}");
    let config: NodeConfig = meridian::config::load_config(&config_path)
        .await
        .with_context(|| format!("Failed to load config from {config_path}"))?;
    meridian::config::NodeConfigValidator::validate(&config)
        .map_err(|e| eyre!("Invalid configuration: {e}"))?;

    // Registry with its background eviction sweep.
    let lease_timeout = config
        .registry
        .lease_timeout()
        .map_err(|e| eyre!("Invalid lease_timeout: {e}"))?;
    let sweep_interval = config
        .registry
        .sweep_interval()
        .map_err(|e| eyre!("Invalid sweep_interval: {e}"))?;
    let registry = Arc::new(ServiceRegistry::new(lease_timeout));
    let sweeper_handle = spawn_eviction_sweeper(registry.clone(), sweep_interval);

    // Config repository with its on-change refresh task.
    let config_source = Arc::new(
        adapters::FileConfigSource::new(
            &config.config_repo.root,
            &config.config_repo.default_label,
        )
        .context("Failed to open config repository")?,
    );
    let refresh_handle = spawn_refresh_task(config_source.clone());
    let resolver = Arc::new(ConfigResolver::new(
        config_source.clone(),
        &config.config_repo.default_label,
    ));

    // Gateway data plane.
    let route_table =
        RouteTable::from_definitions(&config.routes).context("Failed to compile route table")?;
    let gateway = Arc::new(GatewayService::new(registry.clone(), route_table));
    let http_client: Arc<dyn HttpClient> = Arc::new(UpstreamClient::new());
    let upstream_timeout = config
        .upstream
        .timeout()
        .map_err(|e| eyre!("Invalid upstream timeout: {e}"))?;
    let gateway_handler = Arc::new(GatewayHandler::new(gateway, http_client, upstream_timeout));

    let graceful_shutdown = Arc::new(GracefulShutdown::new());
    let signal_handler_shutdown = graceful_shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signal_handler_shutdown.run_signal_handler().await {
            tracing::error!("Signal handler error: {}", e);
        }
    });

    let gateway_app = adapters::gateway_handler::router(gateway_handler)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http());
    let control_app = adapters::registry_api::router(registry)
        .merge(adapters::config_api::router(resolver))
        .layer(TraceLayer::new_for_http());

    let gateway_addr: SocketAddr = config
        .listen_addr
        .parse()
        .context("Failed to parse listen address")?;
    let control_addr: SocketAddr = config
        .control_addr
        .parse()
        .context("Failed to parse control address")?;

    for route in config.routes.iter() {
        tracing::info!(
            id = %route.id,
            prefix = %route.path_prefix,
            service = %route.service,
            "configured route"
        );
    }

    let gateway_listener = tokio::net::TcpListener::bind(gateway_addr)
        .await
        .context("Failed to bind gateway address")?;
    let control_listener = tokio::net::TcpListener::bind(control_addr)
        .await
        .context("Failed to bind control address")?;

    tracing::info!("Meridian gateway listening on {gateway_addr}");
    tracing::info!("Meridian control plane (registry + config) listening on {control_addr}");
    println!("Meridian gateway listening on {gateway_addr}, control plane on {control_addr}");

    let server_result = tokio::select! {
        result = axum::serve(
            gateway_listener,
            gateway_app.into_make_service_with_connect_info::<SocketAddr>(),
        ) => {
            result.context("Gateway server error")
        },
        result = axum::serve(
            control_listener,
            control_app.into_make_service_with_connect_info::<SocketAddr>(),
        ) => {
            result.context("Control plane server error")
        },
        shutdown_reason = graceful_shutdown.wait_for_shutdown_signal() => {
            tracing::info!("Shutdown signal received: {:?}", shutdown_reason);

            sweeper_handle.abort();
            if let Some(handle) = refresh_handle {
                handle.abort();
            }

            tracing::info!("Graceful shutdown completed");
            Ok(())
        }
    };

    server_result?;

    Ok(())
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    use meridian::config::{NodeConfigValidator, load_config};

    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e}");
            std::process::exit(1);
        }
    };

    match NodeConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Gateway Address: {}", config.listen_addr);
            println!("   • Control Address: {}", config.control_addr);
            println!("   • Routes: {}", config.routes.len());
            println!("   • Config Repository: {}", config.config_repo.root);
            println!("   • Lease Timeout: {}", config.registry.lease_timeout);
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Verify address format (e.g., '127.0.0.1:8080')");
            println!("   • Ensure path prefixes start with '/'");
            println!("   • Ensure durations use valid units (s, m, h)");
            println!("   • Keep lease_timeout larger than heartbeat_interval");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# Meridian control plane configuration

# Gateway (data plane) listen address
listen_addr: "127.0.0.1:8080"

# Registry + config server (control plane) listen address
control_addr: "127.0.0.1:8761"

registry:
  lease_timeout: "30s"
  heartbeat_interval: "10s"
  sweep_interval: "5s"

config_repo:
  root: "./config-repo"
  default_label: "main"

upstream:
  timeout: "10s"

# Example route: strip "/api" and forward to task-service instances
routes:
  - id: "tasks"
    order: 0
    path_prefix: "/api/tasks"
    service: "task-service"
    strategy: "round_robin"
    filters:
      - kind: "strip_prefix"
        parts: 1
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'meridian serve --config {config_path}' to start the node");
    Ok(())
}
