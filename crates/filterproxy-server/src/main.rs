use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::{Parser, ValueEnum};
use filterproxy_api::{Mount, proxy_router};
use filterproxy_target::{
    EndpointResolver, KubeEndpointsResolver, SERVICE_ACCOUNT_TOKEN_PATH, Target, UpstreamClient,
    UpstreamOptions, resolve_credential,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;

use config::Config;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(
    name = "exporter-filterproxy",
    about = "Proxies Prometheus exporters and filters their metrics by label"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Listen address, overriding the one in the configuration file.
    #[arg(long)]
    addr: Option<String>,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let env_filter = EnvFilter::from_default_env()
        .add_directive("exporter_filterproxy=info".parse()?)
        .add_directive("filterproxy_api=info".parse()?)
        .add_directive("filterproxy_target=info".parse()?);
    match cli.log_format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(env_filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init(),
    }

    let mut config = Config::load(&cli.config).inspect_err(|err| {
        error!(config = %cli.config.display(), error = %err, "failed to load configuration");
    })?;
    if let Some(addr) = cli.addr {
        config.addr = addr;
    }

    let resolver: Option<Arc<dyn EndpointResolver>> = if config.needs_cluster_client() {
        Some(Arc::new(KubeEndpointsResolver::try_default().await?))
    } else {
        None
    };

    let mut mounts = Vec::with_capacity(config.endpoints.len());
    for (name, endpoint) in &config.endpoints {
        info!(endpoint = %name, path = %endpoint.path, "registering endpoint");

        let credential = resolve_credential(&endpoint.auth, Path::new(SERVICE_ACCOUNT_TOKEN_PATH))
            .inspect_err(|err| {
                error!(endpoint = %name, error = %err, "failed to resolve credential");
            })?;
        let upstream = UpstreamClient::new(UpstreamOptions {
            credential,
            timeout: endpoint.timeout,
            insecure_skip_verify: endpoint.insecure_skip_verify,
        })?;
        let target = Target::build(
            endpoint.identity()?,
            upstream,
            endpoint.refresh_interval,
            resolver.clone(),
        )?;
        mounts.push(Mount::new(endpoint.path.clone(), target));
    }

    let app = proxy_router(mounts);
    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("exporter-filterproxy listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("exporter-filterproxy stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutting down");
}
