mod cli;

use anyhow::Context;
use log::info;
use std::net::SocketAddr;
use std::sync::Arc;
use webcompat_proxy::config::Config;
use webcompat_proxy::dispatch::Dispatcher;
use webcompat_proxy::http::GithubClient;
use webcompat_proxy::server::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cmd = cli::build_cli();
    let matches = cmd.get_matches();
    let log_level = matches.get_one::<String>("log-level").cloned();

    cli::init_logging(log_level.as_deref());

    if matches.get_flag("version") {
        println!("webcompat-proxy {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let mut cfg = Config::from_env().context("invalid configuration")?;
    if let Some(addr) = matches.get_one::<SocketAddr>("listen") {
        cfg.listen_addr = *addr;
    }
    if matches.get_flag("check-config") {
        println!(
            "configuration ok: issues={} private={} statuses={}",
            cfg.issues_repo,
            cfg.private_repo,
            cfg.statuses.len()
        );
        return Ok(());
    }

    let cfg = Arc::new(cfg);
    let client = GithubClient::new(&cfg).context("building upstream client")?;
    let dispatcher =
        Dispatcher::new(Arc::clone(&cfg), client).context("building comment renderer")?;
    let state = Arc::new(AppState::new(dispatcher));
    let listener = tokio::net::TcpListener::bind(cfg.listen_addr)
        .await
        .with_context(|| format!("binding {}", cfg.listen_addr))?;

    tokio::select! {
        res = server::serve(listener, state) => res?,
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
    }
    Ok(())
}
