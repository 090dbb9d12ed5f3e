use clap::{Arg, ArgAction, Command};

pub fn build_cli() -> Command {
    Command::new("webcompat-proxy")
        .about("XHR proxy for the webcompat issue tracker")
        .disable_version_flag(true)
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .num_args(1)
                .help("Override RUST_LOG level (e.g., info, debug)"),
        )
        .arg(
            Arg::new("listen")
                .long("listen")
                .num_args(1)
                .value_parser(clap::value_parser!(std::net::SocketAddr))
                .help("Address to listen on (overrides WEBCOMPAT_LISTEN)"),
        )
        .arg(
            Arg::new("check-config")
                .long("check-config")
                .help("Validate configuration from the environment and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("version")
                .long("version")
                .help("Print version and exit")
                .action(ArgAction::SetTrue),
        )
}

pub fn init_logging(level: Option<&str>) {
    // Explicit level wins, then RUST_LOG, then info.
    let env = env_logger::Env::default().default_filter_or("info");
    let mut builder = env_logger::Builder::from_env(env);
    if let Some(lvl) = level {
        builder.parse_filters(lvl);
    }
    builder.init();
}
