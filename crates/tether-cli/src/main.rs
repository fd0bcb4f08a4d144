use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use tether_core::Config;
use tether_core::Route;
use tether_core::ENV_TETHER_CONFIG;
use tether_sync::resolve_ws_url;
use tether_sync::HttpApiClient;
use tether_sync::Router;
use tether_sync::SyncSession;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use url::Url;

use crate::view::ChatView;

mod input;
mod ui;
mod view;

const COMMAND_BUFFER: usize = 64;

#[derive(Debug, Parser)]
#[command(name = "tether", version, about = "Terminal client for a realtime chat server")]
struct Cli {
    /// Config file. Falls back to $TETHER_CONFIG, then the user config dir.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Open the chat client (default).
    Connect(ConnectArgs),
    /// Print the effective configuration and socket URL.
    Config(ServerArgs),
}

#[derive(Debug, Default, Args)]
struct ServerArgs {
    #[arg(long)]
    api_url: Option<String>,
    #[arg(long)]
    ws_url: Option<String>,
    #[arg(long)]
    page_origin: Option<String>,
    #[arg(long)]
    session_cookie: Option<String>,
}

#[derive(Debug, Default, Args)]
struct ConnectArgs {
    #[command(flatten)]
    server: ServerArgs,
    /// Where to write logs; the terminal belongs to the UI.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl ServerArgs {
    fn apply(self, config: &mut Config) {
        if let Some(api_url) = self.api_url {
            config.server.api_base_url = api_url;
        }
        if let Some(ws_url) = self.ws_url {
            config.server.ws_url = Some(ws_url);
        }
        if let Some(page_origin) = self.page_origin {
            config.server.page_origin = page_origin;
        }
        if let Some(cookie) = self.session_cookie {
            config.server.session_cookie = Some(cookie);
        }
    }
}

/// Publishes route changes to the UI task.
struct TerminalRouter {
    route: watch::Sender<Route>,
}

impl Router for TerminalRouter {
    fn navigate(&self, route: Route) {
        tracing::info!(?route, "navigating");
        self.route.send_replace(route);
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let env_path = std::env::var_os(ENV_TETHER_CONFIG).map(PathBuf::from);
    let config_path = config_path(cli.config, env_path)?;
    let mut config = Config::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    match cli.command.unwrap_or(Command::Connect(ConnectArgs::default())) {
        Command::Config(server) => {
            server.apply(&mut config);
            config.validate()?;
            print!("{}", toml::to_string_pretty(&config)?);
            println!("# socket: {}", resolve_ws_url(&config.server)?);
            Ok(())
        }
        Command::Connect(args) => {
            args.server.apply(&mut config);
            config.validate()?;
            init_logging(args.log_file)?;
            tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?
                .block_on(connect(config))
        }
    }
}

fn config_path(flag: Option<PathBuf>, env: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(path) = flag.or(env) {
        return Ok(path);
    }
    let base = dirs::config_dir().context("no config directory for this user")?;
    Ok(base.join("tether").join("config.toml"))
}

fn default_log_file() -> anyhow::Result<PathBuf> {
    let base = dirs::data_local_dir().context("no local data directory for this user")?;
    Ok(base.join("tether").join("tether.log"))
}

fn init_logging(log_file: Option<PathBuf>) -> anyhow::Result<()> {
    let path = match log_file {
        Some(path) => path,
        None => default_log_file()?,
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating log directory {}", parent.display()))?;
    }
    let file = open_log(&path)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn open_log(path: &Path) -> anyhow::Result<fs::File> {
    fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))
}

async fn connect(config: Config) -> anyhow::Result<()> {
    let base = Url::parse(&config.server.api_base_url)
        .with_context(|| format!("invalid api url {}", config.server.api_base_url))?;
    let api = HttpApiClient::new(base, config.server.session_cookie.as_deref())?;

    let (route_tx, route_rx) = watch::channel(Route::Conversations);
    let router = TerminalRouter { route: route_tx };
    let session = SyncSession::connect(&config, api, router)?;
    tracing::info!(socket = %resolve_ws_url(&config.server)?, "session started");

    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
    let (view_tx, view_rx) = watch::channel(ChatView::default());
    let sync = tokio::spawn(session.run(commands_rx, move |state| {
        let next = ChatView::capture(state);
        view_tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }));

    let outcome = ui::run(view_rx, route_rx, commands_tx).await;
    match sync.await {
        Ok(_) => tracing::info!("session closed"),
        Err(err) => tracing::error!(error = %err, "session task failed"),
    }
    outcome
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn flag_wins_over_environment() {
        let path = config_path(
            Some(PathBuf::from("/tmp/flag.toml")),
            Some(PathBuf::from("/tmp/env.toml")),
        )
        .unwrap();
        assert_eq!(path, PathBuf::from("/tmp/flag.toml"));

        let path = config_path(None, Some(PathBuf::from("/tmp/env.toml"))).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/env.toml"));
    }

    #[test]
    fn overrides_replace_only_given_fields() {
        let mut config = Config::default();
        ServerArgs {
            ws_url: Some("wss://chat.example/ws/".to_string()),
            session_cookie: Some("session=abc".to_string()),
            ..ServerArgs::default()
        }
        .apply(&mut config);

        assert_eq!(config.server.api_base_url, Config::default().server.api_base_url);
        assert_eq!(config.server.ws_url.as_deref(), Some("wss://chat.example/ws/"));
        assert_eq!(config.server.session_cookie.as_deref(), Some("session=abc"));
    }

    #[test]
    fn cli_defaults_to_connect() {
        let cli = Cli::try_parse_from(["tether"]).unwrap();
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from(["tether", "connect", "--api-url", "http://h:1"]).unwrap();
        match cli.command {
            Some(Command::Connect(args)) => {
                assert_eq!(args.server.api_url.as_deref(), Some("http://h:1"))
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
