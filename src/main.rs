mod cache;
mod config;
mod gateway;
mod host;
mod http;
mod notify;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::cache::{MemoryStore, PartitionStore, SqliteStore};
use crate::gateway::{classify, Gateway, Outcome, Route};
use crate::host::ConsoleHost;
use crate::http::{HttpNetwork, Request, Response};

#[derive(Parser, Debug)]
#[command(name = "hors-ligne")]
#[command(about = "Offline cache gateway for the Togo Immo web app")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/hors-ligne/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Keep partitions in memory instead of the on-disk cache database
  #[arg(long, global = true)]
  ephemeral: bool,

  /// Write logs to this file instead of stderr
  #[arg(long, global = true)]
  log_file: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Populate the static partition with the shell assets
  Install,
  /// Delete partitions left over from previous versions
  Activate,
  /// Send a request through the gateway
  Fetch {
    /// Path or absolute URL
    url: String,
    #[command(flatten)]
    request: RequestArgs,
    /// Print the response body
    #[arg(long)]
    body: bool,
  },
  /// Show how a request would be routed, without touching the network
  Classify {
    url: String,
    #[command(flatten)]
    request: RequestArgs,
  },
  /// List live partitions
  Partitions,
  /// Handle a push message (JSON: {"title", "body", "url"})
  Push { payload: Option<String> },
  /// Handle a click on a notification
  Click {
    url: Option<String>,
    #[arg(long, default_value = notify::ACTION_EXPLORE)]
    action: String,
  },
}

#[derive(clap::Args, Debug)]
struct RequestArgs {
  /// Accept header, e.g. text/html or image/*
  #[arg(short, long)]
  accept: Option<String>,

  #[arg(short = 'X', long, default_value = "GET")]
  method: String,
}

impl RequestArgs {
  fn build(&self, config: &config::Config, url: &str) -> Result<Request> {
    let method = Method::from_bytes(self.method.to_uppercase().as_bytes())
      .map_err(|e| eyre!("Invalid method {}: {}", self.method, e))?;
    let request = Request::new(method, config.resolve(url)?);
    Ok(match &self.accept {
      Some(accept) => request.with_accept(accept.clone()),
      None => request,
    })
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_tracing(args.log_file.as_deref())?;

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;
  let network = HttpNetwork::new()?;

  if args.ephemeral {
    run(Gateway::new(config, MemoryStore::new(), network, ConsoleHost), args.command).await
  } else {
    let store = SqliteStore::open_default()?;
    run(Gateway::new(config, store, network, ConsoleHost), args.command).await
  }
}

fn init_tracing(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let filter =
    EnvFilter::try_from_env("HORS_LIGNE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

  match log_file {
    Some(path) => {
      let dir = path.parent().unwrap_or_else(|| Path::new("."));
      let file_name = path
        .file_name()
        .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;
      let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
      Ok(Some(guard))
    }
    None => {
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
      Ok(None)
    }
  }
}

async fn run<S: PartitionStore>(
  gateway: Gateway<S, HttpNetwork, ConsoleHost>,
  command: Command,
) -> Result<()> {
  match command {
    Command::Install => {
      let report = gateway.install().await?;
      println!("{}", report.partition);
      for asset in &report.stored {
        println!("  stored {}", asset);
      }
      for asset in &report.failed {
        println!("  failed {}", asset);
      }
      debug!("Gateway state: {:?}", gateway.state());
    }
    Command::Activate => {
      let report = gateway.activate().await?;
      for name in &report.deleted {
        println!("deleted {}", name);
      }
      println!("live: {}", report.kept.join(", "));
      debug!("Gateway state: {:?}", gateway.state());
    }
    Command::Fetch { url, request, body } => {
      let request = request.build(gateway.config(), &url)?;
      match gateway.dispatch(&request).await {
        Some(mut served) => {
          if let Outcome::Hit(snapshot) = &served.outcome {
            debug!("Served {} cached at {}", snapshot.key, snapshot.cached_at);
          }
          print_response(served.outcome.kind(), served.outcome.response(), body);
          // The runtime goes away with this command; let the refresh write first
          if let Some(refreshed) = served.settle().await {
            debug!("Refreshed {} ({})", request.url, refreshed.status);
          }
        }
        None => print_response("bypass", &gateway.passthrough(&request).await?, body),
      }
    }
    Command::Classify { url, request } => {
      let request = request.build(gateway.config(), &url)?;
      match classify(gateway.config(), &request) {
        Route::Bypass => println!("bypass"),
        Route::Serve(strategy) => println!(
          "{:?} (cached: {})",
          strategy,
          if gateway.is_cached(&request) { "yes" } else { "no" }
        ),
      }
    }
    Command::Partitions => {
      let current = [
        gateway.config().static_partition(),
        gateway.config().dynamic_partition(),
      ];
      for name in gateway.store().partitions()? {
        let marker = if current.contains(&name) { "*" } else { " " };
        println!("{} {} ({} entries)", marker, name, gateway.store().entry_count(&name)?);
      }
    }
    Command::Push { payload } => {
      gateway.on_push(payload.as_deref().map(str::as_bytes));
    }
    Command::Click { url, action } => {
      if gateway
        .on_notification_click(url.as_deref(), Some(action.as_str()))
        .is_none()
      {
        println!("dismissed");
      }
    }
  }

  Ok(())
}

fn print_response(kind: &str, response: &Response, body: bool) {
  println!(
    "{} {} {} ({}, {} bytes)",
    kind,
    response.status,
    response.status_text,
    response.header("content-type").unwrap_or("-"),
    response.body.len()
  );
  if body {
    println!("{}", String::from_utf8_lossy(&response.body));
  }
}
