mod cache;
mod config;
mod logging;
mod manifest;
mod net;
#[cfg(test)]
mod testing;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use cache::{CacheManager, CacheStorage, LocalClients, SqliteStorage};
use net::HttpTransport;

#[derive(Parser, Debug)]
#[command(name = "shellcache")]
#[command(about = "Offline-first asset cache with versioned cache generations")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./shellcache.yaml or $XDG_CONFIG_HOME/shellcache/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Increase log verbosity (-v info, -vv debug)
  #[arg(short, long, action = clap::ArgAction::Count, global = true)]
  verbose: u8,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Provision the current generation from the manifest
  Install,
  /// Delete every generation except the current one
  Activate,
  /// Fetch a URL through the cache
  Fetch {
    /// Absolute URL, or a path resolved against the configured origin
    url: String,
    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// Request body (sent on pass-through only)
    #[arg(short, long)]
    data: Option<String>,
    /// Print status and headers before the body
    #[arg(short, long)]
    include: bool,
  },
  /// List cache generations
  Generations,
  /// List entries stored in a generation
  Entries {
    /// Generation to list (default: current)
    #[arg(short, long)]
    generation: Option<String>,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let config = config::Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(args.verbose, config.log_file.as_deref())?;

  let storage = match &config.storage.path {
    Some(path) => SqliteStorage::open_at(path)?,
    None => SqliteStorage::open()?,
  };
  let transport = HttpTransport::new(&config.network)?;
  let clients = Arc::new(LocalClients::new());
  let manager = CacheManager::new(config.cache_config()?, storage, transport, clients.clone());

  let result = run(&manager, args.command).await;

  // Let in-flight write-backs land before the process exits
  manager.settle().await;
  debug!(claims = clients.claims(), "Done");

  result
}

async fn run(manager: &CacheManager<SqliteStorage, HttpTransport>, command: Command) -> Result<()> {
  match command {
    Command::Install => {
      manager.install().await;
      print_entries(manager, manager.generation())
    }
    Command::Activate => {
      let report = manager.activate().await;
      for name in &report.removed {
        println!("deleted {}", name);
      }
      for name in &report.failed {
        println!("failed  {}", name);
      }
      println!(
        "active  {}{}",
        manager.generation(),
        if report.claimed { " (clients claimed)" } else { "" }
      );
      Ok(())
    }
    Command::Fetch {
      url,
      method,
      data,
      include,
    } => {
      let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|e| eyre!("Invalid HTTP method '{}': {}", method, e))?;
      let mut request = manager.request(method, &url)?;
      if let Some(data) = data {
        request = request.with_body(data.into_bytes());
      }

      let result = manager.fetch(&request).await?;
      match result.cached_at {
        Some(at) => eprintln!("source: {} (cached {})", result.source, at.format("%Y-%m-%d %H:%M:%S")),
        None => eprintln!("source: {}", result.source),
      }
      if let Some(content_type) = result.data.content_type() {
        eprintln!("content-type: {}", content_type);
      }

      let mut out = std::io::stdout().lock();
      if include {
        writeln!(out, "HTTP {}", result.data.status)?;
        for (name, value) in &result.data.headers {
          writeln!(out, "{}: {}", name, value)?;
        }
        writeln!(out)?;
      }
      out.write_all(&result.data.body)?;
      out.flush()?;
      Ok(())
    }
    Command::Generations => {
      for name in manager.storage().generation_names()? {
        let marker = if name == manager.generation() { "*" } else { " " };
        println!("{} {}", marker, name);
      }
      Ok(())
    }
    Command::Entries { generation } => {
      let generation = generation.as_deref().unwrap_or(manager.generation());
      print_entries(manager, generation)
    }
  }
}

fn print_entries(
  manager: &CacheManager<SqliteStorage, HttpTransport>,
  generation: &str,
) -> Result<()> {
  let entries = manager.storage().keys(generation)?;
  for entry in &entries {
    println!(
      "{}  {}  {}",
      entry.cached_at.format("%Y-%m-%d %H:%M:%S"),
      entry.status,
      entry.key
    );
  }
  println!("{} entries in {}", entries.len(), generation);
  Ok(())
}
