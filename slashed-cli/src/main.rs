//! Slashed CLI

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use slashed_config::{ConfigResolver, Lookup};
use slashed_runtime::prelude::*;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "slashed")]
#[command(about = "Slashed HTTP runtime", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve an application rooted at a base directory
    Serve {
        /// Application base directory (holds `.env` and `config/`)
        #[arg(short, long, default_value = ".")]
        basedir: PathBuf,

        /// Listen address; defaults to `HOST`/`PORT` from the environment
        /// file or `app.host`/`app.port` from the configuration
        #[arg(short, long, env = "SLASHED_ADDR")]
        addr: Option<String>,

        /// Log level (trace, debug, info, warn, error)
        #[arg(short, long, default_value = "info")]
        log_level: String,
    },

    /// Resolve a setting or expression and print it as JSON
    Get {
        /// Setting key or expression, e.g. `database.host` or `env:PORT|8000`
        key: String,

        /// Application base directory
        #[arg(short, long, default_value = ".")]
        basedir: PathBuf,

        /// Report where an on-disk lookup stopped
        #[arg(long)]
        explain: bool,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            basedir,
            addr,
            log_level,
        } => {
            init_tracing(&log_level)?;

            let app = build_application(basedir)?;
            let addr = match addr {
                Some(addr) => addr,
                None => default_addr(&app)?,
            };

            tracing::info!(
                addr = %addr,
                env = app.env().as_deref().unwrap_or("development"),
                "Starting Slashed"
            );
            app.listen(addr.as_str()).await?;
            Ok(())
        }

        Commands::Get {
            key,
            basedir,
            explain,
        } => {
            let resolver = ConfigResolver::new(basedir);

            if explain {
                match resolver.explain(&key)? {
                    Lookup::Found(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                    Lookup::ModuleMissing { module } => {
                        println!("undefined (no config module \"{module}\")")
                    }
                    Lookup::PathMissing { module, segment } => {
                        println!("undefined (module \"{module}\" has no \"{segment}\")")
                    }
                }
                return Ok(());
            }

            match resolver.get(&key)? {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => println!("undefined"),
            }
            Ok(())
        }

        Commands::Version => {
            println!("Slashed HTTP runtime");
            println!("Version: {}", env!("CARGO_PKG_VERSION"));
            println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
            Ok(())
        }
    }
}

/// Logger, the configured `default` group if any, and a status route
fn build_application(basedir: PathBuf) -> Result<Application> {
    let mut app = Application::new(basedir);
    app.use_named("logger");

    if app.get("middleware.groups.default")?.is_some() {
        app.use_group("default");
    }

    let name = app
        .get("config:app.name|slashed")?
        .unwrap_or_else(|| json!("slashed"));
    let env = app.env();
    app.context_template_mut()
        .set("app", json!({ "name": name, "env": env }));

    app.use_middleware(
        Router::new()
            .get(
                "/",
                from_fn(|ctx, _next| {
                    Box::pin(async move {
                        let info = ctx.get("app").cloned().unwrap_or(Value::Null);
                        ctx.set_body(info);
                        Ok(())
                    })
                }),
            )
            .routes(),
    );

    // Fail fast on unknown middleware names before binding
    app.handler().context("invalid middleware configuration")?;
    Ok(app)
}

fn default_addr(app: &Application) -> Result<String> {
    let host = app
        .get("env:HOST|config:app.host|127.0.0.1")?
        .unwrap_or_else(|| json!("127.0.0.1"));
    let port = app
        .get("env:PORT|config:app.port|8000")?
        .unwrap_or_else(|| json!(8000));

    let host = match host {
        Value::String(host) => host,
        other => other.to_string(),
    };
    let port = match port {
        Value::String(port) => port,
        other => other.to_string(),
    };
    Ok(format!("{host}:{port}"))
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_level(true),
        )
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(filter.into()))
        .init();

    Ok(())
}
