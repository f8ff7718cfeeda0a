// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! peerd
//!
//! Peer discovery daemon: runs the configured explorers every cycle and
//! notifies the configured handlers of peer membership changes.
//!
//! # Usage
//!
//! ```bash
//! # Default configuration file (/etc/peerd/peerd.yaml)
//! peerd
//!
//! # Custom configuration, verbose logging
//! peerd --config ./peerd.yaml --log-level debug
//!
//! # Validate configuration and plugins, then exit
//! peerd --config ./peerd.yaml --check
//! ```

use clap::Parser;
use peerd::plugins::register_builtin;
use peerd::{Orchestrator, PeerdConfig, PluginRegistry};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// peerd - Peer discovery daemon
#[derive(Parser, Debug)]
#[command(name = "peerd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (YAML format)
    #[arg(short, long, default_value = peerd::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level, overrides the configuration file (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Validate the configuration and resolve every plugin, then exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = PeerdConfig::from_file(&args.config)?;

    // Initialize logging
    let level = args.log_level.as_deref().unwrap_or(&config.log_level);
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("Loaded config from {:?}", args.config);

    let mut plugins = PluginRegistry::new();
    register_builtin(&mut plugins);

    let orchestrator = Orchestrator::from_config(&config, &plugins)?;

    if args.check {
        println!("Configuration valid!");
        println!();
        println!("TTL:                 {:?}", config.ttl);
        println!("Exploration timeout: {:?}", config.exploration_timeout);
        println!("Groups:              {}", orchestrator.groups().len());
        for group in orchestrator.groups() {
            println!("  [{}]", group.name());
            for explorer in group.explorers() {
                println!("    explorer {}", explorer.label());
            }
            for handler in group.handlers() {
                println!("    handler  {}", handler.label());
            }
        }
        return Ok(());
    }

    info!("+----------------------------------------------------+");
    info!(
        "|       peerd v{}                                 |",
        env!("CARGO_PKG_VERSION")
    );
    info!("+----------------------------------------------------+");
    info!("|  Groups:  {:40} |", orchestrator.groups().len());
    info!("|  TTL:     {:40} |", format!("{:?}", config.ttl));
    info!(
        "|  Cycle:   {:40} |",
        format!("{:?}", config.exploration_timeout)
    );
    info!("+----------------------------------------------------+");

    // Handle shutdown signals
    let shutdown = orchestrator.shutdown_token();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received, stopping...");
        shutdown.cancel();
    });

    orchestrator.run().await?;

    info!("Stopped");
    Ok(())
}
