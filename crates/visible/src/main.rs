// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Visible - real-time work-session coordination.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod serve;
mod shutdown;
mod sweep;
mod token;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use visible_core::{Role, UserId};

/// Visible - real-time work-session coordination between seekers and providers.
#[derive(Parser, Debug)]
#[command(name = "visible", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP/WebSocket service.
    Serve,
    /// Mint a signed bearer token for local testing.
    Token {
        #[arg(long)]
        user_id: UserId,
        /// seeker or provider
        #[arg(long)]
        role: Role,
    },
    /// Delete expired chat messages once and exit.
    Sweep,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => visible_config::load_and_validate_path(path),
        None => visible_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            visible_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Token { user_id, role }) => token::run_token(&config, user_id, role),
        Some(Commands::Sweep) => sweep::run_sweep(config).await,
        None => {
            println!("visible: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("visible: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        // Only jemalloc supports advancing the stats epoch.
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn parses_token_command() {
        let cli = Cli::try_parse_from(["visible", "token", "--user-id", "7", "--role", "provider"])
            .unwrap();
        match cli.command {
            Some(Commands::Token { user_id, role }) => {
                assert_eq!(user_id, 7);
                assert_eq!(role, Role::Provider);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_role() {
        assert!(
            Cli::try_parse_from(["visible", "token", "--user-id", "7", "--role", "admin"]).is_err()
        );
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from(["visible", "sweep", "--config", "/tmp/visible.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/visible.toml")));
        assert!(matches!(cli.command, Some(Commands::Sweep)));
    }
}
