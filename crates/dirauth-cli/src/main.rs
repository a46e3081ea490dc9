//! Dirauth - directory authentication and user provisioning
//!
//! Verifies credentials against an LDAP directory and creates user entries
//! from the command line. Results are printed to stdout as JSON; logs go to
//! stderr.

mod commands;

use clap::{Parser, Subcommand};
use dirauth_core::DirAuthConfig;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "dirauth")]
#[command(author = "Dirauth Team")]
#[command(version = dirauth_core::VERSION)]
#[command(about = "Directory authentication and user provisioning", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, env = "DIRAUTH_CONFIG")]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "DIRAUTH_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (pretty, json)
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// Upgrade plain ldap:// connections with STARTTLS
    #[arg(long, global = true)]
    start_tls: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Authenticate a user and print the directory entry
    Login {
        /// Username matched against the configured search field
        username: String,

        /// Password to verify
        #[arg(long, env = "DIRAUTH_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Create a directory entry for a new user
    Provision {
        /// Username, used as the entry's cn
        username: String,

        /// Display name, stored as sn
        #[arg(long)]
        display_name: Option<String>,

        /// Email address, stored as mail
        #[arg(long, default_value = "")]
        email: String,

        /// Initial password
        #[arg(long, env = "DIRAUTH_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Validate the configuration and print it with secrets redacted
    CheckConfig,

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    if let Commands::Version = cli.command {
        println!("dirauth {}", dirauth_core::VERSION);
        return Ok(ExitCode::SUCCESS);
    }

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.logging.format = format.clone();
    }

    init_logging(&config);

    let ok = match cli.command {
        Commands::Login { username, password } => {
            commands::login(&config, cli.start_tls, &username, &password).await?
        }
        Commands::Provision {
            username,
            display_name,
            email,
            password,
        } => {
            commands::provision(
                &config,
                cli.start_tls,
                &username,
                display_name,
                &email,
                &password,
            )
            .await?
        }
        Commands::CheckConfig => commands::check_config(&config)?,
        Commands::Version => true,
    };

    Ok(if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Config file overlaid with the environment, or the environment alone
fn load_config(path: Option<&str>) -> anyhow::Result<DirAuthConfig> {
    let config = match path {
        Some(path) => {
            let mut config = DirAuthConfig::from_file(path)?;
            config.apply_env()?;
            config
        }
        None => DirAuthConfig::from_env()?,
    };
    Ok(config)
}

fn init_logging(config: &DirAuthConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_login() {
        let cli = Cli::try_parse_from([
            "dirauth",
            "--config",
            "dirauth.toml",
            "login",
            "bob",
            "--password",
            "secret",
        ])
        .unwrap();

        assert_eq!(cli.config.as_deref(), Some("dirauth.toml"));
        match cli.command {
            Commands::Login { username, password } => {
                assert_eq!(username, "bob");
                assert_eq!(password, "secret");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_provision() {
        let cli = Cli::try_parse_from([
            "dirauth",
            "provision",
            "alice",
            "--display-name",
            "Alice A",
            "--email",
            "alice@x.com",
            "--password",
            "p",
            "--start-tls",
        ])
        .unwrap();

        assert!(cli.start_tls);
        match cli.command {
            Commands::Provision {
                username,
                display_name,
                email,
                ..
            } => {
                assert_eq!(username, "alice");
                assert_eq!(display_name.as_deref(), Some("Alice A"));
                assert_eq!(email, "alice@x.com");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[ldap]\nurl = \"ldaps://dir.example.com\"\n\n[ldap.search]\ndn = \"dc=example,dc=com\""
        )
        .unwrap();

        let config = load_config(file.path().to_str()).unwrap();
        assert_eq!(config.ldap.search.dn, "dc=example,dc=com");
    }

    #[test]
    fn test_load_config_missing_file() {
        assert!(load_config(Some("/nonexistent/dirauth.toml")).is_err());
    }
}
