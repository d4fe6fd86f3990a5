//! Config validation CLI tool
//!
//! Validates a chatwarden configuration file and reports any errors.

use chatwarden_config::BackendKind;
use chatwarden_util::{default_config_path, format_duration};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a chatwarden configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match chatwarden_config::load_config(&config_path) {
        Ok(settings) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", chatwarden_config::CURRENT_CONFIG_VERSION);
            println!("  Profile: {}", settings.app.profile);
            println!("  Data directory: {}", settings.app.data_dir.display());
            println!("  Premium duration: {} days", settings.premium.duration_days);
            println!(
                "  Watchdog: timeout {}, check every {}, heartbeat every {}",
                format_duration(settings.watchdog.timeout),
                format_duration(settings.watchdog.check_interval),
                format_duration(settings.watchdog.heartbeat_interval),
            );
            println!(
                "  Escalation: warn after {}, offer restart after {} timeouts",
                settings.watchdog.warn_after, settings.watchdog.restart_after
            );
            match settings.entitlement.backend {
                BackendKind::Mock => println!("  Purchases: mock backend (no payment)"),
                BackendKind::Store => println!(
                    "  Purchases: storefront at {}",
                    settings.entitlement.store_url.as_deref().unwrap_or("<unset>")
                ),
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                chatwarden_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                chatwarden_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                chatwarden_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                chatwarden_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        chatwarden_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
