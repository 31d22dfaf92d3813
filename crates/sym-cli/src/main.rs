//! sym: encrypt or decrypt files using a password
//!
//! Commands:
//!   enc [-g | -p PASSWORD] [-a] [-f] [FILE]...  - encrypt files, or stdin to stdout
//!   dec [-p PASSWORD] [-f] [FILE]...            - decrypt files, or stdin to stdout
//!
//! Exit codes: 0 success, 1 failure, 2 usage error.

mod commands;
mod password;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use commands::UsageError;
use sym_crypto::SymConfig;

#[derive(Parser, Debug)]
#[command(
    name = "sym",
    version,
    about = "Encrypt or decrypt files using a password",
    long_about = "sym: password-based file encryption with authenticated, segmented streaming"
)]
struct Cli {
    /// Path to a sym.toml configuration file
    #[arg(long, short = 'c', env = "SYM_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, env = "SYM_LOG")]
    log: Option<String>,

    /// Log format (json, text)
    #[arg(long, env = "SYM_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt files (FILE -> FILE.enc, or FILE.enc.txt with -a)
    Enc {
        /// Generate a passphrase and print it to stderr
        #[arg(short = 'g', long)]
        generate: bool,
        /// Use this password instead of prompting
        #[arg(short, long, env = "SYM_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// ASCII-armored output
        #[arg(short, long)]
        armor: bool,
        /// Overwrite output files that already exist
        #[arg(short, long)]
        force: bool,
        /// Files to encrypt; stdin when empty
        files: Vec<PathBuf>,
    },

    /// Decrypt files (FILE.enc / FILE.enc.txt -> FILE, anything else -> FILE.dec)
    Dec {
        /// Use this password instead of prompting
        #[arg(short, long, env = "SYM_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Overwrite output files that already exist
        #[arg(short, long)]
        force: bool,
        /// Files to decrypt, binary or armored; stdin when empty
        files: Vec<PathBuf>,
    },
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("sym: {e:#}");
            if e.is::<UsageError>() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let loaded = match cli.config.as_deref() {
        Some(path) => load_config(path)?,
        None => None,
    };
    let missing_config = cli.config.as_deref().filter(|_| loaded.is_none());
    let config = loaded.unwrap_or_default();

    let level = cli.log.as_deref().unwrap_or(&config.log.level);
    let format = match cli.log_format {
        Some(format) => format,
        None => LogFormat::from_str(&config.log.format, true)
            .map_err(|e| anyhow::anyhow!("invalid log format in config: {e}"))?,
    };
    init_logging(level, &format);

    if let Some(path) = missing_config {
        tracing::warn!("config file not found: {}  (using defaults)", path.display());
    }

    match cli.command {
        Commands::Enc {
            generate,
            password,
            armor,
            force,
            files,
        } => {
            let mut encrypt = config.encrypt;
            encrypt.armor |= armor;
            commands::cmd_enc(
                &encrypt,
                generate,
                password.map(SecretString::from),
                force,
                &files,
            )
        }
        Commands::Dec {
            password,
            force,
            files,
        } => commands::cmd_dec(password.map(SecretString::from), force, &files),
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

/// `Ok(None)` when the file does not exist.
fn load_config(path: &Path) -> Result<Option<SymConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config: {}", path.display()))?;
    let config = toml::from_str(&content)
        .with_context(|| format!("parsing config: {}", path.display()))?;
    Ok(Some(config))
}

/// Logs always go to stderr; stdout may carry container or plaintext bytes.
fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use sym_crypto::{EncryptionAlgorithm, HashAlgorithm};

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_enc_flags() {
        let cli = Cli::try_parse_from(["sym", "enc", "-a", "-f", "-p", "pw", "a.txt", "b.txt"])
            .unwrap();
        match cli.command {
            Commands::Enc {
                generate,
                password,
                armor,
                force,
                files,
            } => {
                assert!(!generate);
                assert_eq!(password.as_deref(), Some("pw"));
                assert!(armor && force);
                assert_eq!(files, [PathBuf::from("a.txt"), PathBuf::from("b.txt")]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_config_toml() {
        let toml_str = r#"
[encrypt]
hash_algorithm = "pbkdf2-hmac-sha256"
pbkdf2_iterations = 1000000
encryption_algorithm = "aes256-gcm"
segment_size = 65536
armor = true

[log]
level = "debug"
format = "json"
"#;
        let config: SymConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.encrypt.hash_algorithm, HashAlgorithm::Pbkdf2HmacSha256);
        assert_eq!(config.encrypt.pbkdf2_iterations, 1_000_000);
        assert_eq!(config.encrypt.encryption_algorithm, EncryptionAlgorithm::Aes256Gcm);
        assert_eq!(config.encrypt.segment_size, 65536);
        assert_eq!(config.encrypt.salt_len, 32);
        assert!(config.encrypt.armor);
        assert_eq!(config.log.level, "debug");
        assert!(matches!(
            LogFormat::from_str(&config.log.format, true),
            Ok(LogFormat::Json)
        ));
    }

    #[test]
    fn test_parse_config_defaults() {
        let config: SymConfig = toml::from_str("").unwrap();
        assert_eq!(config.encrypt.hash_algorithm, HashAlgorithm::Argon2id);
        assert_eq!(config.log.level, "warn");
    }

    #[test]
    fn test_missing_config_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(&dir.path().join("absent.toml")).unwrap().is_none());
    }

    #[test]
    fn test_malformed_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sym.toml");
        std::fs::write(&path, "[encrypt]\nsegment_size = \"big\"\n").unwrap();
        assert!(load_config(&path).is_err());
    }
}
