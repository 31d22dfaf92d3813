//! `sym enc` / `sym dec`

use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use sym_crypto::{EncryptConfig, PasswordCache, SymResult};

use crate::password;

/// A mistake in how sym was invoked (exit code 2).
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct UsageError(String);

fn usage_error(msg: &str) -> anyhow::Error {
    anyhow::Error::new(UsageError(msg.to_string()))
}

// ── `sym enc` ─────────────────────────────────────────────────────────────────

pub fn cmd_enc(
    config: &EncryptConfig,
    generate: bool,
    password: Option<SecretString>,
    force: bool,
    files: &[PathBuf],
) -> Result<()> {
    let password = match password {
        Some(_) if generate => return Err(usage_error("-g and -p cannot be used together")),
        Some(password) => password,
        None if generate => {
            let phrase = password::generate_passphrase()?;
            eprintln!("Your password: {}", phrase.expose_secret());
            phrase
        }
        None if files.is_empty() => {
            return Err(usage_error("must use -g or -p when reading from stdin"))
        }
        None => password::read_new_password(password::prompt_tty)?,
    };

    // Catch a bad config before any output file is created
    config.header()?;

    if files.is_empty() {
        let mut stdout = BufWriter::new(io::stdout().lock());
        sym_crypto::encrypt(&mut stdout, io::stdin().lock(), &password, config)
            .context("encrypt stdin")?;
        return Ok(());
    }

    for file in files {
        let output = encrypt_file(file, &password, config, force)?;
        tracing::info!(input = %file.display(), output = %output.display(), "encrypted");
    }
    Ok(())
}

/// Encrypt `input` into its sibling `.enc` / `.enc.txt` file.
pub fn encrypt_file(
    input: &Path,
    password: &SecretString,
    config: &EncryptConfig,
    force: bool,
) -> Result<PathBuf> {
    let output = encrypted_name(input, config.armor);
    let source =
        File::open(input).with_context(|| format!("opening {}", input.display()))?;

    write_output(&output, force, |sink| {
        sym_crypto::encrypt(sink, source, password, config)
    })
    .with_context(|| format!("encrypt {}", input.display()))?;
    Ok(output)
}

// ── `sym dec` ─────────────────────────────────────────────────────────────────

pub fn cmd_dec(password: Option<SecretString>, force: bool, files: &[PathBuf]) -> Result<()> {
    let password = match password {
        Some(password) => password,
        None if files.is_empty() => {
            return Err(usage_error("-p is required when reading from stdin"))
        }
        None => password::read_password(password::prompt_tty)?,
    };

    // One cache per invocation: copies of the same container derive once.
    let mut cache = PasswordCache::new();

    if files.is_empty() {
        let mut stdout = BufWriter::new(io::stdout().lock());
        let n = sym_crypto::decrypt(&mut stdout, io::stdin().lock(), &password, &mut cache)
            .context("decrypt stdin")?;
        tracing::debug!(bytes = n, "decrypted stdin");
        return Ok(());
    }

    for file in files {
        let output = decrypt_file(file, &password, &mut cache, force)?;
        tracing::info!(input = %file.display(), output = %output.display(), "decrypted");
    }
    Ok(())
}

/// Decrypt `input` next to itself, named by [`decrypted_name`].
pub fn decrypt_file(
    input: &Path,
    password: &SecretString,
    cache: &mut PasswordCache,
    force: bool,
) -> Result<PathBuf> {
    let output = decrypted_name(input);
    let source =
        File::open(input).with_context(|| format!("opening {}", input.display()))?;

    write_output(&output, force, |sink| {
        sym_crypto::decrypt(sink, source, password, cache)
    })
    .with_context(|| format!("decrypt {}", input.display()))?;
    Ok(output)
}

// ── Output files ──────────────────────────────────────────────────────────────

pub fn encrypted_name(input: &Path, armor: bool) -> PathBuf {
    let mut name = OsString::from(input.as_os_str());
    name.push(if armor { ".enc.txt" } else { ".enc" });
    PathBuf::from(name)
}

/// `x.enc.txt` and `x.enc` become `x`; anything else gets `.dec` appended.
pub fn decrypted_name(input: &Path) -> PathBuf {
    let stripped = input
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| {
            name.strip_suffix(".enc.txt")
                .or_else(|| name.strip_suffix(".enc"))
        })
        .filter(|stem| !stem.is_empty());

    match stripped {
        Some(stem) => input.with_file_name(stem),
        None => {
            let mut name = OsString::from(input.as_os_str());
            name.push(".dec");
            PathBuf::from(name)
        }
    }
}

/// Create `path` (exclusively unless `force`), run `write` into it and
/// remove the file again if anything fails.
fn write_output<T>(
    path: &Path,
    force: bool,
    write: impl FnOnce(&mut BufWriter<File>) -> SymResult<T>,
) -> Result<T> {
    let file = create_output(path, force)?;
    let mut sink = BufWriter::new(file);

    let result = write(&mut sink)
        .map_err(anyhow::Error::from)
        .and_then(|value| {
            sink.flush()
                .with_context(|| format!("writing {}", path.display()))?;
            Ok(value)
        });

    if result.is_err() {
        drop(sink);
        if let Err(e) = fs::remove_file(path) {
            tracing::warn!("could not remove partial output {}: {e}", path.display());
        }
    }
    result
}

fn create_output(path: &Path, force: bool) -> Result<File> {
    let mut options = OpenOptions::new();
    options.write(true);
    if force {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }

    options.open(path).map_err(|e| {
        if e.kind() == io::ErrorKind::AlreadyExists {
            anyhow::anyhow!("output file {} exists (use -f to overwrite)", path.display())
        } else {
            anyhow::Error::new(e).context(format!("creating {}", path.display()))
        }
    })
}
