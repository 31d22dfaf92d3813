//! Password sourcing: terminal prompts and generated passphrases

use anyhow::{Context, Result};
use bip39::Mnemonic;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use std::io;
use zeroize::Zeroize;

/// Prompts for a new password before giving up.
pub const MAX_ATTEMPTS: u32 = 3;

/// Read a line from the terminal without echo.
pub fn prompt_tty(prompt: &str) -> io::Result<String> {
    rpassword::prompt_password(prompt)
}

/// Ask for a password once (decryption).
pub fn read_password<F>(mut read: F) -> Result<SecretString>
where
    F: FnMut(&str) -> io::Result<String>,
{
    let password = read("Enter password: ").context("reading password")?;
    Ok(SecretString::from(password))
}

/// Ask for a new password and its confirmation (encryption).
///
/// Empty passwords and mismatched confirmations use up an attempt.
pub fn read_new_password<F>(mut read: F) -> Result<SecretString>
where
    F: FnMut(&str) -> io::Result<String>,
{
    for attempt in 1..=MAX_ATTEMPTS {
        let prompt = if attempt == 1 {
            "Enter password: ".to_string()
        } else {
            format!("Enter password (attempt {attempt}/{MAX_ATTEMPTS}): ")
        };

        let password = SecretString::from(read(&prompt).context("reading password")?);
        if password.expose_secret().is_empty() {
            eprintln!("Password cannot be empty");
            continue;
        }

        let confirm = SecretString::from(read("Repeat password: ").context("reading password")?);
        if confirm.expose_secret() != password.expose_secret() {
            eprintln!("Passwords do not match");
            continue;
        }
        return Ok(password);
    }
    anyhow::bail!("too many attempts")
}

/// 12 BIP-39 English words from 128 bits of fresh randomness.
pub fn generate_passphrase() -> Result<SecretString> {
    let mut entropy = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut entropy);

    let mnemonic = Mnemonic::from_entropy(&entropy)
        .map_err(|e| anyhow::anyhow!("BIP-39 passphrase generation failed: {e}"))?;
    entropy.zeroize();

    Ok(SecretString::from(mnemonic.to_string()))
}
