//! Wallet address validation
//!
//! A wallet is the sole identity key: `0x` followed by 40 lowercase hex digits.
//! Input is trimmed and lowercased before any check, so every lookup and every
//! stored row uses the normalized form.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

const WALLET_PREFIX: &str = "0x";
const WALLET_LENGTH: usize = 42;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    #[error("Wallet address is required")]
    Empty,
    #[error("Wallet address must start with '0x'")]
    MissingPrefix,
    #[error("Wallet address must be 42 characters (including '0x'), got {0}")]
    WrongLength(usize),
    #[error("Wallet address contains invalid characters")]
    InvalidCharacters,
}

/// Normalized wallet address
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Wallet(String);

impl Wallet {
    pub fn parse(raw: &str) -> Result<Self, WalletError> {
        validate(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `0x1234...abcd` form used in notifications and leaderboards
    pub fn display_short(&self) -> String {
        format!("{}...{}", &self.0[..6], &self.0[WALLET_LENGTH - 4..])
    }
}

/// Validate and normalize a raw wallet address
pub fn validate(raw: &str) -> Result<Wallet, WalletError> {
    let wallet = raw.trim().to_lowercase();

    if wallet.is_empty() {
        return Err(WalletError::Empty);
    }

    if !wallet.starts_with(WALLET_PREFIX) {
        return Err(WalletError::MissingPrefix);
    }

    if wallet.len() != WALLET_LENGTH {
        return Err(WalletError::WrongLength(wallet.len()));
    }

    if !wallet[WALLET_PREFIX.len()..]
        .chars()
        .all(|c| matches!(c, '0'..='9' | 'a'..='f'))
    {
        return Err(WalletError::InvalidCharacters);
    }

    Ok(Wallet(wallet))
}

impl fmt::Display for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Wallet {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Wallet {
    type Error = WalletError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate(&value)
    }
}

impl From<Wallet> for String {
    fn from(wallet: Wallet) -> Self {
        wallet.0
    }
}
