use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// A resolved payment participant, as published by its wallet address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletEndpoint {
    pub id: Url,
    pub auth_server: Url,
    pub resource_server: Url,
    pub asset_code: String,
    pub asset_scale: u8,
}

/// A wallet reference as entered by a user: a URL, a payment pointer, or a
/// bare `host/path`.
///
/// Payment pointers (`$wallet.example/alice`) and bare references
/// (`wallet.example/alice`) are shorthand for `https://wallet.example/alice`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WalletAddress(Url);

impl WalletAddress {
    pub fn parse(input: &str) -> Result<Self, url::ParseError> {
        let input = input.trim();
        if let Some(pointer) = input.strip_prefix('$') {
            return Ok(Self(Url::parse(&format!("https://{pointer}"))?));
        }
        match Url::parse(input) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(Self(url)),
            // `host:port/path` parses with the host as its scheme.
            Ok(_) | Err(url::ParseError::RelativeUrlWithoutBase) => {
                Ok(Self(Url::parse(&format!("https://{input}"))?))
            }
            Err(e) => Err(e),
        }
    }

    pub fn url(&self) -> &Url {
        &self.0
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
