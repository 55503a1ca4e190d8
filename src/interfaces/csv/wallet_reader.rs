use crate::error::{NegotiationError, Result};
use serde::Deserialize;
use std::io::Read;
use url::Url;

/// A wallet published by the sandbox servers.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct WalletRecord {
    pub url: Url,
    pub asset_code: String,
    pub asset_scale: u8,
}

/// Reads the sandbox wallet directory (`url, asset_code, asset_scale`).
pub struct WalletReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> WalletReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(source);
        Self { reader }
    }

    pub fn wallets(self) -> impl Iterator<Item = Result<WalletRecord>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(NegotiationError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_wallet_directory() {
        let data = "url, asset_code, asset_scale\n\
                    https://alpha.example/alice, USD, 2\n\
                    https://beta.example/bob, EUR, 2";
        let wallets: Vec<WalletRecord> = WalletReader::new(data.as_bytes())
            .wallets()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(wallets.len(), 2);
        assert_eq!(wallets[1].url.as_str(), "https://beta.example/bob");
        assert_eq!(wallets[1].asset_code, "EUR");
    }

    #[test]
    fn test_rejects_bad_url() {
        let data = "url, asset_code, asset_scale\nnot a url, USD, 2";
        let results: Vec<Result<WalletRecord>> = WalletReader::new(data.as_bytes()).wallets().collect();
        assert!(results[0].is_err());
    }
}
