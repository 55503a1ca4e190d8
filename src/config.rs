use crate::domain::amount::AssetPolicy;
use std::time::Duration;
use url::Url;

/// Pending negotiations are abandoned after this long without a resume.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_FINISH_URI_BASE: &str = "http://127.0.0.1:5000/payment-callback/";
pub const DEFAULT_PAYMENT_METHOD: &str = "ilp";

/// Settings for a `NegotiationOrchestrator`. The retention window belongs to
/// the store it is given.
#[derive(Debug, Clone, PartialEq)]
pub struct NegotiatorConfig {
    pub sweep_interval: Duration,
    /// The negotiation id is appended to this to form the consent finish URI.
    pub finish_uri_base: Url,
    pub payment_method: String,
    pub asset_policy: AssetPolicy,
}

impl NegotiatorConfig {
    pub fn new(finish_uri_base: Url) -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            finish_uri_base,
            payment_method: DEFAULT_PAYMENT_METHOD.to_string(),
            asset_policy: AssetPolicy::default(),
        }
    }

    /// Builds the callback the authorization server redirects to after consent.
    pub fn finish_uri(&self, negotiation_id: &str) -> Result<Url, url::ParseError> {
        let mut uri = self.finish_uri_base.clone();
        uri.path_segments_mut()
            .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .push(negotiation_id);
        Ok(uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_config() -> NegotiatorConfig {
        NegotiatorConfig::new(Url::parse(DEFAULT_FINISH_URI_BASE).unwrap())
    }

    #[test]
    fn test_defaults() {
        let config = default_config();
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.payment_method, "ilp");
        assert_eq!(config.asset_policy, AssetPolicy::Passthrough);
    }

    #[test]
    fn test_finish_uri_appends_negotiation_id() {
        let config = default_config();
        assert_eq!(
            config.finish_uri("tx-1").unwrap().as_str(),
            "http://127.0.0.1:5000/payment-callback/tx-1"
        );

        let config = NegotiatorConfig::new(Url::parse("https://shop.example/done").unwrap());
        assert_eq!(
            config.finish_uri("tx-2").unwrap().as_str(),
            "https://shop.example/done/tx-2"
        );
    }

    #[test]
    fn test_finish_uri_escapes_path_characters() {
        let config = default_config();
        assert_eq!(
            config.finish_uri("a/b?c").unwrap().as_str(),
            "http://127.0.0.1:5000/payment-callback/a%2Fb%3Fc"
        );

        let config = NegotiatorConfig::new(Url::parse("mailto:ops@shop.example").unwrap());
        assert!(config.finish_uri("tx-3").is_err());
    }
}
