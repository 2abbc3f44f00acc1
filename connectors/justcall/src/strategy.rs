use tracing::{debug, info, warn};
use url::Url;

use crate::client::JustCallClient;
use crate::config::PROBE_PAGE_SIZE;
use crate::error::FetchError;
use crate::models::Credentials;

pub const URL_PLACEHOLDER: &str = "{url}";

/// How the credentials travel with a request. Relays that strip headers need
/// the query form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthCarrier {
    Header,
    Query,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyKind {
    Direct,
    /// Relay template with a `{url}` placeholder for the encoded upstream URL.
    LocalRelay(String),
    PublicRelay(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStrategy {
    pub name: String,
    pub kind: StrategyKind,
    pub auth: AuthCarrier,
}

impl ConnectionStrategy {
    pub fn direct() -> Self {
        Self {
            name: "direct".to_string(),
            kind: StrategyKind::Direct,
            auth: AuthCarrier::Header,
        }
    }

    pub fn local_relay(template: &str) -> Self {
        Self {
            name: "local-relay".to_string(),
            kind: StrategyKind::LocalRelay(template.to_string()),
            auth: AuthCarrier::Header,
        }
    }

    pub fn public_relay(index: usize, template: &str) -> Self {
        Self {
            name: format!("public-relay-{}", index + 1),
            kind: StrategyKind::PublicRelay(template.to_string()),
            auth: AuthCarrier::Query,
        }
    }

    /// URL actually requested: the upstream URL itself, or the relay template
    /// with the percent-encoded upstream URL substituted in.
    pub fn request_url(&self, target: &Url) -> String {
        match &self.kind {
            StrategyKind::Direct => target.to_string(),
            StrategyKind::LocalRelay(template) | StrategyKind::PublicRelay(template) => {
                let encoded = urlencoding::encode(target.as_str());
                if template.contains(URL_PLACEHOLDER) {
                    template.replace(URL_PLACEHOLDER, &encoded)
                } else {
                    format!("{}{}", template, encoded)
                }
            }
        }
    }
}

/// Candidate order: direct, then the local relay if configured, then public
/// relays in the order given.
pub fn default_strategies(
    local_relay: Option<&str>,
    public_relays: &[String],
) -> Vec<ConnectionStrategy> {
    let mut strategies = vec![ConnectionStrategy::direct()];
    if let Some(template) = local_relay {
        strategies.push(ConnectionStrategy::local_relay(template));
    }
    strategies.extend(
        public_relays
            .iter()
            .enumerate()
            .map(|(i, template)| ConnectionStrategy::public_relay(i, template)),
    );
    strategies
}

pub struct StrategySelector {
    candidates: Vec<ConnectionStrategy>,
}

impl StrategySelector {
    pub fn new(candidates: Vec<ConnectionStrategy>) -> Self {
        Self { candidates }
    }

    pub fn candidates(&self) -> &[ConnectionStrategy] {
        &self.candidates
    }

    /// Probes each candidate with a one-record request. Transport failures move
    /// on to the next candidate; any other failure is final.
    pub async fn select(
        &self,
        client: &JustCallClient,
        credentials: &Credentials,
    ) -> Result<ConnectionStrategy, FetchError> {
        let mut attempted = Vec::with_capacity(self.candidates.len());

        for strategy in &self.candidates {
            debug!("Probing JustCall API via {}", strategy.name);
            attempted.push(strategy.name.clone());

            match client
                .query_calls(strategy, credentials, None, 1, PROBE_PAGE_SIZE)
                .await
            {
                Ok(calls) => {
                    info!(
                        "Connected to JustCall API via {} (probe returned {} record(s))",
                        strategy.name,
                        calls.len()
                    );
                    return Ok(strategy.clone());
                }
                Err(e) if e.is_transport() => {
                    warn!("Strategy {} unavailable: {}", strategy.name, e);
                }
                Err(e) => {
                    warn!("Probe via {} failed definitively: {}", strategy.name, e);
                    return Err(e);
                }
            }
        }

        Err(FetchError::ConnectionFailed { attempted })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> Url {
        Url::parse_with_params(
            "https://api.justcall.io/v2.1/calls",
            &[("page", "1"), ("per_page", "50")],
        )
        .unwrap()
    }

    #[test]
    fn test_direct_uses_target_verbatim() {
        let url = ConnectionStrategy::direct().request_url(&target());
        assert_eq!(url, "https://api.justcall.io/v2.1/calls?page=1&per_page=50");
    }

    #[test]
    fn test_relay_template_gets_encoded_target() {
        let strategy = ConnectionStrategy::public_relay(0, "https://relay.example/?url={url}");
        assert_eq!(
            strategy.request_url(&target()),
            "https://relay.example/?url=https%3A%2F%2Fapi.justcall.io%2Fv2.1%2Fcalls%3Fpage%3D1%26per_page%3D50"
        );
        assert_eq!(strategy.auth, AuthCarrier::Query);
    }

    #[test]
    fn test_relay_template_without_placeholder_appends() {
        let strategy = ConnectionStrategy::local_relay("http://localhost:8010/proxy?url=");
        assert!(strategy
            .request_url(&target())
            .starts_with("http://localhost:8010/proxy?url=https%3A%2F%2F"));
        assert_eq!(strategy.auth, AuthCarrier::Header);
    }

    #[test]
    fn test_default_strategies_without_local_relay() {
        let strategies = default_strategies(None, &["https://a/{url}".to_string()]);
        let names: Vec<&str> = strategies.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["direct", "public-relay-1"]);
    }
}
