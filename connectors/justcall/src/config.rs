use std::env;
use std::time::Duration;

use crate::strategy::{default_strategies, ConnectionStrategy};

pub const JUSTCALL_CALLS_URL: &str = "https://api.justcall.io/v2.1/calls";
pub const PAGE_SIZE: u32 = 50;
pub const PROBE_PAGE_SIZE: u32 = 1;
pub const DEFAULT_PAGE_DELAY_MS: u64 = 1000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_JOB_TTL_SECS: u64 = 900;
pub const DEFAULT_TRANSCRIPT_FLAG: &str = "fetch_transcription";

pub const DEFAULT_LOCAL_RELAY: &str = "http://localhost:8010/proxy?url={url}";
pub const DEFAULT_PUBLIC_RELAYS: &[&str] = &[
    "https://corsproxy.io/?url={url}",
    "https://api.allorigins.win/raw?url={url}",
    "https://api.codetabs.com/v1/proxy?quest={url}",
];

/// Whether a fetch probes for a strategy itself or reuses the one found by a
/// preceding successful connection test for the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbePolicy {
    EveryFetch,
    ReuseTested,
}

impl ProbePolicy {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "reuse_tested" | "reuse" | "cached" => ProbePolicy::ReuseTested,
            _ => ProbePolicy::EveryFetch,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub api_url: String,
    pub strategies: Vec<ConnectionStrategy>,
    pub page_delay: Duration,
    pub request_timeout: Duration,
    pub probe_policy: ProbePolicy,
    /// Query parameter asking upstream to inline transcripts. `None` omits it.
    pub transcript_flag: Option<String>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        let public: Vec<String> = DEFAULT_PUBLIC_RELAYS.iter().map(|s| s.to_string()).collect();
        Self {
            api_url: JUSTCALL_CALLS_URL.to_string(),
            strategies: default_strategies(Some(DEFAULT_LOCAL_RELAY), &public),
            page_delay: Duration::from_millis(DEFAULT_PAGE_DELAY_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            probe_policy: ProbePolicy::EveryFetch,
            transcript_flag: Some(DEFAULT_TRANSCRIPT_FLAG.to_string()),
        }
    }
}

impl FetcherConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let local_relay = env::var("JUSTCALL_LOCAL_RELAY")
            .unwrap_or_else(|_| DEFAULT_LOCAL_RELAY.to_string());
        let public_relays = match env::var("JUSTCALL_PUBLIC_RELAYS") {
            Ok(v) => parse_list(&v),
            Err(_) => DEFAULT_PUBLIC_RELAYS.iter().map(|s| s.to_string()).collect(),
        };
        let local_relay = local_relay.trim();
        let strategies = default_strategies(
            (!local_relay.is_empty()).then_some(local_relay),
            &public_relays,
        );

        Self {
            api_url: env::var("JUSTCALL_API_URL").unwrap_or(defaults.api_url),
            strategies,
            page_delay: env::var("JUSTCALL_PAGE_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.page_delay),
            request_timeout: env::var("JUSTCALL_REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            probe_policy: env::var("JUSTCALL_PROBE_POLICY")
                .map(|v| ProbePolicy::parse(&v))
                .unwrap_or(defaults.probe_policy),
            transcript_flag: match env::var("JUSTCALL_TRANSCRIPT_FLAG") {
                Ok(v) if v.trim().is_empty() => None,
                Ok(v) => Some(v.trim().to_string()),
                Err(_) => defaults.transcript_flag,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct JustCallConnectorConfig {
    pub port: u16,
    /// How long a finished fetch keeps its records before eviction.
    pub job_ttl: Duration,
    pub fetcher: FetcherConfig,
}

impl JustCallConnectorConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "4010".to_string())
            .parse::<u16>()
            .map_err(|e| anyhow::anyhow!("PORT must be a valid port number: {}", e))?;

        let job_ttl = env::var("JUSTCALL_JOB_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_JOB_TTL_SECS));

        Ok(Self {
            port,
            job_ttl,
            fetcher: FetcherConfig::from_env(),
        })
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
