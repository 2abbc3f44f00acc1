use serde_json::Value;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::client::JustCallClient;
use crate::config::{FetcherConfig, ProbePolicy, PAGE_SIZE};
use crate::error::FetchError;
use crate::models::{Credentials, FetchOutcome, FetchRequest, TranscriptRecord};
use crate::normalize::normalize_record;
use crate::strategy::{ConnectionStrategy, StrategySelector};

type TestedStrategy = Option<(Credentials, ConnectionStrategy)>;

/// Drives connection testing and the page-by-page transcript fetch.
pub struct TranscriptFetcher {
    client: JustCallClient,
    selector: StrategySelector,
    page_delay: Duration,
    probe_policy: ProbePolicy,
    /// Strategy found by the last successful connection test, with the
    /// sanitized credentials it was found for.
    tested: Mutex<TestedStrategy>,
}

struct FetchSession {
    records: Vec<TranscriptRecord>,
    page: u32,
    has_more: bool,
}

impl TranscriptFetcher {
    pub fn new(config: FetcherConfig) -> Result<Self, FetchError> {
        let client = JustCallClient::new(
            &config.api_url,
            config.request_timeout,
            config.transcript_flag.clone(),
        )?;

        Ok(Self {
            client,
            selector: StrategySelector::new(config.strategies),
            page_delay: config.page_delay,
            probe_policy: config.probe_policy,
            tested: Mutex::new(None),
        })
    }

    pub async fn test_connection(
        &self,
        credentials: &Credentials,
    ) -> Result<ConnectionStrategy, FetchError> {
        let credentials = credentials.sanitized()?;
        debug!("Testing JustCall API connection...");

        let strategy = self.selector.select(&self.client, &credentials).await?;
        *self.tested_strategy() = Some((credentials, strategy.clone()));

        Ok(strategy)
    }

    /// Fetches every call in the range, one page at a time. `on_progress`
    /// receives the running total after each page. Any failure aborts the
    /// whole fetch.
    pub async fn fetch_transcripts<F>(
        &self,
        request: &FetchRequest,
        on_progress: F,
    ) -> Result<FetchOutcome, FetchError>
    where
        F: FnMut(usize),
    {
        let credentials = request.credentials.sanitized()?;
        let range = request.date_range()?.to_epoch_range();

        info!(
            "Fetching JustCall transcripts from {} to {} (epoch {}..={}, {}s)",
            request.start_date.trim(),
            request.end_date.trim(),
            range.from,
            range.to,
            range.width_seconds()
        );

        let strategy = self.strategy_for(&credentials).await?;

        let client = &self.client;
        let strategy_ref = &strategy;
        let credentials_ref = &credentials;
        let records = paginate(
            self.page_delay,
            move |page| {
                debug!(
                    "Fetching calls page {} (per_page={}) via {}",
                    page, PAGE_SIZE, strategy_ref.name
                );
                client.query_calls(strategy_ref, credentials_ref, Some(range), page, PAGE_SIZE)
            },
            on_progress,
        )
        .await?;

        info!(
            "Fetched {} transcript records via {}",
            records.len(),
            strategy.name
        );

        if records.is_empty() {
            return Ok(FetchOutcome::NoDataInRange);
        }
        Ok(FetchOutcome::Records(records))
    }

    async fn strategy_for(
        &self,
        credentials: &Credentials,
    ) -> Result<ConnectionStrategy, FetchError> {
        if self.probe_policy == ProbePolicy::ReuseTested {
            let cached = self
                .tested_strategy()
                .as_ref()
                .filter(|(tested_for, _)| tested_for == credentials)
                .map(|(_, strategy)| strategy.clone());
            if let Some(strategy) = cached {
                debug!("Reusing tested connection strategy {}", strategy.name);
                return Ok(strategy);
            }
        }

        self.selector.select(&self.client, credentials).await
    }

    /// The cache only ever holds a whole value, so a lock poisoned by a
    /// panicking writer is still safe to read.
    fn tested_strategy(&self) -> MutexGuard<'_, TestedStrategy> {
        self.tested.lock().unwrap_or_else(|poisoned| {
            warn!("Tested strategy cache lock was poisoned; recovering cached value");
            poisoned.into_inner()
        })
    }
}

/// Page loop: requests pages from 1 until a page comes back short or empty,
/// normalizing every call. `on_progress` gets the running total after each
/// page; `page_delay` is slept between pages but not after the last one.
pub async fn paginate<P, Fut, F>(
    page_delay: Duration,
    mut fetch_page: P,
    mut on_progress: F,
) -> Result<Vec<TranscriptRecord>, FetchError>
where
    P: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Vec<Value>, FetchError>>,
    F: FnMut(usize),
{
    let mut session = FetchSession {
        records: Vec::new(),
        page: 1,
        has_more: true,
    };

    while session.has_more {
        let calls = fetch_page(session.page).await?;
        let count = calls.len();
        debug!("Received {} calls on page {}", count, session.page);

        session.records.extend(calls.iter().map(normalize_record));
        on_progress(session.records.len());

        session.has_more = count >= PAGE_SIZE as usize;
        if session.has_more {
            session.page += 1;
            if !page_delay.is_zero() {
                sleep(page_delay).await;
            }
        }
    }

    Ok(session.records)
}
