//! Pool/wallet HTTP client. Two operations, `get_mining_info` and
//! `submit_nonce`, both `async fn`s over a plain `reqwest` 0.11 client
//! driven by the ambient `tokio` runtime. Modernized from the teacher's
//! `futures` 0.1 + `reqwest::r#async` combinators onto `async`/`await`,
//! same crate choices otherwise.

use crate::com::api::{parse_json_result, GetMiningInfoRequest, MiningInfoResponse, SubmitNonceResponse};
use crate::error::FetchError;
use reqwest::header::{HeaderMap, HeaderName};
use reqwest::{Client as InnerClient, ClientBuilder};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use url::form_urlencoded::byte_serialize;
use url::Url;

/// A client for communicating with pool/proxy/wallet.
#[derive(Clone, Debug)]
pub struct Client {
    inner: InnerClient,
    secret_phrase: Arc<String>,
    mining_info_uri: Url,
    submit_nonce_uri: Url,
    headers: Arc<HeaderMap>,
}

/// Parameters used for nonce submission, ported from the teacher's
/// `com/client.rs`'s `Ord for SubmissionParameters`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmissionParameters {
    pub account_id: u64,
    pub nonce: u64,
    pub height: u64,
    pub block: u64,
    pub deadline_unadjusted: u64,
    pub deadline: u64,
    pub gen_sig: [u8; 32],
}

/// Orders submissions so a retry queue always resends the newest-and-best
/// pending one first: later blocks beat earlier ones; within a block, a
/// strictly better deadline beats a worse one.
impl Ord for SubmissionParameters {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.block != other.block {
            self.block.cmp(&other.block)
        } else if self.gen_sig == other.gen_sig {
            other.deadline.cmp(&self.deadline)
        } else {
            Ordering::Less
        }
    }
}

impl PartialOrd for SubmissionParameters {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Whether to send additional proxy-facing headers (miner name, host).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ProxyDetails {
    Enabled,
    Disabled,
}

impl Client {
    fn user_agent() -> String {
        format!("bencher/{}", env!("CARGO_PKG_VERSION"))
    }

    fn base_headers(
        proxy_details: ProxyDetails,
        additional_headers: &HashMap<String, String>,
    ) -> HeaderMap {
        let ua = Client::user_agent();
        let mut headers = HeaderMap::new();
        headers.insert("User-Agent", ua.parse().unwrap());
        if proxy_details == ProxyDetails::Enabled {
            let host = hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_default();
            headers.insert("X-Miner", ua.parse().unwrap());
            headers.insert("X-Minername", host.parse().unwrap());
        }
        for (key, value) in additional_headers {
            if let (Ok(name), Ok(val)) = (HeaderName::from_bytes(key.as_bytes()), value.parse()) {
                headers.insert(name, val);
            }
        }
        headers
    }

    pub fn new(
        mining_info_uri: Url,
        submit_nonce_uri: Url,
        secret_phrase: String,
        timeout: Duration,
        proxy_details: ProxyDetails,
        additional_headers: &HashMap<String, String>,
    ) -> Self {
        let secret_phrase_encoded: String = byte_serialize(secret_phrase.as_bytes()).collect();
        let headers = Client::base_headers(proxy_details, additional_headers);

        let inner = ClientBuilder::new()
            .timeout(timeout)
            .build()
            .expect("failed to build http client");

        Client {
            inner,
            secret_phrase: Arc::new(secret_phrase_encoded),
            mining_info_uri,
            submit_nonce_uri,
            headers: Arc::new(headers),
        }
    }

    /// GETs `getMiningInfo`, setting `X-Capacity` to the plot registry's
    /// total nonce count.
    pub async fn get_mining_info(&self, capacity: u64) -> Result<MiningInfoResponse, FetchError> {
        let mut headers = (*self.headers).clone();
        headers.insert("X-Capacity", capacity.to_string().parse().unwrap());

        let response = self
            .inner
            .get(self.mining_info_uri.clone())
            .headers(headers)
            .query(&GetMiningInfoRequest { request_type: "getMiningInfo" })
            .send()
            .await?;
        let body = response.bytes().await?;
        parse_json_result(&body)
    }

    /// POSTs `submitNonce` with query parameters matching the teacher's
    /// client exactly; on a pool/proxy without a secret phrase, the
    /// unadjusted deadline is sent too since some proxies rank by it.
    pub async fn submit_nonce(
        &self,
        submission: &SubmissionParameters,
    ) -> Result<SubmitNonceResponse, FetchError> {
        let mut query = format!(
            "requestType=submitNonce&accountId={}&nonce={}&secretPhrase={}&blockheight={}",
            submission.account_id, submission.nonce, self.secret_phrase, submission.height
        );
        if self.secret_phrase.is_empty() {
            query.push_str(&format!("&deadline={}", submission.deadline_unadjusted));
        }

        let mut headers = (*self.headers).clone();
        headers.insert("X-Deadline", submission.deadline.to_string().parse().unwrap());

        let mut uri = self.submit_nonce_uri.clone();
        uri.set_query(Some(&query));

        let response = self.inner.post(uri).headers(headers).send().await?;
        let body = response.bytes().await?;
        parse_json_result(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_block_always_outranks_older() {
        let mut a = sample();
        let mut b = sample();
        a.block = 5;
        b.block = 6;
        assert!(a < b);
    }

    #[test]
    fn within_a_block_lower_deadline_wins() {
        let mut a = sample();
        let mut b = sample();
        a.deadline = 100;
        b.deadline = 50;
        assert!(b > a);
    }

    #[test]
    fn a_new_chain_outranks_the_old_one_regardless_of_deadline() {
        let mut a = sample();
        let mut b = sample();
        b.gen_sig[0] = 1;
        b.deadline = a.deadline + 1;
        assert!(a < b || b < a);
    }

    fn sample() -> SubmissionParameters {
        SubmissionParameters {
            account_id: 1337,
            nonce: 12,
            height: 111,
            block: 0,
            deadline_unadjusted: 7123,
            deadline: 1193,
            gen_sig: [0; 32],
        }
    }
}
