//! Submission retry queue: a bounded number of retries per submission,
//! feeding a background `tokio` task so a verifier thread's `submit_nonce`
//! call never blocks on network I/O. `tokio::sync::mpsc::UnboundedSender::send`
//! already never blocks, so no explicit `try_send` dance is needed.

use crate::com::api::MiningInfoResponse;
use crate::com::client::{Client, ProxyDetails, SubmissionParameters};
use crate::error::FetchError;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use url::Url;

#[derive(Clone)]
pub struct RequestHandler {
    client: Client,
    tx_submit: mpsc::UnboundedSender<Pending>,
}

struct Pending {
    params: SubmissionParameters,
    attempt: usize,
}

impl RequestHandler {
    pub fn new(
        mining_info_uri: Url,
        submit_nonce_uri: Url,
        secret_phrase: String,
        timeout: Duration,
        send_proxy_details: bool,
        additional_headers: HashMap<String, String>,
        submission_max_retry: usize,
    ) -> RequestHandler {
        let proxy_details = if send_proxy_details {
            ProxyDetails::Enabled
        } else {
            ProxyDetails::Disabled
        };

        let client = Client::new(
            mining_info_uri,
            submit_nonce_uri,
            secret_phrase,
            timeout,
            proxy_details,
            &additional_headers,
        );

        let (tx_submit, rx_submit) = mpsc::unbounded_channel();
        tokio::spawn(RequestHandler::handle_submissions(
            client.clone(),
            rx_submit,
            tx_submit.clone(),
            submission_max_retry,
        ));

        RequestHandler { client, tx_submit }
    }

    async fn handle_submissions(
        client: Client,
        mut rx: mpsc::UnboundedReceiver<Pending>,
        tx_submit: mpsc::UnboundedSender<Pending>,
        submission_max_retry: usize,
    ) {
        while let Some(pending) = rx.recv().await {
            let Pending { params, attempt } = pending;
            let start = Instant::now();
            match client.submit_nonce(&params).await {
                Ok(res) => {
                    if params.deadline != res.deadline {
                        log_deadline_mismatch(&params, res.deadline, start.elapsed());
                    } else {
                        log_submission_accepted(&params, start.elapsed());
                    }
                }
                Err(FetchError::Pool { code, message }) => {
                    if (message.is_empty() || message == "limit exceeded") && attempt < submission_max_retry {
                        log_pool_busy(&params, start.elapsed());
                        requeue(&tx_submit, params, attempt);
                    } else {
                        log_submission_not_accepted(&params, start.elapsed(), code, &message);
                    }
                }
                Err(e) => {
                    if attempt < submission_max_retry {
                        log_submission_failed(&params, &e.to_string());
                        requeue(&tx_submit, params, attempt);
                    } else {
                        error!(
                            "giving up on submission after {} attempts: height={}, id={}, nonce={}",
                            attempt, params.height, params.account_id, params.nonce
                        );
                    }
                }
            }
        }
    }

    /// Polls `getMiningInfo`. Called from the coordinator's tokio polling
    /// loop, not from verifier threads.
    pub async fn get_mining_info(&self, capacity: u64) -> Result<MiningInfoResponse, FetchError> {
        self.client.get_mining_info(capacity).await
    }

    /// Non-blocking: safe to call from any verifier OS thread, matching
    /// the submitter callback contract.
    pub fn submit_nonce(
        &self,
        account_id: u64,
        nonce: u64,
        height: u64,
        block: u64,
        deadline_unadjusted: u64,
        deadline: u64,
        gen_sig: [u8; 32],
    ) {
        let params = SubmissionParameters {
            account_id,
            nonce,
            height,
            block,
            deadline_unadjusted,
            deadline,
            gen_sig,
        };
        requeue(&self.tx_submit, params, 0);
    }
}

fn requeue(tx: &mpsc::UnboundedSender<Pending>, params: SubmissionParameters, attempt: usize) {
    if tx.send(Pending { params, attempt: attempt + 1 }).is_err() {
        error!("submission channel closed, dropping pending submission");
    }
}

fn log_deadline_mismatch(params: &SubmissionParameters, deadline_pool: u64, latency: Duration) {
    error!(
        "dl mismatch: height={}, id={}, nonce={}, dl_miner={}, dl_pool={}, latency={}ms",
        params.height, params.account_id, params.nonce, params.deadline, deadline_pool, latency.as_millis()
    );
}

fn log_submission_failed(params: &SubmissionParameters, err: &str) {
    warn!(
        "submission failed, retrying: height={}, id={}, nonce={}, dl={}, response={}",
        params.height, params.account_id, params.nonce, params.deadline, err
    );
}

fn log_submission_not_accepted(params: &SubmissionParameters, latency: Duration, err_code: i32, msg: &str) {
    error!(
        "dl rejected: height={}, id={}, nonce={}, dl={}, latency={}ms\n\tcode: {}\n\tmessage: {}",
        params.height, params.account_id, params.nonce, params.deadline, latency.as_millis(), err_code, msg,
    );
}

fn log_submission_accepted(params: &SubmissionParameters, latency: Duration) {
    info!(
        "dl accepted: height={}, id={}, nonce={}, dl={}, latency={}ms",
        params.height, params.account_id, params.nonce, params.deadline, latency.as_millis()
    );
}

fn log_pool_busy(params: &SubmissionParameters, latency: Duration) {
    info!(
        "pool busy, retrying: height={}, id={}, nonce={}, dl={}, latency={}ms",
        params.height, params.account_id, params.nonce, params.deadline, latency.as_millis()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn submit_nonce_does_not_block_and_reaches_the_background_task() {
        let request_handler = RequestHandler::new(
            "http://127.0.0.1:1/burst".parse().unwrap(),
            "http://127.0.0.1:1/burst".parse().unwrap(),
            String::new(),
            Duration::from_millis(50),
            false,
            HashMap::new(),
            0,
        );

        request_handler.submit_nonce(1337, 12, 111, 0, 7123, 1193, [0; 32]);
        // submit_nonce is non-blocking; give the background task a tick to
        // drain the channel without asserting on network behavior (no
        // reachable pool in a unit test).
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
