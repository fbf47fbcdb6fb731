//! Wire shapes for the pool/wallet JSON API. Grounded in creepMiner's
//! `MiningInfo` / `NonceSubmission` (no literal Rust source for these
//! ships in the retrieval pack; the shapes below mirror the documented
//! Burst mining API, `getMiningInfo` / `submitNonce`, that the teacher's
//! `com/client.rs` already queries by `requestType`).

use crate::error::FetchError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct MiningInfoResponse {
    pub height: u64,
    #[serde(rename = "baseTarget", deserialize_with = "from_str_or_num")]
    pub base_target: u64,
    #[serde(rename = "generationSignature")]
    pub generation_signature: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitNonceResponse {
    #[serde(deserialize_with = "from_str_or_num")]
    pub deadline: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct PoolErrorResponse {
    #[serde(rename = "errorCode")]
    error_code: i32,
    #[serde(rename = "errorDescription", default)]
    error_description: String,
}

#[derive(Serialize)]
pub struct GetMiningInfoRequest<'a> {
    #[serde(rename = "requestType")]
    pub request_type: &'a str,
}

/// Burst pools sometimes return numbers as JSON strings (legacy wallets)
/// and sometimes as JSON numbers; accept either, matching the teacher's
/// tolerance for both shapes.
fn from_str_or_num<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StrOrNum {
        Str(String),
        Num(u64),
    }
    match StrOrNum::deserialize(deserializer)? {
        StrOrNum::Str(s) => s.parse().map_err(serde::de::Error::custom),
        StrOrNum::Num(n) => Ok(n),
    }
}

/// Parses a pool response body as `T`, falling back to the pool's
/// `{errorCode, errorDescription}` error shape before giving up with a
/// decode error.
pub fn parse_json_result<T>(body: &[u8]) -> Result<T, FetchError>
where
    T: for<'de> Deserialize<'de>,
{
    match serde_json::from_slice::<T>(body) {
        Ok(parsed) => Ok(parsed),
        Err(decode_err) => match serde_json::from_slice::<PoolErrorResponse>(body) {
            Ok(pool_err) => Err(FetchError::Pool {
                code: pool_err.error_code,
                message: pool_err.error_description,
            }),
            Err(_) => Err(FetchError::Decode(decode_err)),
        },
    }
}
