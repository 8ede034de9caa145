//! Functions that know how to talk to an execution node over JSON-RPC. Every node we sample
//! from is an interchangeable, independent source; there is no assumption two nodes agree on
//! the chain head at the same instant.
mod decoders;
#[cfg(test)]
pub mod test_utils;

use async_trait::async_trait;
use mockall::automock;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::{accounts::Account, performance::TimedExt, units::WeiNewtype};

use self::decoders::{from_unix_timestamp_hex_str, u128_from_hex_str, u64_from_hex_str};

// Execution chain blocks come in about once every 12s. u64 leaves plenty of room, and matches
// what nodes return for eth_blockNumber.
pub type BlockNumber = u64;

// Some providers signal rate limiting with an error inside a 200 response instead of a 429.
const RATE_LIMIT_CODES: [i64; 2] = [429, -32005];
const RATE_LIMIT_MESSAGES: [&str; 3] = ["429", "rate limit", "too many requests"];

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("bad http status {0}")]
    Status(StatusCode),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("unexpected {method} response: {reason}")]
    UnexpectedResponse {
        method: &'static str,
        reason: String,
    },
}

impl ProviderError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, ProviderError::RateLimited(_))
    }
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

impl From<RpcError> for ProviderError {
    fn from(RpcError { code, message }: RpcError) -> Self {
        let lowercase = message.to_lowercase();
        if RATE_LIMIT_CODES.contains(&code)
            || RATE_LIMIT_MESSAGES
                .iter()
                .any(|needle| lowercase.contains(needle))
        {
            ProviderError::RateLimited(format!("{code}: {message}"))
        } else {
            ProviderError::Rpc { code, message }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RpcResponse {
    Error { error: RpcError },
    Result { result: Value },
}

#[derive(Debug, Deserialize)]
struct BlockTimestamp {
    #[serde(deserialize_with = "from_unix_timestamp_hex_str")]
    timestamp: i64,
}

/// The slice of execution node functionality sampling balances depends on.
#[automock]
#[async_trait]
pub trait ExecutionProvider {
    /// Liveness check, any failure to answer counts as unreachable.
    async fn is_reachable(&self) -> bool;
    async fn get_block_number(&self) -> Result<BlockNumber, ProviderError>;
    /// Unix timestamp in seconds.
    async fn get_block_timestamp(&self, block_number: BlockNumber) -> Result<i64, ProviderError>;
    async fn get_balance(
        &self,
        account: &Account,
        block_number: BlockNumber,
    ) -> Result<WeiNewtype, ProviderError>;
}

fn hex_quantity(number: BlockNumber) -> String {
    format!("0x{number:x}")
}

fn unexpected(method: &'static str, reason: impl ToString) -> ProviderError {
    ProviderError::UnexpectedResponse {
        method,
        reason: reason.to_string(),
    }
}

#[derive(Clone, Debug)]
pub struct ExecutionNodeHttp {
    client: reqwest::Client,
    url: String,
}

impl ExecutionNodeHttp {
    pub fn new(url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
        }
    }

    async fn call(&self, method: &'static str, params: Value) -> Result<Value, ProviderError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        });

        let res = self.client.post(&self.url).json(&body).send().await?;

        match res.status() {
            StatusCode::TOO_MANY_REQUESTS => Err(ProviderError::RateLimited(format!(
                "{method} got http 429 too many requests"
            ))),
            status if !status.is_success() => Err(ProviderError::Status(status)),
            _ => match res.json::<RpcResponse>().await? {
                RpcResponse::Result { result } => Ok(result),
                RpcResponse::Error { error } => Err(error.into()),
            },
        }
    }

    async fn call_hex_quantity(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<String, ProviderError> {
        match self.call(method, params).await? {
            Value::String(quantity) => Ok(quantity),
            other => Err(unexpected(method, format!("expected hex string, got {other}"))),
        }
    }
}

#[async_trait]
impl ExecutionProvider for ExecutionNodeHttp {
    async fn is_reachable(&self) -> bool {
        match self.call("web3_clientVersion", json!([])).await {
            Ok(version) => {
                debug!(%version, "execution node reachable");
                true
            }
            Err(err) => {
                debug!(%err, "execution node unreachable");
                false
            }
        }
    }

    async fn get_block_number(&self) -> Result<BlockNumber, ProviderError> {
        let quantity = self
            .call_hex_quantity("eth_blockNumber", json!([]))
            .timed("eth_blockNumber")
            .await?;
        u64_from_hex_str(&quantity).map_err(|err| unexpected("eth_blockNumber", err))
    }

    async fn get_block_timestamp(&self, block_number: BlockNumber) -> Result<i64, ProviderError> {
        let value = self
            .call(
                "eth_getBlockByNumber",
                json!((hex_quantity(block_number), false)),
            )
            .timed("eth_getBlockByNumber")
            .await?;

        serde_json::from_value::<Option<BlockTimestamp>>(value)
            .map_err(|err| unexpected("eth_getBlockByNumber", err))?
            .map(|block| block.timestamp)
            .ok_or_else(|| {
                unexpected(
                    "eth_getBlockByNumber",
                    format!("block {block_number} not found"),
                )
            })
    }

    async fn get_balance(
        &self,
        account: &Account,
        block_number: BlockNumber,
    ) -> Result<WeiNewtype, ProviderError> {
        let quantity = self
            .call_hex_quantity(
                "eth_getBalance",
                json!((account.to_string(), hex_quantity(block_number))),
            )
            .timed("eth_getBalance")
            .await?;
        u128_from_hex_str(&quantity)
            .map(WeiNewtype)
            .map_err(|err| unexpected("eth_getBalance", err))
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;

    use super::*;

    const ACCOUNT: &str = "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045";

    #[tokio::test]
    async fn get_balance_test() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({
                "method": "eth_getBalance",
                "params": [ACCOUNT, "0x10"]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0xde0b6b3a7640000"}"#)
            .create_async()
            .await;

        let node = ExecutionNodeHttp::new(&server.url());
        let account: Account = ACCOUNT.parse().unwrap();
        let balance = node.get_balance(&account, 16).await.unwrap();

        assert_eq!(balance, WeiNewtype(1_000_000_000_000_000_000));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn get_block_number_test() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({"method": "eth_blockNumber"})))
            .with_status(200)
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x1234"}"#)
            .create_async()
            .await;

        let node = ExecutionNodeHttp::new(&server.url());
        assert_eq!(node.get_block_number().await.unwrap(), 0x1234);
    }

    #[tokio::test]
    async fn get_block_timestamp_test() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({
                "method": "eth_getBlockByNumber",
                "params": ["0x0", false]
            })))
            .with_status(200)
            .with_body(
                r#"{"jsonrpc":"2.0","id":1,"result":{"number":"0x0","timestamp":"0x6530a1ff"}}"#,
            )
            .create_async()
            .await;

        let node = ExecutionNodeHttp::new(&server.url());
        assert_eq!(node.get_block_timestamp(0).await.unwrap(), 1_697_686_015);
    }

    #[tokio::test]
    async fn missing_block_test() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":null}"#)
            .create_async()
            .await;

        let node = ExecutionNodeHttp::new(&server.url());
        let result = node.get_block_timestamp(99_999_999).await;
        assert!(matches!(
            result,
            Err(ProviderError::UnexpectedResponse {
                method: "eth_getBlockByNumber",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn http_429_is_rate_limit_test() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(429)
            .create_async()
            .await;

        let node = ExecutionNodeHttp::new(&server.url());
        let err = node.get_block_number().await.unwrap_err();
        assert!(err.is_rate_limit());
    }

    #[tokio::test]
    async fn rpc_rate_limit_error_is_rate_limit_test() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body(
                r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32005,"message":"daily request count exceeded"}}"#,
            )
            .create_async()
            .await;

        let node = ExecutionNodeHttp::new(&server.url());
        let err = node.get_block_number().await.unwrap_err();
        assert!(err.is_rate_limit());
    }

    #[tokio::test]
    async fn other_rpc_error_is_not_rate_limit_test() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body(
                r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"missing trie node"}}"#,
            )
            .create_async()
            .await;

        let node = ExecutionNodeHttp::new(&server.url());
        let err = node.get_block_number().await.unwrap_err();
        assert!(matches!(err, ProviderError::Rpc { code: -32000, .. }));
    }

    #[tokio::test]
    async fn is_reachable_test() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({"method": "web3_clientVersion"})))
            .with_status(200)
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"Geth/v1.13.5"}"#)
            .create_async()
            .await;

        let node = ExecutionNodeHttp::new(&server.url());
        assert!(node.is_reachable().await);
    }

    #[tokio::test]
    async fn is_not_reachable_on_server_error_test() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(503)
            .create_async()
            .await;

        let node = ExecutionNodeHttp::new(&server.url());
        assert!(!node.is_reachable().await);
    }

    #[test]
    fn message_mentioning_rate_limit_test() {
        let err = ProviderError::from(RpcError {
            code: -32603,
            message: "Too Many Requests, slow down".to_string(),
        });
        assert!(err.is_rate_limit());
    }
}
