//! txplan-rpc
//!
//! Minimal, blocking JSON-RPC client for the shielded node daemon.
//! Methods used (all via POST /):
//! - "getblockchaininfo"  (chain name, tip height, consensus branch ids)
//! - "getblockhash"       (height -> block hash)
//! - "getblock"           (hash, verbosity 2 -> transactions with orchard actions)
//! - "z_listunspent"      (spendable shielded notes for the node wallet)
//!
//! Amount fields are carried as `serde_json::Number` so the node's decimal
//! representation reaches the caller unrounded.

use base64::{engine::general_purpose, Engine as _};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("url parse: {0}")]
    Url(#[from] url::ParseError),
    #[error("rpc returned error: {0}")]
    Node(String),
    #[error("decode error: {0}")]
    Decode(String),
}

#[derive(Clone)]
pub struct NodeRpc {
    base: Url,
    client: Client,
    auth_header: Option<HeaderValue>,
}

impl NodeRpc {
    /// Create a new client. `base` like "http://127.0.0.1:18232".
    /// Optional basic auth via (user, pass); the node rejects unauthenticated
    /// requests when rpcuser/rpcpassword are configured.
    pub fn new(base: &str, auth: Option<(String, String)>) -> Result<Self, RpcError> {
        let base = Url::parse(base)?;
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .default_headers(headers)
            .build()?;

        let auth_header = match auth {
            Some((user, pass)) => {
                let token = format!("{user}:{pass}");
                let enc = general_purpose::STANDARD.encode(token);
                let header_value = HeaderValue::from_str(&format!("Basic {}", enc))
                    .map_err(|e| RpcError::Decode(format!("auth header encode: {e}")))?;
                Some(header_value)
            }
            None => None,
        };

        Ok(Self {
            base,
            client,
            auth_header,
        })
    }

    fn auth_headers(&self) -> HeaderMap {
        let mut h = HeaderMap::new();
        if let Some(a) = &self.auth_header {
            h.insert(AUTHORIZATION, a.clone());
        }
        h
    }

    /// Generic JSON-RPC call with positional parameters.
    pub fn call<P, R>(&self, method: &str, params: &P) -> Result<R, RpcError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        #[derive(Serialize)]
        struct Request<'a, T> {
            jsonrpc: &'a str,
            id: &'a str,
            method: &'a str,
            params: &'a T,
        }

        #[derive(Deserialize)]
        struct Envelope<T> {
            result: Option<T>,
            error: Option<RpcErrorDetail>,
        }

        #[derive(Deserialize)]
        struct RpcErrorDetail {
            code: i64,
            message: String,
        }

        let request = Request {
            jsonrpc: "1.0",
            id: "txplan",
            method,
            params,
        };

        let resp = self
            .client
            .post(self.base.clone())
            .headers(self.auth_headers())
            .json(&request)
            .send()?;
        let status = resp.status();
        // The node answers JSON-RPC errors with non-2xx statuses but still
        // carries the error envelope; decode it first when possible.
        let envelope: Envelope<R> = match resp.json() {
            Ok(env) => env,
            Err(_) if !status.is_success() => {
                return Err(RpcError::Node(format!("{method} HTTP {status}")));
            }
            Err(e) => return Err(e.into()),
        };
        if let Some(err) = envelope.error {
            return Err(RpcError::Node(format!(
                "{method} error code={} message={}",
                err.code, err.message
            )));
        }
        envelope
            .result
            .ok_or_else(|| RpcError::Node(format!("{method} missing result")))
    }

    /// JSON-RPC `getblockchaininfo`.
    pub fn get_blockchain_info(&self) -> Result<BlockchainInfo, RpcError> {
        self.call("getblockchaininfo", &[(); 0])
    }

    /// Convenience wrapper that extracts the fields the planner needs and
    /// parses the upcoming consensus branch id from its hex form.
    pub fn chain_info(&self) -> Result<ChainInfo, RpcError> {
        let info = self.get_blockchain_info()?;
        let branch_hex = info.consensus.nextblock.trim();
        let branch_id = u32::from_str_radix(branch_hex, 16)
            .map_err(|_| RpcError::Decode(format!("bad consensus branch id {branch_hex:?}")))?;
        Ok(ChainInfo {
            chain: info.chain,
            height: info.blocks,
            branch_id,
        })
    }

    /// JSON-RPC `getblockhash`.
    pub fn get_block_hash(&self, height: i64) -> Result<String, RpcError> {
        self.call("getblockhash", &(height,))
    }

    /// JSON-RPC `getblock` at verbosity 2 (full transactions, orchard bundle
    /// actions included).
    pub fn get_block_verbose(&self, hash: &str) -> Result<BlockV2, RpcError> {
        self.call("getblock", &(hash, 2u8))
    }

    /// JSON-RPC `z_listunspent`.
    pub fn z_list_unspent(
        &self,
        min_conf: i64,
        max_conf: i64,
        include_watchonly: bool,
    ) -> Result<Vec<UnspentEntry>, RpcError> {
        self.call("z_listunspent", &(min_conf, max_conf, include_watchonly))
    }
}

#[derive(Debug, Deserialize)]
pub struct BlockchainInfo {
    pub chain: String,
    pub blocks: i64,
    #[serde(default)]
    pub consensus: ConsensusInfo,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConsensusInfo {
    /// Branch id (hex) that the next block will be validated under.
    #[serde(default)]
    pub nextblock: String,
}

/// Chain facts extracted from `getblockchaininfo`.
#[derive(Clone, Debug)]
pub struct ChainInfo {
    pub chain: String,
    pub height: i64,
    pub branch_id: u32,
}

/// `getblock` verbosity-2 response, reduced to the fields the planner reads.
/// Extra fields are ignored; transactions without an orchard bundle decode
/// with an empty action list.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct BlockV2 {
    #[serde(default)]
    pub tx: Vec<TxV2>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct TxV2 {
    #[serde(default)]
    pub txid: String,
    #[serde(default)]
    pub orchard: OrchardBundleV2,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct OrchardBundleV2 {
    #[serde(default)]
    pub actions: Vec<OrchardActionV2>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct OrchardActionV2 {
    #[serde(default)]
    pub nullifier: String,
    #[serde(default)]
    pub cmx: String,
    #[serde(default, rename = "ephemeralKey")]
    pub ephemeral_key: String,
    #[serde(default, rename = "encCiphertext")]
    pub enc_ciphertext: String,
}

/// One `z_listunspent` entry. Non-orchard pools are carried through so the
/// caller can skip them.
#[derive(Clone, Debug, Deserialize)]
pub struct UnspentEntry {
    #[serde(default)]
    pub txid: String,
    #[serde(default)]
    pub pool: String,
    #[serde(default)]
    pub outindex: u32,
    #[serde(default)]
    pub confirmations: i64,
    #[serde(default)]
    pub spendable: bool,
    #[serde(default)]
    pub account: Option<u32>,
    pub amount: serde_json::Number,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn chain_info_parses_branch_hex() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).body_contains("getblockchaininfo");
            then.status(200)
                .header("content-type", "application/json")
                .body(
                    json!({
                        "result": {
                            "chain": "regtest",
                            "blocks": 205,
                            "bestblockhash": "00",
                            "consensus": { "chaintip": "c8e71055", "nextblock": "c8e71055" }
                        },
                        "error": null,
                        "id": "txplan"
                    })
                    .to_string(),
                );
        });

        let rpc = NodeRpc::new(&server.base_url(), None).unwrap();
        let info = rpc.chain_info().expect("chain info");
        mock.assert();
        assert_eq!(info.chain, "regtest");
        assert_eq!(info.height, 205);
        assert_eq!(info.branch_id, 0xc8e71055);
    }

    #[test]
    fn node_error_envelope_is_surfaced() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).body_contains("getblockhash");
            then.status(500)
                .header("content-type", "application/json")
                .body(
                    json!({
                        "result": null,
                        "error": { "code": -8, "message": "Block height out of range" },
                        "id": "txplan"
                    })
                    .to_string(),
                );
        });

        let rpc = NodeRpc::new(&server.base_url(), None).unwrap();
        let err = rpc.get_block_hash(10_000).unwrap_err();
        match err {
            RpcError::Node(msg) => {
                assert!(msg.contains("Block height out of range"), "{msg}");
                assert!(msg.contains("code=-8"), "{msg}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn list_unspent_keeps_decimal_amounts_exact() {
        let server = MockServer::start();
        // Raw body: the node emits amounts with trailing zeros, and the
        // arbitrary-precision Number must carry them through untouched.
        let body = format!(
            r#"{{"result":[{{"txid":"{}","pool":"orchard","outindex":1,"confirmations":12,"spendable":true,"account":0,"amount":0.24985000}}],"error":null,"id":"txplan"}}"#,
            "ab".repeat(32)
        );
        server.mock(|when, then| {
            when.method(POST).body_contains("z_listunspent");
            then.status(200)
                .header("content-type", "application/json")
                .body(body);
        });

        let rpc = NodeRpc::new(&server.base_url(), None).unwrap();
        let entries = rpc.z_list_unspent(1, 9_999_999, true).expect("entries");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].pool, "orchard");
        assert_eq!(entries[0].amount.to_string(), "0.24985000");
    }
}
