// SPDX-License-Identifier: Apache-2.0
//! HTTP client for the external note indexer.
//!
//! The indexer supplies note positions and spendability; action payloads
//! still come from the node. Listing follows `next_cursor` pagination with a
//! duplicate-cursor guard; witness responses may reorder positions.

use std::collections::HashSet;
use std::time::Duration;

use log::debug;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Page size requested from the notes endpoint.
const LIST_PAGE_LIMIT: u32 = 1_000;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("url parse: {0}")]
    Url(#[from] url::ParseError),
    #[error("indexer returned HTTP {status}")]
    Status { status: u16 },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("cursor loop in notes pagination")]
    CursorLoop,
}

#[derive(Clone)]
pub struct ScanClient {
    base: Url,
    client: Client,
    bearer: Option<HeaderValue>,
}

/// A spendable note as reported by the indexer, after client-side filters.
#[derive(Clone, Debug)]
pub struct SpendableNote {
    pub txid: String,
    pub action_index: u32,
    pub height: i64,
    pub position: u32,
    pub value_zat: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ScanWitnessPath {
    pub position: u32,
    #[serde(default)]
    pub auth_path: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ScanWitness {
    #[serde(default)]
    pub root: String,
    #[serde(default)]
    pub anchor_height: i64,
    #[serde(default)]
    pub paths: Vec<ScanWitnessPath>,
}

#[derive(Debug, Deserialize)]
struct NotePage {
    #[serde(default)]
    notes: Vec<RawNote>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawNote {
    #[serde(default)]
    txid: String,
    #[serde(default)]
    action_index: i64,
    #[serde(default)]
    height: i64,
    #[serde(default)]
    position: Option<i64>,
    #[serde(default)]
    pending_spent_txid: Option<String>,
    #[serde(default)]
    value_zat: i64,
}

impl ScanClient {
    /// `base` like "http://indexer:8080"; optional bearer token is sent as
    /// `Authorization: Bearer ...` on every request.
    pub fn new(base: &str, bearer_token: Option<&str>) -> Result<Self, ScanError> {
        let base = Url::parse(base)?;
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .default_headers(headers)
            .build()?;

        let bearer = match bearer_token.map(str::trim).filter(|t| !t.is_empty()) {
            Some(token) => Some(
                HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|e| ScanError::Decode(format!("bearer token encode: {e}")))?,
            ),
            None => None,
        };

        Ok(Self {
            base,
            client,
            bearer,
        })
    }

    fn auth_headers(&self) -> HeaderMap {
        let mut h = HeaderMap::new();
        if let Some(b) = &self.bearer {
            h.insert(reqwest::header::AUTHORIZATION, b.clone());
        }
        h
    }

    /// List unspent, confirmed, positioned notes for a wallet, following
    /// pagination to the end.
    pub fn list_wallet_notes(
        &self,
        wallet_id: &str,
        tip_height: i64,
        min_confirmations: i64,
        min_value_zat: u64,
    ) -> Result<Vec<SpendableNote>, ScanError> {
        let path = format!("/v1/wallets/{wallet_id}/notes");
        let mut out = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen_cursors: HashSet<String> = HashSet::new();
        let mut pages = 0u32;

        loop {
            let mut url = self.base.join(&path)?;
            {
                let mut q = url.query_pairs_mut();
                q.append_pair("spent", "false");
                q.append_pair("limit", &LIST_PAGE_LIMIT.to_string());
                q.append_pair("min_value_zat", &min_value_zat.to_string());
                if let Some(c) = &cursor {
                    q.append_pair("cursor", c);
                }
            }

            let resp = self.client.get(url).headers(self.auth_headers()).send()?;
            let status = resp.status();
            if !status.is_success() {
                return Err(ScanError::Status {
                    status: status.as_u16(),
                });
            }
            let page: NotePage = resp.json()?;
            pages += 1;

            for raw in page.notes {
                if let Some(note) =
                    accept_note(raw, tip_height, min_confirmations, min_value_zat)?
                {
                    out.push(note);
                }
            }

            match page.next_cursor.map(|c| c.trim().to_string()) {
                Some(next) if !next.is_empty() => {
                    if !seen_cursors.insert(next.clone()) {
                        return Err(ScanError::CursorLoop);
                    }
                    cursor = Some(next);
                }
                _ => break,
            }
        }

        debug!(
            "indexer listed {} spendable notes for wallet {wallet_id} over {pages} pages",
            out.len()
        );
        Ok(out)
    }

    /// Request authentication paths for the given leaf positions.
    pub fn orchard_witness(&self, positions: &[u32]) -> Result<ScanWitness, ScanError> {
        #[derive(Serialize)]
        struct Request<'a> {
            positions: &'a [u32],
        }

        let url = self.base.join("/v1/orchard/witness")?;
        let resp = self
            .client
            .post(url)
            .headers(self.auth_headers())
            .json(&Request { positions })
            .send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ScanError::Status {
                status: status.as_u16(),
            });
        }
        Ok(resp.json()?)
    }
}

fn accept_note(
    raw: RawNote,
    tip_height: i64,
    min_confirmations: i64,
    min_value_zat: u64,
) -> Result<Option<SpendableNote>, ScanError> {
    if raw
        .pending_spent_txid
        .as_deref()
        .is_some_and(|t| !t.trim().is_empty())
    {
        return Ok(None);
    }
    let Some(position) = raw.position else {
        return Ok(None);
    };
    if position < 0 {
        return Ok(None);
    }
    if raw.height < 0 || raw.height > tip_height {
        return Ok(None);
    }
    if tip_height - raw.height + 1 < min_confirmations {
        return Ok(None);
    }
    if raw.action_index < 0 || raw.action_index > i64::from(u32::MAX) {
        return Ok(None);
    }
    if raw.value_zat <= 0 {
        return Ok(None);
    }
    if (raw.value_zat as u64) < min_value_zat {
        return Ok(None);
    }
    if position > i64::from(u32::MAX) {
        return Err(ScanError::Decode("note position too large".into()));
    }

    Ok(Some(SpendableNote {
        txid: raw.txid.trim().to_ascii_lowercase(),
        action_index: raw.action_index as u32,
        height: raw.height,
        position: position as u32,
        value_zat: raw.value_zat as u64,
    }))
}
