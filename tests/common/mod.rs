#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ord_indexer::app::ports::{HttpClientPort, HttpGetResult};
use ord_indexer::domain::InscriptionRecord;
use ord_indexer::error::Result;
use ord_indexer::infra::HtmlPageParser;
use ord_indexer::protocol::DecoderRegistry;

pub const SERVER: &str = "http://ord.test";

#[derive(Default)]
struct Script {
    pages: HashMap<String, (u16, Vec<u8>)>,
    latency: HashMap<String, Duration>,
    /// Remaining forced 500s per URL.
    failures: HashMap<String, usize>,
    hits: HashMap<String, usize>,
}

/// Scripted explorer: canned bodies per URL, optional latency and forced failures.
#[derive(Clone, Default)]
pub struct MockHttp {
    script: Arc<Mutex<Script>>,
}

impl MockHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(&self, path: &str, body: impl Into<Vec<u8>>) {
        self.respond(path, 200, body);
    }

    pub fn respond(&self, path: &str, status: u16, body: impl Into<Vec<u8>>) {
        let mut script = self.script.lock().unwrap();
        script.pages.insert(url(path), (status, body.into()));
    }

    pub fn delay(&self, path: &str, latency: Duration) {
        let mut script = self.script.lock().unwrap();
        script.latency.insert(url(path), latency);
    }

    pub fn fail_times(&self, path: &str, times: usize) {
        let mut script = self.script.lock().unwrap();
        script.failures.insert(url(path), times);
    }

    pub fn hits(&self, path: &str) -> usize {
        let script = self.script.lock().unwrap();
        script.hits.get(&url(path)).copied().unwrap_or(0)
    }

    /// Inscription page plus its content page.
    pub fn inscription(&self, record: &InscriptionRecord, content: &str) {
        self.page(&format!("/inscription/{}", record.uid), inscription_html(record));
        self.page(&format!("/content/{}", record.uid), content);
    }

    pub fn parser(&self) -> Arc<HtmlPageParser> {
        Arc::new(HtmlPageParser::new(
            Arc::new(self.clone()),
            SERVER,
            Arc::new(DecoderRegistry::with_brc721()),
        ))
    }
}

fn url(path: &str) -> String {
    format!("{SERVER}{path}")
}

#[async_trait]
impl HttpClientPort for MockHttp {
    async fn get(&self, url: &str) -> Result<HttpGetResult> {
        let (latency, status, bytes) = {
            let mut script = self.script.lock().unwrap();
            *script.hits.entry(url.to_string()).or_default() += 1;
            let latency = script.latency.get(url).copied();
            let forced = match script.failures.get_mut(url) {
                Some(left) if *left > 0 => {
                    *left -= 1;
                    true
                }
                _ => false,
            };
            let (status, bytes) = if forced {
                (500, b"internal error".to_vec())
            } else {
                script
                    .pages
                    .get(url)
                    .cloned()
                    .unwrap_or((404, b"not found".to_vec()))
            };
            (latency, status, bytes)
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        Ok(HttpGetResult {
            status,
            content_length: bytes.len() as u64,
            bytes,
            content_type: "text/html".to_string(),
        })
    }
}

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

pub fn record(id: i64, uid: &str) -> InscriptionRecord {
    InscriptionRecord {
        id,
        uid: uid.to_string(),
        address: format!("bc1p{uid}"),
        output_value: 546,
        content_length: 64,
        content_type: "text/plain;charset=utf-8".to_string(),
        timestamp: at(1_700_000_000 + id),
        genesis_height: 800_000 + id as u64,
        genesis_fee: 300,
        genesis_tx: format!("tx{uid}"),
        location: format!("tx{uid}:0:0"),
        output: format!("tx{uid}:0"),
        offset: 0,
    }
}

pub fn inscription_html(record: &InscriptionRecord) -> String {
    format!(
        r#"<html><body>
        <h1>Inscription {id}</h1>
        <dl>
          <dt>id</dt><dd class=monospace>{uid}</dd>
          <dt>address</dt><dd class=monospace>{address}</dd>
          <dt>output value</dt><dd>{value}</dd>
          <dt>content length</dt><dd>{length} bytes</dd>
          <dt>content type</dt><dd>{content_type}</dd>
          <dt>timestamp</dt><dd><time>{timestamp}</time></dd>
          <dt>genesis height</dt><dd><a href=/block/{height}>{height}</a></dd>
          <dt>genesis fee</dt><dd>{fee}</dd>
          <dt>genesis transaction</dt><dd><a href=/tx/{tx}>{tx}</a></dd>
          <dt>location</dt><dd class=monospace>{location}</dd>
          <dt>output</dt><dd><a href=/output/{output}>{output}</a></dd>
          <dt>offset</dt><dd>{offset}</dd>
        </dl>
        </body></html>"#,
        id = record.id,
        uid = record.uid,
        address = record.address,
        value = record.output_value,
        length = record.content_length,
        content_type = record.content_type,
        timestamp = record.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        height = record.genesis_height,
        fee = record.genesis_fee,
        tx = record.genesis_tx,
        location = record.location,
        output = record.output,
        offset = record.offset,
    )
}

/// Listing page; `uids` newest first, as the explorer renders them.
pub fn listing_html(uids: &[&str], prev: Option<i64>, next: Option<i64>) -> String {
    let thumbnails: String = uids
        .iter()
        .map(|uid| format!("<a href=/inscription/{uid}><iframe></iframe></a>\n"))
        .collect();
    let prev = prev
        .map(|id| format!("<a class=prev href=/inscriptions/{id}>prev</a>"))
        .unwrap_or_default();
    let next = next
        .map(|id| format!("<a class=next href=/inscriptions/{id}>next</a>"))
        .unwrap_or_default();
    format!(
        "<html><body><h1>Inscriptions</h1><div class=thumbnails>{thumbnails}</div>\
         <div class=center>{prev}{next}</div></body></html>"
    )
}

pub fn deploy_json(tick: &str, max: u64) -> String {
    format!(r#"{{"p":"brc-721","op":"deploy","tick":"{tick}","max":"{max}","buri":"ipfs://{tick}/"}}"#)
}

pub fn mint_json(tick: &str) -> String {
    format!(r#"{{"p":"brc-721","op":"mint","tick":"{tick}"}}"#)
}
