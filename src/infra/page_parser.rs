use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::app::ports::{HttpClientPort, PageParser};
use crate::constants::EXPLORER_TIME_FORMAT;
use crate::domain::{InscriptionRecord, InscriptionsListing, Page, PageRecord};
use crate::error::{IndexerError, Result};
use crate::metrics;
use crate::protocol::DecoderRegistry;

/// `PageParser` for the ord explorer's server-rendered HTML.
pub struct HtmlPageParser {
    http: Arc<dyn HttpClientPort>,
    base_url: String,
    registry: Arc<DecoderRegistry>,
}

impl HtmlPageParser {
    pub fn new(
        http: Arc<dyn HttpClientPort>,
        base_url: impl Into<String>,
        registry: Arc<DecoderRegistry>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            registry,
        }
    }

    /// Resolve a page path against the configured server address.
    pub fn resolve(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn fetch(&self, page: &Page) -> Result<Vec<u8>> {
        let url = self.resolve(&page.url());
        debug!("fetching {}", url);
        let started = Instant::now();
        let result = self.http.get(&url).await;
        let elapsed = started.elapsed().as_secs_f64();
        match result {
            Ok(resp) if resp.is_success() => {
                metrics::record_page_fetch(page.kind(), elapsed, true);
                Ok(resp.bytes)
            }
            Ok(resp) => {
                metrics::record_page_fetch(page.kind(), elapsed, false);
                Err(IndexerError::HttpStatus {
                    url,
                    status: resp.status,
                })
            }
            Err(e) => {
                metrics::record_page_fetch(page.kind(), elapsed, false);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl PageParser for HtmlPageParser {
    async fn parse(&self, page: &Page) -> Result<PageRecord> {
        let bytes = self.fetch(page).await?;
        let url = page.url();
        match page {
            Page::Inscription { .. } => {
                parse_inscription_page(&url, &bytes).map(PageRecord::Inscription)
            }
            Page::Content { .. } => Ok(PageRecord::Content(self.registry.decode(&bytes))),
            Page::Inscriptions { .. } => {
                parse_inscriptions_page(&url, &bytes).map(PageRecord::Inscriptions)
            }
        }
    }
}

fn selector(url: &str, css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| IndexerError::page(url, format!("bad selector {css}: {e}")))
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

pub fn parse_inscription_page(url: &str, bytes: &[u8]) -> Result<InscriptionRecord> {
    let body = String::from_utf8_lossy(bytes);
    let document = Html::parse_document(&body);
    let h1 = selector(url, "h1")?;
    let dt = selector(url, "dl dt")?;
    let dd = selector(url, "dl dd")?;
    let a = selector(url, "a")?;

    let heading = document.select(&h1).next().map(text_of).unwrap_or_default();
    let id_text = heading.replace("Inscription ", "");
    let id = id_text.trim().parse::<i64>().map_err(|e| {
        IndexerError::page(url, format!("failed to parse inscription id {id_text:?}: {e}"))
    })?;

    let mut record = InscriptionRecord {
        id,
        ..Default::default()
    };
    let values: Vec<String> = document
        .select(&dd)
        .map(|cell| cell.select(&a).next().map(text_of).unwrap_or_else(|| text_of(cell)))
        .collect();
    // Numeric cells the explorer leaves blank or formats oddly read as 0.
    for (key, value) in document.select(&dt).map(text_of).zip(values) {
        match key.to_lowercase().as_str() {
            "id" => record.uid = value,
            "address" => record.address = value,
            "output value" => record.output_value = value.parse().unwrap_or(0),
            "content length" => {
                record.content_length = value.replace(" bytes", "").trim().parse().unwrap_or(0)
            }
            "content type" => record.content_type = value,
            "timestamp" => record.timestamp = parse_timestamp(&value).unwrap_or_default(),
            "genesis height" => record.genesis_height = value.parse().unwrap_or(0),
            "genesis fee" => record.genesis_fee = value.parse().unwrap_or(0),
            "genesis transaction" => record.genesis_tx = value,
            "location" => record.location = value,
            "output" => record.output = value,
            "offset" => record.offset = value.parse().unwrap_or(0),
            _ => {}
        }
    }
    Ok(record)
}

pub fn parse_inscriptions_page(url: &str, bytes: &[u8]) -> Result<InscriptionsListing> {
    let body = String::from_utf8_lossy(bytes);
    let document = Html::parse_document(&body);
    let thumbnails = selector(url, "div.thumbnails a")?;
    let next = selector(url, "a.next")?;
    let prev = selector(url, "a.prev")?;

    let uids = document
        .select(&thumbnails)
        .filter_map(|link| link.value().attr("href"))
        .map(|href| href.replace("/inscription/", ""))
        .filter(|uid| !uid.is_empty())
        .collect();

    let cursor = |sel: &Selector| -> Result<Option<i64>> {
        let Some(href) = document.select(sel).next().and_then(|l| l.value().attr("href")) else {
            return Ok(None);
        };
        let text = href.replace("/inscriptions/", "");
        text.trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|e| IndexerError::page(url, format!("bad page cursor {text:?}: {e}")))
    };

    Ok(InscriptionsListing {
        uids,
        next_id: cursor(&next)?,
        prev_id: cursor(&prev)?,
    })
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim(), EXPLORER_TIME_FORMAT)
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::HttpGetResult;
    use std::collections::HashMap;

    const INSCRIPTION_HTML: &str = r#"<html><body>
        <h1>Inscription 4984402</h1>
        <dl>
          <dt>id</dt><dd class=monospace>6c1a5fdbi0</dd>
          <dt>address</dt><dd class=monospace>bc1pxyz</dd>
          <dt>output value</dt><dd>546</dd>
          <dt>content length</dt><dd>3440 bytes</dd>
          <dt>content type</dt><dd>text/plain;charset=utf-8</dd>
          <dt>timestamp</dt><dd><time>2023-05-28 03:28:17 UTC</time></dd>
          <dt>genesis height</dt><dd><a href=/block/791234>791234</a></dd>
          <dt>genesis fee</dt><dd>3150</dd>
          <dt>genesis transaction</dt><dd><a class=monospace href=/tx/6c1a5fdb>6c1a5fdb</a></dd>
          <dt>location</dt><dd class=monospace>6c1a5fdb:0:0</dd>
          <dt>output</dt><dd><a class=monospace href=/output/6c1a5fdb:0>6c1a5fdb:0</a></dd>
          <dt>offset</dt><dd>0</dd>
        </dl>
    </body></html>"#;

    const LISTING_HTML: &str = r#"<html><body>
        <h1>Inscriptions</h1>
        <div class=thumbnails>
          <a href=/inscription/cccci0><iframe></iframe></a>
          <a href=/inscription/bbbbi0><iframe></iframe></a>
          <a href=/inscription/aaaai0><iframe></iframe></a>
        </div>
        <div class=center>
          <a class=prev href=/inscriptions/4984302>prev</a>
          <a class=next href=/inscriptions/4984502>next</a>
        </div>
    </body></html>"#;

    struct StaticHttp(HashMap<String, (u16, Vec<u8>)>);

    #[async_trait]
    impl HttpClientPort for StaticHttp {
        async fn get(&self, url: &str) -> Result<HttpGetResult> {
            let (status, bytes) = self.0.get(url).cloned().unwrap_or((404, Vec::new()));
            Ok(HttpGetResult {
                status,
                content_length: bytes.len() as u64,
                bytes,
                content_type: "text/html".into(),
            })
        }
    }

    #[test]
    fn test_parse_inscription_page() {
        let record = parse_inscription_page("/inscription/x", INSCRIPTION_HTML.as_bytes()).unwrap();
        assert_eq!(record.id, 4984402);
        assert_eq!(record.uid, "6c1a5fdbi0");
        assert_eq!(record.address, "bc1pxyz");
        assert_eq!(record.output_value, 546);
        assert_eq!(record.content_length, 3440);
        assert_eq!(record.content_type, "text/plain;charset=utf-8");
        assert_eq!(
            record.timestamp,
            Utc.with_ymd_and_hms(2023, 5, 28, 3, 28, 17).unwrap()
        );
        assert_eq!(record.genesis_height, 791234);
        assert_eq!(record.genesis_fee, 3150);
        assert_eq!(record.genesis_tx, "6c1a5fdb");
        assert_eq!(record.output, "6c1a5fdb:0");
        assert_eq!(record.offset, 0);
    }

    #[test]
    fn test_inscription_page_without_number_is_an_error() {
        let err = parse_inscription_page("/inscription/x", b"<h1>Not found</h1>").unwrap_err();
        assert!(matches!(err, IndexerError::Page { .. }));
    }

    #[test]
    fn test_parse_inscriptions_page() {
        let listing = parse_inscriptions_page("/inscriptions", LISTING_HTML.as_bytes()).unwrap();
        assert_eq!(listing.uids, vec!["cccci0", "bbbbi0", "aaaai0"]);
        assert_eq!(listing.next_id, Some(4984502));
        assert_eq!(listing.prev_id, Some(4984302));
    }

    #[test]
    fn test_bad_cursor_is_an_error() {
        let html = r#"<a class=next href=/inscriptions/abc>next</a>"#;
        assert!(parse_inscriptions_page("/inscriptions", html.as_bytes()).is_err());
    }

    #[test]
    fn test_last_page_has_no_next_cursor() {
        let html = r#"<div class=thumbnails><a href=/inscription/ai0></a></div>
            <a class=prev href=/inscriptions/10>prev</a>"#;
        let listing = parse_inscriptions_page("/inscriptions", html.as_bytes()).unwrap();
        assert_eq!(listing.next_id, None);
        assert_eq!(listing.prev_id, Some(10));
    }

    #[tokio::test]
    async fn test_parser_resolves_urls_and_decodes_content() {
        let mut pages = HashMap::new();
        pages.insert(
            "http://ord.local/content/aaaai0".to_string(),
            (200, br#"{"p":"brc-721","op":"mint","tick":"ape"}"#.to_vec()),
        );
        let parser = HtmlPageParser::new(
            Arc::new(StaticHttp(pages)),
            "http://ord.local/",
            Arc::new(DecoderRegistry::with_brc721()),
        );
        let envelope = parser.content("aaaai0").await.unwrap();
        assert_eq!(envelope.kind(), "mint");

        let err = parser.inscription("missing").await.unwrap_err();
        assert!(matches!(err, IndexerError::HttpStatus { status: 404, .. }));
    }
}
