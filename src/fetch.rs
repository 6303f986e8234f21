use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use tracing::{trace, warn};

use crate::domain::LvError;

/// A server response: the HTTP status plus the rendered fragment body.
/// Non-2xx statuses are still fragments; the table decides how to render
/// them.
#[derive(Debug, Clone)]
pub struct Fragment {
    pub status: u16,
    pub body: String,
}

/// The seam between the table controller and the network. The production
/// implementation is `HttpSource`; tests plug in canned sources.
pub trait DataSource: Send + Sync {
    fn get(&self, url: &str) -> Result<Fragment, LvError>;
}

pub struct HttpSource {
    client: reqwest::blocking::Client,
}

impl HttpSource {
    pub fn new() -> Result<Self, LvError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()?;
        Ok(Self { client })
    }
}

impl DataSource for HttpSource {
    fn get(&self, url: &str) -> Result<Fragment, LvError> {
        let res = self
            .client
            .get(url)
            // Conventional marker so the server returns a fragment instead
            // of a full page.
            .header("X-Requested-With", "XMLHttpRequest")
            .send()?;
        let status = res.status().as_u16();
        let body = res.text()?;
        trace!(url, status, bytes = body.len(), "fetched");
        Ok(Fragment { status, body })
    }
}

/// Outcome of one worker fetch, tagged with the generation it was issued
/// under so the table can discard responses that were superseded.
#[derive(Debug)]
pub struct FetchOutcome {
    pub generation: u64,
    pub url: String,
    pub result: Result<Fragment, LvError>,
}

/// Runs one GET on a detached worker thread. Flipping `cancel` makes the
/// worker drop its response instead of reporting it; combined with the
/// generation tag this guarantees a slow early response never overwrites a
/// newer one.
pub fn spawn_fetch(
    source: Arc<dyn DataSource>,
    url: String,
    generation: u64,
    cancel: Arc<AtomicBool>,
    outcomes: Sender<FetchOutcome>,
) {
    thread::spawn(move || {
        trace!(url, generation, "fetch started");
        let result = source.get(&url);
        if cancel.load(Ordering::Relaxed) {
            trace!(url, generation, "fetch superseded, dropping response");
            return;
        }
        if outcomes
            .send(FetchOutcome {
                generation,
                url,
                result,
            })
            .is_err()
        {
            trace!("fetch receiver dropped");
        }
    });
}

/// Server-provided rendering hints for one column.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ColumnSpec {
    pub label: Option<String>,
    pub round: Option<u8>,
    pub good: Option<f64>,
    pub bad: Option<f64>,
}

/// Fetches the column metadata mapping. Any failure, including unparsable
/// JSON, degrades to an empty mapping so columns render with raw field
/// names instead of crashing.
pub fn fetch_column_meta(source: &dyn DataSource, url: &str) -> HashMap<String, ColumnSpec> {
    match source.get(url) {
        Ok(fragment) if fragment.status < 400 => {
            match serde_json::from_str(&fragment.body) {
                Ok(map) => map,
                Err(e) => {
                    warn!(url, error = %e, "unparsable column metadata, using raw field names");
                    HashMap::new()
                }
            }
        }
        Ok(fragment) => {
            warn!(url, status = fragment.status, "column metadata request failed");
            HashMap::new()
        }
        Err(e) => {
            warn!(url, error = %e, "column metadata request failed");
            HashMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned(u16, &'static str);

    impl DataSource for Canned {
        fn get(&self, _url: &str) -> Result<Fragment, LvError> {
            Ok(Fragment {
                status: self.0,
                body: self.1.to_string(),
            })
        }
    }

    #[test]
    fn column_meta_parses_good_json() {
        let source = Canned(
            200,
            r#"{"hltv":{"label":"HLTV","round":2,"good":1.1,"bad":0.9}}"#,
        );
        let meta = fetch_column_meta(&source, "/leaderboard/columns");
        let hltv = meta.get("hltv").expect("hltv spec");
        assert_eq!(hltv.label.as_deref(), Some("HLTV"));
        assert_eq!(hltv.round, Some(2));
    }

    #[test]
    fn column_meta_degrades_to_empty_on_garbage() {
        let source = Canned(200, "<html>not json</html>");
        assert!(fetch_column_meta(&source, "/x").is_empty());
    }

    #[test]
    fn column_meta_degrades_to_empty_on_http_error() {
        let source = Canned(500, "{}");
        assert!(fetch_column_meta(&source, "/x").is_empty());
    }
}
