use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, COOKIE};
use rusqlite::Connection;
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::db::{self, CachedResponse};
use crate::error::Error;
use crate::source::parse_json;

/// How many leading bytes are inspected for an HTML document.
const SNIFF_LEN: usize = 512;

/// Raw JCR export of a page's content node.
pub fn raw_url(host: &str, page: &str) -> String {
    format!("{}{}/jcr:content.infinity.json", host, page)
}

/// Sling model export of one component below the page's content node.
pub fn model_url(host: &str, page: &str, component_path: &str) -> String {
    format!("{}{}/_jcr_content/{}.model.json", host, page, component_path)
}

/// An author instance answers an expired session with its HTML login page.
pub fn is_login_page(body: &[u8]) -> bool {
    let head = String::from_utf8_lossy(&body[..body.len().min(SNIFF_LEN)]).to_ascii_lowercase();
    let head = head.trim_start();
    if head.starts_with("<!doctype") || head.starts_with("<html") {
        return true;
    }
    let full = String::from_utf8_lossy(body);
    full.contains("j_security_check") || full.contains("granite/core/content/login")
}

/// HTTP client with the run's auth, timeout and optional fetch cache.
pub struct Fetcher {
    client: reqwest::Client,
    pub host: String,
    username: Option<String>,
    password: Option<String>,
    cache: Option<Mutex<Connection>>,
}

impl Fetcher {
    pub fn new(settings: &Settings, cache: Option<Connection>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &settings.login_token {
            headers.insert(COOKIE, HeaderValue::from_str(&format!("login-token={}", token))?);
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Fetcher {
            client,
            host: settings.host.clone(),
            username: settings.username.clone(),
            password: settings.password.clone(),
            cache: cache.map(Mutex::new),
        })
    }

    fn cached(&self, url: &str) -> Result<Option<CachedResponse>> {
        match &self.cache {
            Some(conn) => {
                let conn = conn.lock().map_err(|_| anyhow::anyhow!("fetch cache lock poisoned"))?;
                db::get_cached(&conn, url)
            }
            None => Ok(None),
        }
    }

    fn remember(&self, url: &str, response: &CachedResponse) -> Result<()> {
        if let Some(conn) = &self.cache {
            let conn = conn.lock().map_err(|_| anyhow::anyhow!("fetch cache lock poisoned"))?;
            db::store(&conn, url, response)?;
        }
        Ok(())
    }

    /// One GET, no retry. Login pages and non-success statuses become typed errors.
    pub async fn get_bytes(&self, url: &str) -> Result<CachedResponse> {
        let mut request = self.client.get(url);
        if let Some(user) = &self.username {
            request = request.basic_auth(user, self.password.as_deref());
        }
        let start = Instant::now();
        let response = request.send().await.with_context(|| format!("GET {}", url))?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.with_context(|| format!("reading body of {}", url))?.to_vec();
        debug!(url, status = status.as_u16(), ms = start.elapsed().as_millis() as u64, "fetched");

        if is_login_page(&body) {
            return Err(Error::AuthExpired(url.to_string()).into());
        }
        if !status.is_success() {
            return Err(Error::Http {
                url: url.to_string(),
                status: status.as_u16(),
            }
            .into());
        }
        Ok(CachedResponse {
            status: status.as_u16(),
            content_type,
            body,
        })
    }

    /// Cached GET of a JSON document.
    pub async fn get_json(&self, url: &str) -> Result<Value> {
        let response = match self.cached(url)? {
            Some(hit) => {
                debug!(url, "cache hit");
                hit
            }
            None => {
                let fresh = self.get_bytes(url).await?;
                self.remember(url, &fresh)?;
                fresh
            }
        };
        let text = std::str::from_utf8(&response.body).map_err(|e| Error::UnexpectedContent {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(parse_json(text, url)?)
    }
}

/// True when `err` means every later request would fail too.
pub fn is_fatal(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<Error>(), Some(Error::AuthExpired(_)))
}

/// Key paths (relative to the content node) of every tabs component.
/// Nested tabs are part of their outer component's model and are not listed.
pub fn discover_tabs(raw: &Value) -> Vec<String> {
    let mut found = Vec::new();
    let Some(root) = raw.as_object() else {
        return found;
    };
    let mut stack: Vec<(Vec<&str>, &Map<String, Value>)> = vec![(Vec::new(), root)];
    while let Some((path, node)) = stack.pop() {
        let children: Vec<(&str, &Map<String, Value>)> = node
            .iter()
            .filter(|(k, _)| !k.contains(':'))
            .filter_map(|(k, v)| v.as_object().map(|o| (k.as_str(), o)))
            .collect();
        for (key, child) in children {
            let mut child_path = path.clone();
            child_path.push(key);
            if is_tabs_component(child) {
                found.push(child_path.join("/"));
            } else {
                stack.push((child_path, child));
            }
        }
    }
    // Stack order is not document order.
    found.sort_by_key(|p| document_position(raw, p));
    found
}

fn is_tabs_component(node: &Map<String, Value>) -> bool {
    node.get("sling:resourceType")
        .and_then(Value::as_str)
        .and_then(|t| t.rsplit('/').next())
        .is_some_and(|c| c.starts_with("tabs"))
}

/// Pre-order index of a key path, used to sort discovered components.
fn document_position(raw: &Value, path: &str) -> Vec<usize> {
    let mut position = Vec::new();
    let mut current = raw;
    for key in path.split('/') {
        let Some(obj) = current.as_object() else {
            break;
        };
        let idx = obj.keys().position(|k| k == key).unwrap_or(usize::MAX);
        position.push(idx);
        match obj.get(key) {
            Some(next) => current = next,
            None => break,
        }
    }
    position
}

/// Combines per-component model exports into one document shaped like a
/// container model: `:items` keyed by component key, ordered by `:itemsOrder`.
pub fn assemble_model(parts: Vec<(String, Value)>) -> Value {
    let mut items = Map::new();
    let mut order = Vec::new();
    for (path, model) in parts {
        let short = path.rsplit('/').next().unwrap_or(&path).to_string();
        let key = if items.contains_key(&short) {
            path.replace('/', "_")
        } else {
            short
        };
        order.push(Value::String(key.clone()));
        items.insert(key, model);
    }
    let mut doc = Map::new();
    doc.insert(":items".to_string(), Value::Object(items));
    doc.insert(":itemsOrder".to_string(), Value::Array(order));
    Value::Object(doc)
}

pub struct FetchedPage {
    pub raw: Value,
    pub model: Value,
    pub tabs_ok: usize,
    pub tabs_failed: usize,
}

/// Fetches the raw tree, then every tabs model in parallel.
pub async fn fetch_page(fetcher: Arc<Fetcher>, page: &str, concurrency: usize) -> Result<FetchedPage> {
    let url = raw_url(&fetcher.host, page);
    info!("Fetching raw tree: {}", url);
    let raw = fetcher.get_json(&url).await?;

    let tabs = discover_tabs(&raw);
    info!("Found {} tabs components", tabs.len());

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let pb = ProgressBar::new(tabs.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let (tx, mut rx) = tokio::sync::mpsc::channel::<(usize, String, Result<Value>)>(concurrency.max(1) * 2);
    for (idx, path) in tabs.into_iter().enumerate() {
        let fetcher = Arc::clone(&fetcher);
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();
        let page = page.to_string();

        tokio::spawn(async move {
            let result = match sem.acquire().await {
                Ok(_permit) => {
                    let url = model_url(&fetcher.host, &page, &path);
                    fetcher.get_json(&url).await
                }
                Err(e) => Err(e.into()),
            };
            let _ = tx.send((idx, path, result)).await;
        });
    }
    drop(tx);

    let mut parts = Vec::new();
    let mut failed = 0usize;
    while let Some((idx, path, result)) = rx.recv().await {
        pb.inc(1);
        match result {
            Ok(model) => parts.push((idx, path, model)),
            Err(e) if is_fatal(&e) => {
                pb.finish_and_clear();
                return Err(e);
            }
            Err(e) => {
                warn!("Tabs model failed for {}: {:#}", path, e);
                failed += 1;
            }
        }
    }
    pb.finish_and_clear();

    parts.sort_by_key(|(idx, _, _)| *idx);
    let tabs_ok = parts.len();
    let model = assemble_model(parts.into_iter().map(|(_, path, model)| (path, model)).collect());
    info!("Fetched {} tabs models ({} failed)", tabs_ok, failed);

    Ok(FetchedPage {
        raw,
        model,
        tabs_ok,
        tabs_failed: failed,
    })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn urls() {
        assert_eq!(
            raw_url("https://author.example.com", "/content/site/en/support"),
            "https://author.example.com/content/site/en/support/jcr:content.infinity.json"
        );
        assert_eq!(
            model_url("https://author.example.com", "/content/site/en/support", "root/container/tabs"),
            "https://author.example.com/content/site/en/support/_jcr_content/root/container/tabs.model.json"
        );
    }

    #[test]
    fn login_page_detection() {
        assert!(is_login_page(b"<!DOCTYPE html><html><body>Sign in</body></html>"));
        assert!(is_login_page(b"\n  <html lang=\"en\">"));
        assert!(is_login_page(b"<form action=\"/libs/granite/core/content/login.html/j_security_check\">"));
        assert!(!is_login_page(br#"{"jcr:title": "Support"}"#));
        assert!(!is_login_page(&[0xFF, 0xD8, 0xFF, 0xE0]));
    }

    #[test]
    fn tabs_discovered_in_document_order() {
        let raw = json!({
            "jcr:title": "Support",
            "root": {
                "sling:resourceType": "site/components/container",
                "container_a": {
                    "tabs": {
                        "sling:resourceType": "site/components/tabs",
                        "item_1": {
                            "tabs_inner": {"sling:resourceType": "site/components/tabs"}
                        }
                    }
                },
                "tabs_2": {"sling:resourceType": "site/components/tabs"},
                "text": {"sling:resourceType": "site/components/text"}
            }
        });
        assert_eq!(discover_tabs(&raw), vec!["root/container_a/tabs", "root/tabs_2"]);
    }

    #[test]
    fn fixture_tabs() {
        let raw: Value = serde_json::from_str(include_str!("../tests/fixtures/page.infinity.json")).unwrap();
        let content = raw.get("jcr:content").unwrap();
        assert_eq!(discover_tabs(content), vec!["root/container_plans/tabs"]);
    }

    #[test]
    fn assembled_model_keys() {
        let doc = assemble_model(vec![
            ("root/a/tabs".into(), json!({"id": "one"})),
            ("root/b/tabs".into(), json!({"id": "two"})),
        ]);
        assert_eq!(doc[":itemsOrder"], json!(["tabs", "root_b_tabs"]));
        assert_eq!(doc[":items"]["root_b_tabs"]["id"], "two");
    }

    #[test]
    fn auth_expiry_is_fatal() {
        let err: anyhow::Error = Error::AuthExpired("https://h/x.json".into()).into();
        assert!(is_fatal(&err));
        let err: anyhow::Error = Error::Http {
            url: "https://h/x.json".into(),
            status: 404,
        }
        .into();
        assert!(!is_fatal(&err));
    }
}
