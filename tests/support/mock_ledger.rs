use std::{
    collections::HashMap,
    convert::Infallible,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, RwLock,
    },
};

use anyhow::{Context, Result};
use hyper::service::{make_service_fn, service_fn};
use hyper::{body, Body, Method, Request, Response, Server, StatusCode};
use ledgerwatch::ledger::options::{HEAD_SELECTOR, RANGE_SELECTOR};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// In-memory batch ledger plus content store, served over one HTTP listener:
/// `POST /` answers JSON-RPC `eth_call`, `GET /ipfs/<ref>` serves blobs.
#[derive(Clone, Default)]
pub struct MockNetwork {
    inner: Arc<RwLock<MockNetworkInner>>,
    head: Arc<AtomicU64>,
    head_failing: Arc<AtomicBool>,
}

#[derive(Default)]
struct MockNetworkInner {
    batches: HashMap<u64, Vec<String>>,
    blobs: HashMap<String, String>,
    range_calls: Vec<(u64, u64)>,
    fetches: HashMap<String, usize>,
}

impl MockNetwork {
    pub fn new(head: u64) -> Self {
        let network = Self::default();
        network.set_head(head);
        network
    }

    pub fn set_head(&self, head: u64) {
        self.head.store(head, Ordering::SeqCst);
    }

    pub fn set_head_failing(&self, failing: bool) {
        self.head_failing.store(failing, Ordering::SeqCst);
    }

    pub fn publish(&self, batch: u64, refs: &[&str]) {
        let mut inner = self.inner.write().expect("mock network poisoned");
        inner
            .batches
            .entry(batch)
            .or_default()
            .extend(refs.iter().map(|r| r.to_string()));
    }

    pub fn serve_blob(&self, content_ref: &str, body: impl Into<String>) {
        let mut inner = self.inner.write().expect("mock network poisoned");
        inner.blobs.insert(content_ref.to_owned(), body.into());
    }

    pub fn serve_urls(&self, content_ref: &str, urls: &[&str]) {
        let items: Vec<Value> = urls
            .iter()
            .map(|url| json!({ "item": { "url": url } }))
            .collect();
        self.serve_blob(content_ref, json!({ "items": items }).to_string());
    }

    pub fn range_calls(&self) -> Vec<(u64, u64)> {
        self.inner
            .read()
            .expect("mock network poisoned")
            .range_calls
            .clone()
    }

    pub fn fetch_count(&self, content_ref: &str) -> usize {
        self.inner
            .read()
            .expect("mock network poisoned")
            .fetches
            .get(content_ref)
            .copied()
            .unwrap_or(0)
    }

    fn refs_between(&self, start: u64, end: u64) -> Vec<String> {
        let mut inner = self.inner.write().expect("mock network poisoned");
        inner.range_calls.push((start, end));
        (start..=end)
            .filter_map(|batch| inner.batches.get(&batch))
            .flatten()
            .cloned()
            .collect()
    }

    fn blob(&self, content_ref: &str) -> Option<String> {
        let mut inner = self.inner.write().expect("mock network poisoned");
        *inner.fetches.entry(content_ref.to_owned()).or_default() += 1;
        inner.blobs.get(content_ref).cloned()
    }
}

pub struct MockLedgerServer {
    url: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MockLedgerServer {
    pub async fn start(network: MockNetwork) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind mock ledger listener")?;
        let addr = listener
            .local_addr()
            .context("failed to read mock listener address")?;
        let std_listener = listener
            .into_std()
            .context("failed to convert mock listener")?;
        std_listener
            .set_nonblocking(true)
            .context("failed to set mock listener non-blocking")?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let make_service = make_service_fn(move |_| {
            let network = network.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| serve_request(network.clone(), req)))
            }
        });

        let server = Server::from_tcp(std_listener)
            .context("failed to build mock HTTP server")?
            .serve(make_service);
        let graceful = server.with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });

        let handle = tokio::spawn(async move {
            if let Err(err) = graceful.await {
                eprintln!("mock ledger server stopped: {err}");
            }
        });

        Ok(Self {
            url: format!("http://{addr}"),
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// JSON-RPC endpoint.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Content gateway base, ending in `/ipfs/`.
    pub fn gateway_url(&self) -> String {
        format!("{}/ipfs/", self.url)
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

async fn serve_request(
    network: MockNetwork,
    req: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    if req.method() == Method::GET {
        return Ok(serve_blob(&network, req.uri().path()));
    }

    if req.method() != Method::POST {
        return Ok(plain(StatusCode::METHOD_NOT_ALLOWED, "Unsupported method"));
    }

    let bytes = match body::to_bytes(req.into_body()).await {
        Ok(bytes) => bytes,
        Err(err) => {
            return Ok(plain(
                StatusCode::BAD_REQUEST,
                format!("failed to read body: {err}"),
            ))
        }
    };

    let payload: Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(err) => {
            return Ok(plain(
                StatusCode::BAD_REQUEST,
                format!("invalid JSON payload: {err}"),
            ))
        }
    };

    let response_value = handle_call(&network, payload);
    let mut response = Response::new(Body::from(response_value.to_string()));
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    Ok(response)
}

fn serve_blob(network: &MockNetwork, path: &str) -> Response<Body> {
    let Some(content_ref) = path.strip_prefix("/ipfs/") else {
        return plain(StatusCode::NOT_FOUND, "unknown path");
    };

    match network.blob(content_ref) {
        Some(body) => {
            let mut response = Response::new(Body::from(body));
            response.headers_mut().insert(
                hyper::header::CONTENT_TYPE,
                hyper::header::HeaderValue::from_static("application/json"),
            );
            response
        }
        None => plain(StatusCode::NOT_FOUND, "blob not found"),
    }
}

fn handle_call(network: &MockNetwork, call: Value) -> Value {
    let id = call.get("id").cloned().unwrap_or(Value::Null);
    let method = call
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if method != "eth_call" {
        return error(id, -32601, format!("unknown method {method}"));
    }

    let data = call
        .get("params")
        .and_then(Value::as_array)
        .and_then(|params| params.first())
        .and_then(|tx| tx.get("data"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim_start_matches("0x")
        .to_ascii_lowercase();

    let head_selector = hex::encode(HEAD_SELECTOR);
    let range_selector = hex::encode(RANGE_SELECTOR);

    if data.starts_with(&head_selector) {
        if network.head_failing.load(Ordering::SeqCst) {
            return error(id, -32000, "sync node unavailable");
        }
        let head = network.head.load(Ordering::SeqCst);
        return success(id, Value::String(encode_u64_result(head)));
    }

    if data.starts_with(&range_selector) {
        return match (word_arg(&data, 0), word_arg(&data, 1)) {
            (Some(start), Some(end)) => {
                let refs = network.refs_between(start, end);
                success(id, Value::String(encode_string_array_result(&refs)))
            }
            _ => error(id, -32602, "malformed range arguments"),
        };
    }

    error(id, 3, "execution reverted")
}

const WORD: usize = 32;

fn uint_word(value: u64) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 8..].copy_from_slice(&value.to_be_bytes());
    word
}

fn encode_u64_result(value: u64) -> String {
    format!("0x{}", hex::encode(uint_word(value)))
}

/// ABI-encodes a `string[]` return value: head offset, length, element
/// offsets, then each length-prefixed string padded to a word boundary.
fn encode_string_array_result(values: &[String]) -> String {
    let mut out = Vec::new();
    out.extend_from_slice(&uint_word(WORD as u64));
    out.extend_from_slice(&uint_word(values.len() as u64));

    let mut tails = Vec::new();
    let mut next_offset = values.len() * WORD;
    for value in values {
        let bytes = value.as_bytes();
        out.extend_from_slice(&uint_word(next_offset as u64));

        let mut tail = uint_word(bytes.len() as u64).to_vec();
        tail.extend_from_slice(bytes);
        let padding = (WORD - bytes.len() % WORD) % WORD;
        tail.resize(tail.len() + padding, 0);
        next_offset += tail.len();
        tails.push(tail);
    }

    for tail in tails {
        out.extend_from_slice(&tail);
    }
    format!("0x{}", hex::encode(out))
}

/// Reads the `index`-th `uint256` argument after the 4-byte selector.
fn word_arg(data: &str, index: usize) -> Option<u64> {
    let start = 8 + index * 64;
    let word = data.get(start..start + 64)?;
    u64::from_str_radix(&word[48..], 16).ok()
}

fn plain(status: StatusCode, message: impl Into<String>) -> Response<Body> {
    let mut response = Response::new(Body::from(message.into()));
    *response.status_mut() = status;
    response
}

fn success(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "result": result,
        "id": id,
    })
}

fn error(id: Value, code: i64, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": {
            "code": code,
            "message": message.into(),
        },
        "id": id,
    })
}
