//! Test helpers for E2E tests: an in-process stub of the remote service.

use serde_json::Value;
use std::io::Read;
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tempfile::TempDir;
use tiny_http::{Header, Response, Server};
use tunnelrun::models::{Tier, TierPolicy};
use tunnelrun::{Bridge, BridgeConfig};

/// A request as the stub saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    /// Path without the query string
    pub path: String,
    pub query: String,
    pub body: String,
}

impl RecordedRequest {
    /// The `code` field of an `/execute` body.
    pub fn code(&self) -> String {
        serde_json::from_str::<Value>(&self.body)
            .ok()
            .and_then(|v| v.get("code").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_default()
    }

    pub fn timeout_field(&self) -> Option<u64> {
        serde_json::from_str::<Value>(&self.body)
            .ok()
            .and_then(|v| v.get("timeout").and_then(Value::as_u64))
    }
}

/// What the stub answers.
pub struct StubReply {
    pub status: u16,
    pub body: Vec<u8>,
    pub delay: Option<Duration>,
}

impl StubReply {
    pub fn json(value: Value) -> Self {
        Self {
            status: 200,
            body: value.to_string().into_bytes(),
            delay: None,
        }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.as_bytes().to_vec(),
            delay: None,
        }
    }

    pub fn bytes(body: &[u8]) -> Self {
        Self {
            status: 200,
            body: body.to_vec(),
            delay: None,
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// A successful `/execute` answer echoing the submitted code.
    pub fn echo(request: &RecordedRequest) -> Self {
        Self::json(serde_json::json!({
            "success": true,
            "stdout": format!("{}\n", request.code()),
            "execution_time_sec": 0.01,
        }))
    }
}

/// Remote service stub on an ephemeral localhost port. Requests are served
/// one at a time and recorded in arrival order.
pub struct StubRemote {
    pub url: String,
    server: Arc<Server>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    thread: Option<JoinHandle<()>>,
}

impl StubRemote {
    pub fn start<F>(handler: F) -> Self
    where
        F: Fn(&RecordedRequest) -> StubReply + Send + 'static,
    {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind stub listener");
        let addr = listener.local_addr().expect("stub address");
        let server = Arc::new(Server::from_listener(listener, None).expect("start stub server"));
        let url = format!("http://{}:{}", addr.ip(), addr.port());

        let requests = Arc::new(Mutex::new(Vec::new()));
        let requests_clone = requests.clone();
        let server_clone = server.clone();

        let thread = thread::spawn(move || {
            for mut request in server_clone.incoming_requests() {
                let mut body = String::new();
                let _ = request.as_reader().read_to_string(&mut body);
                let (path, query) = match request.url().split_once('?') {
                    Some((path, query)) => (path.to_string(), query.to_string()),
                    None => (request.url().to_string(), String::new()),
                };
                let recorded = RecordedRequest {
                    method: request.method().to_string(),
                    path,
                    query,
                    body,
                };
                requests_clone.lock().unwrap().push(recorded.clone());

                let reply = handler(&recorded);
                if let Some(delay) = reply.delay {
                    thread::sleep(delay);
                }
                let response = Response::from_data(reply.body)
                    .with_status_code(reply.status)
                    .with_header(
                        Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                            .unwrap(),
                    );
                let _ = request.respond(response);
            }
        });

        Self {
            url,
            server,
            requests,
            thread: Some(thread),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests that hit `path`.
    pub fn calls_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }
}

impl Drop for StubRemote {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Config pointing at `url` with scratch directories under `temp` and short
/// timeouts.
pub fn test_config(url: &str, temp: &TempDir) -> BridgeConfig {
    let mut config = BridgeConfig {
        base_url: url.to_string(),
        save_dir: temp.path().join("results"),
        checkpoint_dir: temp.path().join("checkpoints"),
        connect_timeout_secs: 2,
        network_grace_secs: 1,
        ..BridgeConfig::default()
    };
    config.tiers.set(Tier::Quick, TierPolicy::from_secs(2));
    config.tiers.set(Tier::Long, TierPolicy::from_secs(5));
    config.tiers.set(Tier::Chunked, TierPolicy::from_secs(2));
    config.probe.probe_timeout_secs = 2;
    config
}

pub fn bridge_for(stub: &StubRemote, temp: &TempDir) -> Bridge {
    Bridge::new(test_config(&stub.url, temp)).expect("bridge")
}
