//! Deterministic network stub and fixtures for proxy tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{StatusCode, header};
use tokio::sync::Semaphore;
use url::Url;

use super::lifecycle::{LifecycleController, ShellManifest};
use crate::fetch::{InterceptedRequest, Network, NetworkResponse, ResponseKind};
use offgrid_core::{CacheDb, Error};

pub(crate) const ORIGIN: &str = "https://app.test";
pub(crate) const SHELL: &[&str] = &["/", "/index.html", "/manifest.json"];

pub(crate) fn origin() -> Url {
    Url::parse(ORIGIN).unwrap()
}

pub(crate) fn url(path: &str) -> Url {
    origin().join(path).unwrap()
}

#[derive(Clone)]
enum Reply {
    Respond { status: u16, body: Vec<u8>, kind: ResponseKind },
    Fail,
}

/// Parks a request inside the network until the test opens it.
pub(crate) struct Gate {
    arrived: Semaphore,
    release: Semaphore,
}

impl Gate {
    fn new() -> Self {
        Self { arrived: Semaphore::new(0), release: Semaphore::new(0) }
    }

    /// Wait until a request is parked at this gate.
    pub(crate) async fn reached(&self) {
        self.arrived.acquire().await.unwrap().forget();
    }

    /// Let one parked request continue.
    pub(crate) fn open(&self) {
        self.release.add_permits(1);
    }

    async fn pass(&self) {
        self.arrived.add_permits(1);
        self.release.acquire().await.unwrap().forget();
    }
}

/// Network whose outcome per URL is scripted by the test. Unscripted URLs fail.
#[derive(Default)]
pub(crate) struct StubNetwork {
    replies: Mutex<HashMap<String, Reply>>,
    gates: Mutex<HashMap<String, Arc<Gate>>>,
    calls: Mutex<Vec<String>>,
}

impl StubNetwork {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn respond(&self, url: &Url, status: u16, body: &str) {
        self.respond_with(url, status, body, ResponseKind::Basic);
    }

    pub(crate) fn respond_with(&self, url: &Url, status: u16, body: &str, kind: ResponseKind) {
        self.replies
            .lock()
            .unwrap()
            .insert(url.to_string(), Reply::Respond { status, body: body.as_bytes().to_vec(), kind });
    }

    pub(crate) fn fail(&self, url: &Url) {
        self.replies.lock().unwrap().insert(url.to_string(), Reply::Fail);
    }

    /// Script every shell manifest path with a 200 response.
    pub(crate) fn serve_shell(&self, tag: &str) {
        for path in SHELL {
            self.respond(&url(path), 200, &format!("{tag} {path}"));
        }
    }

    pub(crate) fn go_offline(&self) {
        for reply in self.replies.lock().unwrap().values_mut() {
            *reply = Reply::Fail;
        }
    }

    /// Hold every request for `url` until the returned gate is opened.
    /// The scripted reply is looked up only after the gate opens.
    pub(crate) fn hold(&self, url: &Url) -> Arc<Gate> {
        let gate = Arc::new(Gate::new());
        self.gates.lock().unwrap().insert(url.to_string(), gate.clone());
        gate
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Network for StubNetwork {
    async fn fetch(&self, request: &InterceptedRequest) -> Result<NetworkResponse, Error> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{} {}", request.method, request.url));

        let gate = self.gates.lock().unwrap().get(request.url.as_str()).cloned();
        if let Some(gate) = gate {
            gate.pass().await;
        }

        let reply = self.replies.lock().unwrap().get(request.url.as_str()).cloned();
        match reply {
            Some(Reply::Respond { status, body, kind }) => {
                let mut headers = header::HeaderMap::new();
                headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("text/plain"));
                Ok(NetworkResponse {
                    url: request.url.clone(),
                    status: StatusCode::from_u16(status).unwrap(),
                    headers,
                    body: Bytes::from(body),
                    kind,
                    fetch_ms: 1,
                })
            }
            Some(Reply::Fail) | None => Err(Error::NetworkFailed(format!("offline: {}", request.url))),
        }
    }
}

pub(crate) fn controller(db: &CacheDb, network: &Arc<StubNetwork>, skip_waiting: bool) -> LifecycleController {
    let manifest = ShellManifest::new(&origin(), SHELL).unwrap();
    LifecycleController::new(db.clone(), network.clone(), manifest, skip_waiting)
}
