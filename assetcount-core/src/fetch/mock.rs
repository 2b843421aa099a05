//! Test doubles: a scripted fetcher and a stub HTTP API.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::Router;

use super::{Page, PageFetcher};
use crate::error::FetchFailure;
use crate::types::Cursor;

/// Replays a fixed list of responses and records every cursor it was asked for.
pub struct ScriptedFetcher<T> {
    responses: Mutex<VecDeque<Result<Page<T>, String>>>,
    calls: Mutex<Vec<Option<Cursor>>>,
}

impl<T: Clone + Send> ScriptedFetcher<T> {
    pub fn new(responses: Vec<Result<Page<T>, String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Pages chained with cursors `"c1"`, `"c2"`, ... and no cursor on the last one.
    pub fn chained(pages: Vec<Vec<T>>) -> Self {
        let total = pages.len();
        let responses = pages
            .into_iter()
            .enumerate()
            .map(|(i, items)| {
                let next = (i + 1 < total).then(|| Cursor::from(format!("c{}", i + 1)));
                Ok(Page::new(items, next))
            })
            .collect();
        Self::new(responses)
    }

    pub fn calls(&self) -> Vec<Option<Cursor>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl<T: Clone + Send> PageFetcher for ScriptedFetcher<T> {
    type Item = T;

    async fn fetch(&self, cursor: Option<&Cursor>) -> Result<Page<T>, FetchFailure> {
        self.calls.lock().unwrap().push(cursor.cloned());
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(page)) => Ok(page),
            Some(Err(message)) => Err(FetchFailure::new(cursor, message)),
            None => Err(FetchFailure::new(cursor, "script exhausted")),
        }
    }
}

/// A request received by [`StubApi`].
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: String,
    /// Path and query
    pub uri: String,
    pub authorization: Option<String>,
    pub body: String,
}

#[derive(Clone)]
struct StubState {
    responses: Arc<Mutex<VecDeque<(u16, String)>>>,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

/// Local HTTP server answering every request with the next scripted
/// `(status, body)`, or 500 once the script runs out.
pub struct StubApi {
    base_url: String,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

impl StubApi {
    pub async fn start(responses: Vec<(u16, &str)>) -> Self {
        let state = StubState {
            responses: Arc::new(Mutex::new(
                responses
                    .into_iter()
                    .map(|(status, body)| (status, body.to_string()))
                    .collect(),
            )),
            seen: Arc::new(Mutex::new(Vec::new())),
        };
        let seen = state.seen.clone();

        let app = Router::new().fallback(answer).with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base_url: format!("http://{addr}"),
            seen,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

async fn answer(
    State(state): State<StubState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    state.seen.lock().unwrap().push(SeenRequest {
        method: method.to_string(),
        uri: uri.to_string(),
        authorization: headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body,
    });

    let (status, body) = state
        .responses
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or((500, "script exhausted".to_string()));
    (
        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        body,
    )
}
