//! A stand-in for the rclone rc API that records every request.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use serde_json::Value;

#[derive(Clone, Default)]
pub struct FakeDaemon {
    requests: Arc<Mutex<Vec<(String, Value)>>>,
    replies: Arc<Mutex<HashMap<String, (u16, String)>>>,
}

impl FakeDaemon {
    /// Serve on an ephemeral local port and return it.
    pub async fn spawn() -> (Self, u16) {
        let daemon = Self::default();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let app = Router::new().fallback(handle).with_state(daemon.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (daemon, port)
    }

    /// Answer `endpoint` with `status` and `body` from now on.
    pub fn reply(&self, endpoint: &str, status: u16, body: &str) {
        self.replies
            .lock()
            .unwrap()
            .insert(endpoint.to_owned(), (status, body.to_owned()));
    }

    pub fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.requests().into_iter().map(|(path, _)| path).collect()
    }

    pub fn body_of(&self, endpoint: &str) -> Option<Value> {
        self.requests()
            .into_iter()
            .find(|(path, _)| path == endpoint)
            .map(|(_, body)| body)
    }
}

async fn handle(State(daemon): State<FakeDaemon>, uri: Uri, body: Bytes) -> (StatusCode, String) {
    let path = uri.path().to_owned();
    let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    daemon.requests.lock().unwrap().push((path.clone(), value));
    let reply = daemon.replies.lock().unwrap().get(&path).cloned();
    match reply {
        Some((status, body)) => (StatusCode::from_u16(status).unwrap(), body),
        None => (StatusCode::OK, "{}".to_owned()),
    }
}

/// A port nothing listens on.
pub async fn closed_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}
