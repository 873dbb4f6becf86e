#![allow(dead_code)]

use axum::body::Body;
use axum::Router;
use futures::stream::{self, Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;

/// Serve `router` on an ephemeral localhost port, returning its base URL.
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Chunked body that emits `chunks` and then closes.
pub fn finite_body(chunks: &[&str]) -> Body {
    Body::from_stream(chunk_stream(chunks))
}

/// Chunked body that emits `chunks` and then stays open forever.
pub fn hanging_body(chunks: &[&str]) -> Body {
    Body::from_stream(chunk_stream(chunks).chain(stream::pending()))
}

fn chunk_stream(chunks: &[&str]) -> impl Stream<Item = Result<String, Infallible>> + Send + 'static {
    let owned: Vec<Result<String, Infallible>> = chunks.iter().map(|c| Ok(c.to_string())).collect();
    stream::iter(owned)
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually<F>(mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
