//! Per-request tracing spans keyed by a request id.
//!
//! A caller-supplied `X-Request-Id` is reused when it looks sane (short,
//! visible ASCII); otherwise a ULID is generated. The resolved id is always
//! echoed back in the `X-Request-Id` response header.

use axum::extract::Request;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::Response;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};
use tracing::Instrument;

pub static REQUEST_ID_HEADER: &str = "x-request-id";

const MAX_INCOMING_ID_LEN: usize = 64;

#[derive(Clone)]
pub struct RequestIdLayer;

impl<S> Layer<S> for RequestIdLayer {
    type Service = RequestIdService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestIdService { inner }
    }
}

#[derive(Clone)]
pub struct RequestIdService<S> {
    inner: S,
}

fn incoming_id(req: &Request) -> Option<String> {
    let raw = req.headers().get(REQUEST_ID_HEADER)?.to_str().ok()?.trim();
    let sane = !raw.is_empty()
        && raw.len() <= MAX_INCOMING_ID_LEN
        && raw.bytes().all(|b| b.is_ascii_graphic());
    sane.then(|| raw.to_owned())
}

/// Louder for worse outcomes: success at debug, client errors at info,
/// server errors at warn.
fn log_response(method: &Method, path: &str, status: StatusCode, duration_ms: u64) {
    let status = status.as_u16();
    if status >= 500 {
        tracing::warn!(%method, path, status, duration_ms, "response");
    } else if status >= 400 {
        tracing::info!(%method, path, status, duration_ms, "response");
    } else {
        tracing::debug!(%method, path, status, duration_ms, "response");
    }
}

impl<S, B> Service<Request> for RequestIdService<S>
where
    S: Service<Request, Response = Response<B>> + Send + 'static,
    S::Future: Send + 'static,
    S::Error: std::fmt::Debug,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let req_id = incoming_id(&req).unwrap_or_else(|| ulid::Ulid::new().to_string());

        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let span = tracing::info_span!("request", req_id = %req_id);
        let start = Instant::now();
        let header_value = HeaderValue::from_str(&req_id).ok();

        let future = self.inner.call(req);

        Box::pin(
            async move {
                let mut result = future.await;
                let duration_ms = start.elapsed().as_millis() as u64;
                match &result {
                    Ok(response) => log_response(&method, &path, response.status(), duration_ms),
                    Err(e) => {
                        tracing::error!(%method, %path, error = ?e, duration_ms, "request failed");
                    }
                }

                if let Ok(ref mut response) = result
                    && let Some(value) = header_value
                {
                    response.headers_mut().insert(REQUEST_ID_HEADER, value);
                }

                result
            }
            .instrument(span),
        )
    }
}
