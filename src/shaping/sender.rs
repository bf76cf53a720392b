use std::future::Future;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use snafu::Snafu;
use tower::timeout::{Timeout, error::Elapsed};
use tower::{Service, ServiceExt};

use super::GeneratorSettings;

/// Failures at the dispatch boundary.
///
/// Timeouts and transport errors are both treated as plain dispatch
/// failures: logged with the correlation id, never retried, never
/// propagated to the tick loop.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SendError {
    /// The request did not complete within the configured timeout.
    #[snafu(display("request timed out"))]
    Timeout,

    /// Network-level failure (connect, DNS, broken transfer).
    #[snafu(display("transport error: {source}"))]
    Transport { source: crate::Error },

    /// The endpoint answered with a non-success status.
    #[snafu(display("endpoint responded with status {status}: {body}"))]
    Status { status: u16, body: String },

    /// The request could not be constructed.
    #[snafu(display("failed to build request: {details}"))]
    BuildRequest { details: String },

    /// The configured endpoint URL does not parse.
    #[snafu(display("invalid endpoint url '{url}': {details}"))]
    InvalidUrl { url: String, details: String },

    /// Any other client-side failure.
    #[snafu(display("http client error: {source}"))]
    Client { source: crate::Error },
}

/// Wire body of one generated request: `{"reqId": ..., "amt": ..., "ts": ...}`.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchBody {
    /// Unique correlation id, `<sequence>-<8 hex chars>`.
    #[serde(rename = "reqId")]
    pub req_id: String,
    /// Fixed synthetic payload amount.
    pub amt: i64,
    /// Issue timestamp, epoch milliseconds.
    pub ts: u64,
}

/// Performs one asynchronous dispatch and reports exactly one completion.
///
/// This is the seam between the shaping engine and the outside world; tests
/// substitute a recording implementation, production uses [`HttpSender`].
pub trait RequestSender: Clone + Send + Sync + 'static {
    fn send(&self, body: DispatchBody) -> impl Future<Output = Result<(), SendError>> + Send;
}

/// One serialized dispatch, ready for the wire. The URL is validated once
/// at [`HttpSender`] construction, never per request.
#[derive(Debug)]
pub struct OutboundPost {
    pub url: reqwest::Url,
    pub payload: Vec<u8>,
}

/// A `tower::Service` wrapper for `reqwest::Client`.
///
/// Posts an [`OutboundPost`] as JSON, surfaces non-success statuses as
/// [`SendError::Status`] and classifies client failures into
/// timeout/transport/other.
#[derive(Clone)]
pub struct ReqwestService {
    client: reqwest::Client,
}

impl ReqwestService {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Service<OutboundPost> for ReqwestService {
    type Response = reqwest::Response;
    type Error = SendError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: OutboundPost) -> Self::Future {
        let pending = self
            .client
            .post(request.url)
            .header(CONTENT_TYPE, "application/json")
            .body(request.payload)
            .send();
        Box::pin(async move {
            match pending.await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        Ok(response)
                    } else {
                        let body = response
                            .text()
                            .await
                            .unwrap_or_else(|_| "could not read error body".to_string());
                        Err(SendError::Status {
                            status: status.as_u16(),
                            body,
                        })
                    }
                }
                Err(err) => {
                    if err.is_timeout() {
                        Err(SendError::Timeout)
                    } else if err.is_connect() {
                        Err(SendError::Transport {
                            source: Box::new(err),
                        })
                    } else {
                        Err(SendError::Client {
                            source: Box::new(err),
                        })
                    }
                }
            }
        })
    }
}

/// The production sender: a timeout layer over [`ReqwestService`], posting
/// JSON bodies to the configured endpoint.
#[derive(Clone)]
pub struct HttpSender {
    service: Timeout<ReqwestService>,
    endpoint: reqwest::Url,
}

impl HttpSender {
    /// Validates the endpoint URL and assembles the service stack.
    pub fn new(settings: &GeneratorSettings) -> Result<Self, SendError> {
        let endpoint =
            reqwest::Url::parse(&settings.endpoint_url).map_err(|err| SendError::InvalidUrl {
                url: settings.endpoint_url.clone(),
                details: err.to_string(),
            })?;

        let service = Timeout::new(
            ReqwestService::new(reqwest::Client::new()),
            Duration::from_secs(settings.request_timeout_secs.max(1)),
        );

        Ok(Self { service, endpoint })
    }
}

impl RequestSender for HttpSender {
    fn send(&self, body: DispatchBody) -> impl Future<Output = Result<(), SendError>> + Send {
        let service = self.service.clone();
        let endpoint = self.endpoint.clone();

        async move {
            let payload = serde_json::to_vec(&body).map_err(|err| SendError::BuildRequest {
                details: err.to_string(),
            })?;
            let request = OutboundPost {
                url: endpoint,
                payload,
            };

            match service.oneshot(request).await {
                Ok(_response) => Ok(()),
                Err(err) => {
                    // The timeout layer erases the error type; recover ours.
                    if err.is::<Elapsed>() {
                        Err(SendError::Timeout)
                    } else {
                        match err.downcast::<SendError>() {
                            Ok(send_error) => Err(*send_error),
                            Err(other) => Err(SendError::Client { source: other }),
                        }
                    }
                }
            }
        }
    }
}
