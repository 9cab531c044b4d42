use crate::access_log::{AccessLogger, LogStatus};
use crate::body::ChannelBody;
use crate::config::Config;
use crate::errors::RelayError;
use crate::metrics_defs;
use crate::registry::{Target, TargetRegistry};
use crate::transform::{InboundRequest, build_outbound};
use http_body_util::{BodyExt, Full, combinators::BoxBody};
use hyper::body::{Bytes, Frame};
use hyper::header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, HeaderValue};
use hyper::{Request, Response, StatusCode};
use shared::headers::filter_hop_by_hop;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Body type every relay response is boxed into.
pub type RelayBody = BoxBody<Bytes, RelayError>;

const STREAM_CHANNEL_CAPACITY: usize = 32;

/// Executes the relay pipeline for one request at a time: resolve a target,
/// transform the request, dispatch upstream, copy the response back.
///
/// Every failure is converted into a caller-facing response here; nothing
/// propagates to the connection level.
pub struct RelayEngine {
    registry: TargetRegistry,
    client: reqwest::Client,
    logger: Arc<AccessLogger>,
    timeout: Duration,
}

impl RelayEngine {
    pub fn new(config: &Config) -> Result<Self, RelayError> {
        let registry = TargetRegistry::from_config(config);
        let logger = Arc::new(AccessLogger::new(config.log_dir.clone())?);
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| RelayError::InternalError(format!("failed to build http client: {e}")))?;

        Ok(Self {
            registry,
            client,
            logger,
            timeout: Duration::from_secs(config.upstream_timeout_secs),
        })
    }

    /// Front-door entry point. Buffers the inbound body once, then hands the
    /// snapshot to the relay pipeline.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<RelayBody>
    where
        B: hyper::body::Body + Send + Unpin + 'static,
        B::Data: Send,
        B::Error: std::error::Error + Send + Sync + 'static,
    {
        let (parts, body) = req.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                let err = RelayError::RequestBodyError(e.to_string());
                tracing::warn!(error = %err, "dropping request");
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error",
                    &err.to_string(),
                );
            }
        };

        let inbound = InboundRequest::from_parts(parts, body);
        self.relay(&inbound).await
    }

    async fn relay(&self, inbound: &InboundRequest) -> Response<RelayBody> {
        let Some(target) = self.registry.resolve(inbound.path()) else {
            let err = RelayError::NoTargetMatched(inbound.path_and_query().to_string());
            let message = err.to_string();
            tracing::warn!(method = %inbound.method, path = %inbound.path(), "no target matched");
            metrics::counter!(metrics_defs::RELAY_REQUESTS.name, "outcome" => "no_target")
                .increment(1);
            self.logger.log(
                inbound,
                "None",
                LogStatus::Code(500),
                Some(message.as_bytes()),
            );
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
                &message,
            );
        };

        let outbound = match build_outbound(inbound, target) {
            Ok(outbound) => outbound,
            Err(e) => {
                tracing::error!(target = %target.name, error = %e, "could not build outbound request");
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error",
                    &e.to_string(),
                );
            }
        };

        tracing::info!(target = %target.name, url = %outbound.url, "proxying request");
        let started = Instant::now();
        let result = self
            .client
            .request(inbound.method.clone(), outbound.url.as_str())
            .headers(outbound.headers)
            .body(inbound.body.clone())
            .timeout(self.timeout)
            .send()
            .await;
        metrics::histogram!(metrics_defs::UPSTREAM_DURATION.name)
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(upstream) => {
                if target.streaming.wants_streaming(&inbound.body) {
                    self.relay_streamed(inbound, target, upstream)
                } else {
                    self.relay_buffered(inbound, target, upstream).await
                }
            }
            Err(e) => {
                let err = if e.is_timeout() {
                    RelayError::UpstreamTimeout(target.name.clone())
                } else {
                    RelayError::UpstreamRequestFailed(target.name.clone(), e.to_string())
                };
                self.upstream_failure(inbound, target, err)
            }
        }
    }

    /// Buffered path: the whole upstream body lands in memory before the
    /// first byte goes back to the caller.
    async fn relay_buffered(
        &self,
        inbound: &InboundRequest,
        target: &Target,
        upstream: reqwest::Response,
    ) -> Response<RelayBody> {
        let status = upstream.status();
        let version = upstream.version();
        let mut headers = upstream.headers().clone();

        let body = match upstream.bytes().await {
            Ok(body) => body,
            Err(e) => {
                let err = RelayError::UpstreamBodyError(e.to_string());
                return self.upstream_failure(inbound, target, err);
            }
        };

        tracing::info!(
            target = %target.name,
            status = %status,
            bytes = body.len(),
            "relaying buffered response"
        );
        metrics::counter!(metrics_defs::RELAY_REQUESTS.name, "outcome" => "buffered").increment(1);

        // Non-success responses are relayed verbatim but leave a record.
        if status != StatusCode::OK {
            self.logger.log(
                inbound,
                &target.name,
                LogStatus::Code(status.as_u16()),
                Some(body.as_ref()),
            );
        }

        // The buffered body is re-framed: transport headers from the
        // upstream hop no longer describe it.
        filter_hop_by_hop(&mut headers, version);
        headers.remove(CONTENT_ENCODING);
        headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));

        let mut response = Response::new(Full::new(body).map_err(|e| match e {}).boxed());
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }

    /// Streaming path: respond immediately with the upstream status and
    /// content type, then forward chunks as they arrive.
    fn relay_streamed(
        &self,
        inbound: &InboundRequest,
        target: &Target,
        upstream: reqwest::Response,
    ) -> Response<RelayBody> {
        let status = upstream.status();
        let content_type = upstream
            .headers()
            .get(CONTENT_TYPE)
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static("application/json"));

        tracing::info!(target = %target.name, status = %status, "relaying streamed response");
        metrics::counter!(metrics_defs::RELAY_REQUESTS.name, "outcome" => "streamed").increment(1);

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let logger = self.logger.clone();
        let record = inbound.clone();
        let target_name = target.name.clone();
        tokio::spawn(async move {
            forward_stream(upstream, tx, logger, record, target_name).await;
        });

        let mut response = Response::new(ChannelBody::new(rx).boxed());
        *response.status_mut() = status;
        response.headers_mut().insert(CONTENT_TYPE, content_type);
        response
    }

    fn upstream_failure(
        &self,
        inbound: &InboundRequest,
        target: &Target,
        err: RelayError,
    ) -> Response<RelayBody> {
        let description = err.to_string();
        tracing::error!(target = %target.name, error = %description, "upstream request failed");
        metrics::counter!(metrics_defs::RELAY_REQUESTS.name, "outcome" => "upstream_error")
            .increment(1);
        metrics::counter!(metrics_defs::UPSTREAM_FAILURES.name, "target" => target.name.clone())
            .increment(1);
        self.logger.log(
            inbound,
            &target.name,
            LogStatus::Code(502),
            Some(description.as_bytes()),
        );
        error_response(StatusCode::BAD_GATEWAY, "Bad Gateway", &description)
    }
}

/// Pulls upstream chunks and feeds them to the caller through the channel.
///
/// Only the most recent chunk is kept for the error record; streamed error
/// bodies are not accumulated. The record is written before the channel
/// closes, so a caller that saw the body end can rely on the log being
/// there.
async fn forward_stream(
    mut upstream: reqwest::Response,
    tx: mpsc::Sender<Result<Frame<Bytes>, RelayError>>,
    logger: Arc<AccessLogger>,
    inbound: InboundRequest,
    target_name: String,
) {
    let status = upstream.status();
    let mut last_chunk: Option<Bytes> = None;

    loop {
        match upstream.chunk().await {
            Ok(Some(chunk)) => {
                last_chunk = Some(chunk.clone());
                if tx.send(Ok(Frame::data(chunk))).await.is_err() {
                    // Caller went away; dropping the response aborts the
                    // upstream transfer.
                    tracing::debug!(target = %target_name, "caller disconnected mid-stream");
                    return;
                }
            }
            Ok(None) => break,
            Err(e) => {
                let err = RelayError::UpstreamBodyError(e.to_string());
                tracing::error!(target = %target_name, error = %err, "upstream stream failed");
                metrics::counter!(metrics_defs::UPSTREAM_FAILURES.name, "target" => target_name.clone())
                    .increment(1);
                logger.log(
                    &inbound,
                    &target_name,
                    LogStatus::Code(502),
                    Some(err.to_string().as_bytes()),
                );
                let _ = tx.send(Err(err)).await;
                return;
            }
        }
    }

    if status != StatusCode::OK {
        logger.log(
            &inbound,
            &target_name,
            LogStatus::Code(status.as_u16()),
            last_chunk.as_deref(),
        );
    }
}

/// Synthesizes the JSON error responses the relay owes the caller when no
/// upstream response exists.
fn error_response(status: StatusCode, error: &str, message: &str) -> Response<RelayBody> {
    let body = serde_json::json!({ "error": error, "message": message });
    let mut response = Response::new(
        Full::new(Bytes::from(body.to_string()))
            .map_err(|e| match e {})
            .boxed(),
    );
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
