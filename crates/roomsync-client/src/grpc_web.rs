//! gRPC-web transport over HTTP.
//!
//! Each call is a POST to `{base_url}/chat.ChatService/{Method}` whose body is
//! one length-prefixed data frame. Responses are a sequence of data frames
//! followed by a trailer frame with the call status. Proxies may also return
//! the status in response headers when there is no body ("trailers-only").

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap};
use roomsync_proto::{FrameDecoder, FrameKind, GrpcWebFrame, Method, Trailers};
use tokio::sync::mpsc;

use crate::{
    config::ClientConfig,
    error::TransportError,
    transport::{Metadata, STREAM_BUFFER, StreamEvent, StreamHandle, Transport},
};

/// Content type for binary gRPC-web.
pub const GRPC_WEB_CONTENT_TYPE: &str = "application/grpc-web+proto";

/// gRPC-web transport backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct GrpcWebTransport {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl GrpcWebTransport {
    /// Build a transport for `config.base_url`.
    ///
    /// # Errors
    ///
    /// - `TransportError::Connection` if the HTTP client cannot be built
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::Connection(format!("failed to build client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.request_timeout,
        })
    }

    /// Server base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send the request and check the HTTP and header-level status.
    async fn post(
        &self,
        method: Method,
        request: Bytes,
        metadata: &Metadata,
    ) -> Result<reqwest::Response, TransportError> {
        let body = GrpcWebFrame::data(request).to_bytes()?;
        let url = format!("{}{}", self.base_url, method.path());

        let mut builder = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, GRPC_WEB_CONTENT_TYPE)
            .header(ACCEPT, GRPC_WEB_CONTENT_TYPE)
            .header("x-grpc-web", "1")
            .body(body);
        for (name, value) in metadata.iter() {
            builder = builder.header(name, value);
        }

        let response = tokio::time::timeout(self.timeout, builder.send())
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(method = %method, status = %status, "HTTP request rejected");
            return Err(TransportError::Connection(format!("HTTP {status}")));
        }

        if let Some(trailers) = header_trailers(response.headers()) {
            check_trailers(trailers)?;
        }

        Ok(response)
    }
}

#[async_trait]
impl Transport for GrpcWebTransport {
    async fn call(
        &self,
        method: Method,
        request: Bytes,
        metadata: &Metadata,
    ) -> Result<Bytes, TransportError> {
        tracing::debug!(method = %method, bytes = request.len(), "unary call");

        let response = self.post(method, request, metadata).await?;
        let body = tokio::time::timeout(self.timeout, response.bytes())
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(|e| TransportError::Stream(e.to_string()))?;

        unary_payload(&body)
    }

    async fn open_stream(
        &self,
        method: Method,
        request: Bytes,
        metadata: &Metadata,
    ) -> Result<StreamHandle, TransportError> {
        tracing::debug!(method = %method, "opening stream");

        let response = self.post(method, request, metadata).await?;
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let task = tokio::spawn(pump_stream(response.bytes_stream(), tx));

        Ok(StreamHandle::new(rx, Some(task.abort_handle())))
    }
}

/// Forward frames from a response body until a terminal event.
async fn pump_stream(
    body: impl Stream<Item = reqwest::Result<Bytes>>,
    tx: mpsc::Sender<StreamEvent>,
) {
    let mut body = std::pin::pin!(body);
    let mut decoder = FrameDecoder::new();
    let mut events = Vec::new();

    while let Some(chunk) = body.next().await {
        let finished = match chunk {
            Ok(chunk) => {
                decoder.push(&chunk);
                drain_stream_frames(&mut decoder, &mut events)
            },
            Err(e) => {
                events.push(StreamEvent::Error(TransportError::Stream(e.to_string())));
                true
            },
        };

        for event in events.drain(..) {
            if tx.send(event).await.is_err() {
                // Receiver dropped
                return;
            }
        }

        if finished {
            return;
        }
    }

    let last = if decoder.buffered() > 0 {
        StreamEvent::Error(TransportError::Stream("stream ended mid-frame".to_string()))
    } else {
        StreamEvent::End
    };
    let _ = tx.send(last).await;
}

/// Move complete frames from `decoder` into `events`.
///
/// Returns true once a terminal event (trailers or a framing error) has been
/// produced.
fn drain_stream_frames(decoder: &mut FrameDecoder, events: &mut Vec<StreamEvent>) -> bool {
    loop {
        match decoder.next_frame() {
            Ok(Some(frame)) => match frame.kind {
                FrameKind::Data => events.push(StreamEvent::Data(frame.payload)),
                FrameKind::Trailer => {
                    let event = match check_trailers(Trailers::parse(&frame.payload)) {
                        Ok(()) => StreamEvent::End,
                        Err(e) => StreamEvent::Error(e),
                    };
                    events.push(event);
                    return true;
                },
            },
            Ok(None) => return false,
            Err(e) => {
                events.push(StreamEvent::Error(e.into()));
                return true;
            },
        }
    }
}

/// Extract the single response message from a unary body.
fn unary_payload(body: &[u8]) -> Result<Bytes, TransportError> {
    let mut decoder = FrameDecoder::new();
    decoder.push(body);

    let mut message = None;
    while let Some(frame) = decoder.next_frame()? {
        match frame.kind {
            FrameKind::Data => {
                message.get_or_insert(frame.payload);
            },
            FrameKind::Trailer => {
                check_trailers(Trailers::parse(&frame.payload))?;
                break;
            },
        }
    }

    if message.is_none() && decoder.buffered() > 0 {
        return Err(TransportError::Protocol("truncated response frame".to_string()));
    }

    message.ok_or_else(|| TransportError::Protocol("response carried no message".to_string()))
}

/// Status from response headers, if the server sent one there.
fn header_trailers(headers: &HeaderMap) -> Option<Trailers> {
    let status = headers.get("grpc-status")?.to_str().ok()?.trim().parse().ok()?;
    let message = headers
        .get("grpc-message")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .filter(|m| !m.is_empty());

    Some(Trailers { status, message })
}

fn check_trailers(trailers: Trailers) -> Result<(), TransportError> {
    if trailers.is_ok() {
        Ok(())
    } else {
        Err(TransportError::Status {
            code: trailers.status,
            message: trailers.message.unwrap_or_default(),
        })
    }
}
