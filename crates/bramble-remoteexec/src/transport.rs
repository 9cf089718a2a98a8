use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc;
use tracing::debug;

use crate::codec::ExecutionCodec;
use crate::error::{ExecutionError, ExecutionResult};
use crate::message::{ExecuteRequest, ExecuteResponse, Frame};

/// Responses of one execution, in the order the worker emitted them.
pub type ResponseStream = BoxStream<'static, ExecutionResult<ExecuteResponse>>;

/// Carries execute requests to a scheduler or worker.
///
/// Dropping the returned stream cancels the call.
#[async_trait]
pub trait ExecutionTransport: Send + Sync {
    async fn execute(&self, request: ExecuteRequest) -> ExecutionResult<ResponseStream>;
}

/// Serves execute requests on the far side of a [`LocalTransport`].
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    /// Handle one request, streaming responses through `responses`. An
    /// error is delivered to the client as the stream's final item.
    async fn handle(&self, request: ExecuteRequest, responses: ResponseSender) -> ExecutionResult<()>;
}

/// Sending half of a response stream.
#[derive(Clone)]
pub struct ResponseSender {
    tx: mpsc::Sender<ExecutionResult<Vec<u8>>>,
    codec: ExecutionCodec,
}

impl ResponseSender {
    /// Fails with [`ExecutionError::StreamClosed`] once the client has gone
    /// away.
    pub async fn send(&self, response: ExecuteResponse) -> ExecutionResult<()> {
        let frame = self.codec.encode(&Frame::Response(response))?;
        self.tx
            .send(Ok(frame))
            .await
            .map_err(|_| ExecutionError::StreamClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// In-process transport. Every frame goes through the codec, and each
/// request is handled on its own tokio task.
pub struct LocalTransport<H> {
    handler: Arc<H>,
    codec: ExecutionCodec,
    buffer: usize,
}

impl<H: RequestHandler> LocalTransport<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
            codec: ExecutionCodec::default(),
            buffer: 16,
        }
    }

    /// Number of encoded frames that may be in flight before the handler
    /// blocks.
    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    pub fn with_codec(mut self, codec: ExecutionCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }
}

#[async_trait]
impl<H: RequestHandler> ExecutionTransport for LocalTransport<H> {
    async fn execute(&self, request: ExecuteRequest) -> ExecutionResult<ResponseStream> {
        let encoded = self.codec.encode(&Frame::Request(request))?;
        let request = match self.codec.decode(&encoded)? {
            (Frame::Request(request), _) => request,
            (other, _) => {
                return Err(ExecutionError::Framing(format!(
                    "expected a request, got {}",
                    other.type_name()
                )))
            }
        };

        let (tx, rx) = mpsc::channel(self.buffer);
        let sender = ResponseSender {
            tx: tx.clone(),
            codec: self.codec,
        };
        let handler = Arc::clone(&self.handler);
        tokio::spawn(async move {
            if let Err(e) = handler.handle(request, sender).await {
                debug!(error = %e, "execution handler failed");
                let _ = tx.send(Err(e)).await;
            }
        });

        let codec = self.codec;
        let responses = stream::unfold(rx, move |mut rx| async move {
            let item = rx.recv().await?;
            let response = item.and_then(|bytes| decode_response(&codec, &bytes));
            Some((response, rx))
        });
        Ok(responses.boxed())
    }
}

fn decode_response(codec: &ExecutionCodec, bytes: &[u8]) -> ExecutionResult<ExecuteResponse> {
    match codec.decode(bytes)? {
        (Frame::Response(response), _) => Ok(response),
        (other, _) => Err(ExecutionError::Framing(format!(
            "expected a response, got {}",
            other.type_name()
        ))),
    }
}
