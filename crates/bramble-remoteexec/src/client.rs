use std::marker::PhantomData;
use std::sync::Arc;

use bramble_crypto::{
    action_digest, derive_execution_keys, marshal_public_key, AeadKey, ExecutionKeys, Nonce,
    PrivateKey, PublicKey,
};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::codec::ExecutionCodec;
use crate::config::ClientConfig;
use crate::envelope::{ActionMessage, AnyEnvelope};
use crate::error::{ExecutionError, ExecutionResult};
use crate::message::{ExecuteRequest, ExecuteResponse, SealedEvent};
use crate::transport::{ExecutionTransport, ResponseStream};

/// Submits encrypted actions to remote workers.
pub struct Client {
    transport: Arc<dyn ExecutionTransport>,
    private_key: PrivateKey,
    certificate_chain: Vec<Vec<u8>>,
    codec: ExecutionCodec,
}

impl Client {
    pub fn new(
        transport: Arc<dyn ExecutionTransport>,
        private_key: PrivateKey,
        certificate_chain: Vec<Vec<u8>>,
    ) -> Self {
        Self {
            transport,
            private_key,
            certificate_chain,
            codec: ExecutionCodec::default(),
        }
    }

    pub fn from_config(config: &ClientConfig, transport: Arc<dyn ExecutionTransport>) -> ExecutionResult<Self> {
        config.validate()?;
        let (private_key, certificate_chain) = config.load_credentials()?;
        Ok(Self::new(transport, private_key, certificate_chain)
            .with_codec(ExecutionCodec::new(config.max_frame_size)))
    }

    pub fn with_codec(mut self, codec: ExecutionCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn public_key(&self) -> PublicKey {
        self.private_key.public_key()
    }

    /// Encrypt `action` for the worker owning `worker_key` and start
    /// executing it.
    ///
    /// `additional_data` is authenticated together with the action but sent
    /// in the clear. Failures before the call is made are reported as
    /// [`Code::InvalidArgument`](crate::Code::InvalidArgument).
    pub async fn run_action<A, E, R>(
        &self,
        worker_key: &PublicKey,
        action: &A,
        additional_data: &[u8],
    ) -> ExecutionResult<Execution<E, R>>
    where
        A: ActionMessage,
        E: DeserializeOwned,
        R: DeserializeOwned,
    {
        let platform_pkix_public_key = marshal_public_key(worker_key).map_err(|e| {
            ExecutionError::InvalidArgument(format!("failed to marshal worker public key: {e}"))
        })?;
        let ExecutionKeys {
            action: action_key,
            event,
            completion,
        } = derive_execution_keys(&self.private_key, worker_key);

        let plaintext = AnyEnvelope::pack(action)?.to_bytes()?;
        let nonce = Nonce::zero();
        let action_ciphertext = action_key
            .seal(&nonce, &plaintext, additional_data)
            .map_err(|e| ExecutionError::InvalidArgument(format!("failed to encrypt action: {e}")))?;
        let digest = action_digest(&action_ciphertext);

        let request = ExecuteRequest {
            platform_pkix_public_key,
            client_certificate_chain: self.certificate_chain.clone(),
            nonce: nonce.as_bytes().to_vec(),
            additional_data: additional_data.to_vec(),
            action_ciphertext,
        };
        let size = self.codec.check_size(&request)?;
        debug!(type_url = A::TYPE_URL, size, "submitting action");

        let stream = self.transport.execute(request).await?;
        Ok(Execution {
            stream: Some(stream),
            event_key: event,
            completion_key: completion,
            digest,
            state: State::Streaming,
            error_reported: false,
            _event: PhantomData,
        })
    }
}

enum State<R> {
    Streaming,
    Completed(R),
    Failed(ExecutionError),
}

/// A running action: a sequence of progress events of type `E` followed by
/// one result of type `R`.
///
/// Call [`next_event`](Self::next_event) until it returns `Ok(None)`, then
/// [`finish`](Self::finish) for the result. Dropping an `Execution` cancels
/// the underlying stream; [`close`](Self::close) drains it instead.
pub struct Execution<E, R> {
    stream: Option<ResponseStream>,
    event_key: AeadKey,
    completion_key: AeadKey,
    digest: [u8; 32],
    state: State<R>,
    error_reported: bool,
    _event: PhantomData<fn() -> E>,
}

impl<E: DeserializeOwned, R: DeserializeOwned> Execution<E, R> {
    /// The next progress event, in emission order.
    ///
    /// Returns `Ok(None)` once the completion has arrived. A failure is
    /// returned once, after which the sequence is exhausted; `finish`
    /// reports it again.
    pub async fn next_event(&mut self) -> ExecutionResult<Option<E>> {
        while matches!(self.state, State::Streaming) {
            match self.receive().await {
                Ok(Some(event)) => return Ok(Some(event)),
                Ok(None) => {}
                Err(e) => self.fail(e),
            }
        }
        match &self.state {
            State::Failed(e) if !self.error_reported => {
                self.error_reported = true;
                Err(e.clone())
            }
            _ => Ok(None),
        }
    }

    /// Wait for the result, discarding events not yet consumed.
    pub async fn finish(mut self) -> ExecutionResult<R> {
        while matches!(self.state, State::Streaming) {
            if let Err(e) = self.receive().await {
                self.fail(e);
            }
        }
        let discarded = self.drain().await;
        if discarded > 0 {
            warn!(discarded, "discarded frames received after completion");
        }
        match self.state {
            State::Completed(result) => Ok(result),
            State::Failed(e) => Err(e),
            State::Streaming => Err(ExecutionError::StreamClosed),
        }
    }

    /// Stop consuming events and drain whatever the worker still sends.
    pub async fn close(mut self) {
        let streaming = matches!(self.state, State::Streaming);
        let discarded = self.drain().await;
        if streaming {
            warn!(discarded, "closed execution before completion");
        } else if discarded > 0 {
            warn!(discarded, "discarded frames received after completion");
        }
    }

    pub fn is_done(&self) -> bool {
        !matches!(self.state, State::Streaming)
    }

    async fn receive(&mut self) -> ExecutionResult<Option<E>> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(ExecutionError::StreamClosed);
        };
        let frame = stream.next().await;
        match frame {
            None => Err(ExecutionError::StreamClosed),
            Some(Err(e)) => Err(e),
            Some(Ok(ExecuteResponse::Executing { last_event })) => {
                debug!(has_event = last_event.is_some(), "received executing frame");
                match last_event {
                    Some(sealed) => open_sealed(&self.event_key, &self.digest, "event", &sealed).map(Some),
                    None => Ok(None),
                }
            }
            Some(Ok(ExecuteResponse::Completed { completion_event })) => {
                debug!(has_event = completion_event.is_some(), "received completed frame");
                let sealed = completion_event.ok_or(ExecutionError::MissingCompletion)?;
                let result = open_sealed(&self.completion_key, &self.digest, "completion event", &sealed)?;
                self.state = State::Completed(result);
                Ok(None)
            }
        }
    }

    fn fail(&mut self, error: ExecutionError) {
        debug!(error = %error, code = %error.code(), "execution failed");
        self.stream = None;
        self.state = State::Failed(error);
    }

    async fn drain(&mut self) -> usize {
        let Some(mut stream) = self.stream.take() else {
            return 0;
        };
        let mut discarded = 0;
        while let Some(frame) = stream.next().await {
            discarded += 1;
            if frame.is_err() {
                break;
            }
        }
        discarded
    }
}

fn open_sealed<T: DeserializeOwned>(
    key: &AeadKey,
    digest: &[u8; 32],
    what: &'static str,
    sealed: &SealedEvent,
) -> ExecutionResult<T> {
    let nonce = Nonce::from_slice(&sealed.nonce).map_err(|e| ExecutionError::Decrypt {
        what,
        reason: e.to_string(),
    })?;
    let plaintext = key
        .open(&nonce, &sealed.ciphertext, digest)
        .map_err(|e| ExecutionError::Decrypt {
            what,
            reason: e.to_string(),
        })?;
    bincode::deserialize(&plaintext).map_err(|e| ExecutionError::Unmarshal {
        what,
        reason: e.to_string(),
    })
}
