//! The worker side of an execution: authenticate the client, open the
//! action and seal the events streamed back for it.

use std::collections::HashMap;
use std::sync::Arc;

use bramble_crypto::{
    action_digest, derive_execution_keys, marshal_public_key, random_nonce, AeadKey,
    ExecutionKeys, Nonce, PrivateKey, PublicKey,
};
use serde::Serialize;
use tracing::debug;

use crate::envelope::{ActionMessage, AnyEnvelope};
use crate::error::{ExecutionError, ExecutionResult};
use crate::message::{ExecuteRequest, ExecuteResponse, SealedEvent};

/// Maps a presented certificate chain to the client's EC public key.
pub trait ClientVerifier: Send + Sync {
    fn verify_client(&self, certificate_chain: &[Vec<u8>]) -> ExecutionResult<PublicKey>;
}

/// Accepts clients whose leaf certificate was registered up front.
#[derive(Default)]
pub struct PinnedClientKeys {
    keys: HashMap<Vec<u8>, PublicKey>,
}

impl PinnedClientKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pin(&mut self, leaf_certificate: Vec<u8>, key: PublicKey) {
        self.keys.insert(leaf_certificate, key);
    }
}

impl ClientVerifier for PinnedClientKeys {
    fn verify_client(&self, certificate_chain: &[Vec<u8>]) -> ExecutionResult<PublicKey> {
        let leaf = certificate_chain.first().ok_or_else(|| {
            ExecutionError::InvalidArgument("empty client certificate chain".into())
        })?;
        self.keys
            .get(leaf)
            .cloned()
            .ok_or_else(|| ExecutionError::InvalidArgument("unknown client certificate".into()))
    }
}

pub struct Worker {
    private_key: PrivateKey,
    public_key_der: Vec<u8>,
    verifier: Arc<dyn ClientVerifier>,
}

impl Worker {
    pub fn new(private_key: PrivateKey, verifier: Arc<dyn ClientVerifier>) -> ExecutionResult<Self> {
        let public_key_der = marshal_public_key(&private_key.public_key())
            .map_err(|e| ExecutionError::InvalidArgument(e.to_string()))?;
        Ok(Self {
            private_key,
            public_key_der,
            verifier,
        })
    }

    /// The key clients encrypt actions for.
    pub fn public_key(&self) -> PublicKey {
        self.private_key.public_key()
    }

    /// Authenticate and decrypt an action of type `A`.
    ///
    /// Requests addressed to a different worker key, from unknown clients,
    /// or carrying another action type are rejected with
    /// [`Code::InvalidArgument`](crate::Code::InvalidArgument).
    pub fn accept<A: ActionMessage>(
        &self,
        request: &ExecuteRequest,
    ) -> ExecutionResult<(WorkerSession, A)> {
        if request.platform_pkix_public_key != self.public_key_der {
            return Err(ExecutionError::InvalidArgument(
                "action was encrypted for a different worker key".into(),
            ));
        }
        let client_key = self.verifier.verify_client(&request.client_certificate_chain)?;
        let ExecutionKeys {
            action,
            event,
            completion,
        } = derive_execution_keys(&self.private_key, &client_key);

        let nonce = Nonce::from_slice(&request.nonce)
            .map_err(|_| ExecutionError::InvalidArgument("malformed action nonce".into()))?;
        if nonce != Nonce::zero() {
            return Err(ExecutionError::InvalidArgument(
                "action nonce must be all zeroes".into(),
            ));
        }
        let plaintext = action
            .open(&nonce, &request.action_ciphertext, &request.additional_data)
            .map_err(|e| ExecutionError::InvalidArgument(format!("failed to decrypt action: {e}")))?;
        let envelope = AnyEnvelope::from_bytes(&plaintext)?;
        let action: A = envelope.unpack()?;

        debug!(
            type_url = %envelope.type_url,
            size = request.action_ciphertext.len(),
            "accepted action"
        );
        let session = WorkerSession {
            event_key: event,
            completion_key: completion,
            digest: action_digest(&request.action_ciphertext),
        };
        Ok((session, action))
    }
}

/// Seals the responses of one accepted action.
#[derive(Debug)]
pub struct WorkerSession {
    event_key: AeadKey,
    completion_key: AeadKey,
    digest: [u8; 32],
}

impl WorkerSession {
    pub fn executing<E: Serialize>(&self, event: &E) -> ExecutionResult<ExecuteResponse> {
        Ok(ExecuteResponse::Executing {
            last_event: Some(self.seal(&self.event_key, "event", event)?),
        })
    }

    pub fn completed<R: Serialize>(&self, result: &R) -> ExecutionResult<ExecuteResponse> {
        Ok(ExecuteResponse::Completed {
            completion_event: Some(self.seal(&self.completion_key, "completion event", result)?),
        })
    }

    fn seal<T: Serialize>(&self, key: &AeadKey, what: &str, payload: &T) -> ExecutionResult<SealedEvent> {
        let plaintext = bincode::serialize(payload)
            .map_err(|e| ExecutionError::InvalidArgument(format!("failed to marshal {what}: {e}")))?;
        let nonce = random_nonce();
        let ciphertext = key
            .seal(&nonce, &plaintext, &self.digest)
            .map_err(|e| ExecutionError::InvalidArgument(format!("failed to encrypt {what}: {e}")))?;
        Ok(SealedEvent {
            nonce: nonce.as_bytes().to_vec(),
            ciphertext,
        })
    }
}
