use std::path::{Path, PathBuf};

use bramble_crypto::{parse_certificate_chain, parse_private_key_pem, PrivateKey};
use serde::{Deserialize, Serialize};

use crate::error::{ExecutionError, ExecutionResult};
use crate::message::MAX_FRAME_SIZE;

/// Remote execution client settings, usually read from TOML.
///
/// ```toml
/// private_key_path = "/etc/bramble/client.key"
/// certificate_chain_path = "/etc/bramble/client.crt"
/// max_frame_size = 4194304
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// PEM file holding the client's EC private key (PKCS#8 or SEC1).
    pub private_key_path: PathBuf,
    /// PEM file holding the client's certificate chain, leaf first.
    pub certificate_chain_path: PathBuf,
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
}

fn default_max_frame_size() -> usize {
    MAX_FRAME_SIZE
}

impl ClientConfig {
    pub fn new(private_key_path: impl Into<PathBuf>, certificate_chain_path: impl Into<PathBuf>) -> Self {
        Self {
            private_key_path: private_key_path.into(),
            certificate_chain_path: certificate_chain_path.into(),
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    pub fn from_toml_str(s: &str) -> ExecutionResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| ExecutionError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> ExecutionResult<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ExecutionError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> ExecutionResult<()> {
        if self.max_frame_size == 0 {
            return Err(ExecutionError::Config("max_frame_size must be positive".into()));
        }
        Ok(())
    }

    /// Read the private key and the DER certificate chain from disk.
    pub fn load_credentials(&self) -> ExecutionResult<(PrivateKey, Vec<Vec<u8>>)> {
        let key_pem = std::fs::read_to_string(&self.private_key_path).map_err(|e| {
            ExecutionError::Config(format!("{}: {e}", self.private_key_path.display()))
        })?;
        let private_key = parse_private_key_pem(&key_pem)
            .map_err(|e| ExecutionError::Config(format!("{}: {e}", self.private_key_path.display())))?;

        let chain_pem = std::fs::read(&self.certificate_chain_path).map_err(|e| {
            ExecutionError::Config(format!("{}: {e}", self.certificate_chain_path.display()))
        })?;
        let chain = parse_certificate_chain(&chain_pem).map_err(|e| {
            ExecutionError::Config(format!("{}: {e}", self.certificate_chain_path.display()))
        })?;
        if chain.is_empty() {
            return Err(ExecutionError::Config(format!(
                "{}: no certificates found",
                self.certificate_chain_path.display()
            )));
        }
        Ok((private_key, chain))
    }
}
