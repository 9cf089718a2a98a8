use crate::error::{CryptoError, CryptoResult};

const CERTIFICATE_TAG: &str = "CERTIFICATE";

/// Decode a concatenated PEM blob into the DER bytes of each certificate.
///
/// Every block must be of type `CERTIFICATE`; any other block type (private
/// keys in particular) is rejected rather than skipped.
pub fn parse_certificate_chain(data: &[u8]) -> CryptoResult<Vec<Vec<u8>>> {
    let blocks = ::pem::parse_many(data).map_err(|e| CryptoError::InvalidPem(e.to_string()))?;
    blocks
        .into_iter()
        .map(|block| {
            if block.tag() != CERTIFICATE_TAG {
                return Err(CryptoError::UnexpectedPemBlock(block.tag().to_string()));
            }
            Ok(block.into_contents())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(tag: &str, contents: &[u8]) -> String {
        ::pem::encode(&::pem::Pem::new(tag, contents.to_vec()))
    }

    #[test]
    fn parses_chain_in_order() {
        let data = format!(
            "{}{}",
            block("CERTIFICATE", b"leaf"),
            block("CERTIFICATE", b"intermediate")
        );
        let chain = parse_certificate_chain(data.as_bytes()).unwrap();
        assert_eq!(chain, vec![b"leaf".to_vec(), b"intermediate".to_vec()]);
    }

    #[test]
    fn rejects_non_certificate_blocks() {
        let data = format!(
            "{}{}",
            block("CERTIFICATE", b"leaf"),
            block("PRIVATE KEY", b"secret")
        );
        let err = parse_certificate_chain(data.as_bytes()).unwrap_err();
        assert_eq!(err, CryptoError::UnexpectedPemBlock("PRIVATE KEY".into()));
    }

    #[test]
    fn empty_input_is_empty_chain() {
        assert!(parse_certificate_chain(b"").unwrap().is_empty());
    }
}
