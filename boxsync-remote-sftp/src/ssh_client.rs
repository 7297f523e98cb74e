use russh::client::Handler;
use russh::keys::PublicKeyBase64;
use tracing::{info, warn};

/// Minimal russh handler: host key checking only, the sftp subsystem does
/// the rest.
pub(crate) struct Client {
    /// OpenSSH SHA256 fingerprints or raw base64 keys; `None` accepts any
    /// host key (logged, so the operator can pin it afterwards).
    pub allowed_fingerprints: Option<Vec<String>>,
}

impl Handler for Client {
    type Error = anyhow::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        let fp_sha256 = server_public_key
            .fingerprint(russh::keys::HashAlg::Sha256)
            .to_string();
        match &self.allowed_fingerprints {
            Some(allowed) => {
                let key_b64 = server_public_key.public_key_base64();
                let ok = allowed.iter().any(|s| s == &fp_sha256 || s == &key_b64);
                if !ok {
                    warn!("server key {fp_sha256} not in the configured whitelist");
                }
                Ok(ok)
            }
            None => {
                info!("accepting unpinned server key: {fp_sha256}");
                Ok(true)
            }
        }
    }
}
