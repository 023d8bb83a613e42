//! Certificate authority primitives
//!
//! [`CertAuthority`] is the narrow signing capability the bootstrap relies on:
//! given an optional issuer and a profile, produce a fresh key and certificate.
//! [`RsaAuthority`] is the production implementation backed by rcgen with
//! RSA-2048 keys.

use rcgen::{Issuer, KeyPair, PKCS_RSA_SHA256, PKCS_RSA_SHA384, PKCS_RSA_SHA512};
use tracing::debug;

use crate::error::{PkiError, Result};
use crate::profile::CertProfile;

/// A private key together with the certificate it backs
///
/// CA pairs are borrowed by everything they sign; nothing copies the key.
pub struct SigningPair {
    key: KeyPair,
    cert_pem: String,
}

impl SigningPair {
    /// Wrap an already generated key and its certificate
    pub fn new(key: KeyPair, cert_pem: String) -> Self {
        Self { key, cert_pem }
    }

    /// The private key
    pub fn key(&self) -> &KeyPair {
        &self.key
    }

    /// The certificate in PEM format
    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    /// The private key in PEM format
    pub fn key_pem(&self) -> String {
        self.key.serialize_pem()
    }
}

impl std::fmt::Debug for SigningPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningPair")
            .field("cert_pem", &self.cert_pem)
            .finish_non_exhaustive()
    }
}

/// Whether a key is an RSA key usable for signing the hierarchy
pub fn is_rsa_key(key: &KeyPair) -> bool {
    [&PKCS_RSA_SHA256, &PKCS_RSA_SHA384, &PKCS_RSA_SHA512]
        .into_iter()
        .any(|alg| key.is_compatible(alg))
}

/// Signing capability used by the bootstrap
pub trait CertAuthority: Send + Sync {
    /// Generate a standalone private key
    fn generate_key(&self) -> Result<KeyPair>;

    /// Mint a new key and certificate for `profile`
    ///
    /// With `issuer = None` the certificate is self-signed, which is only
    /// allowed for CA profiles.
    fn sign(&self, issuer: Option<&SigningPair>, profile: &CertProfile) -> Result<SigningPair>;
}

/// rcgen-backed authority producing RSA-2048 keys
#[derive(Debug, Default, Clone, Copy)]
pub struct RsaAuthority;

impl CertAuthority for RsaAuthority {
    fn generate_key(&self) -> Result<KeyPair> {
        KeyPair::generate_for(&PKCS_RSA_SHA256)
            .map_err(|e| PkiError::KeyGeneration(format!("failed to generate RSA key: {}", e)))
    }

    fn sign(&self, issuer: Option<&SigningPair>, profile: &CertProfile) -> Result<SigningPair> {
        let params = profile.to_params()?;
        let key = self.generate_key()?;

        let cert = match issuer {
            Some(issuer) => {
                let ca = Issuer::from_ca_cert_pem(issuer.cert_pem(), issuer.key())
                    .map_err(|e| PkiError::Parse(format!("failed to load issuer: {}", e)))?;
                params.signed_by(&key, &ca).map_err(|e| {
                    PkiError::CertificateGeneration(format!(
                        "failed to sign {}: {}",
                        profile.common_name, e
                    ))
                })?
            }
            None => {
                if !profile.is_ca {
                    return Err(PkiError::CertificateGeneration(format!(
                        "refusing to self-sign non-CA certificate {}",
                        profile.common_name
                    )));
                }
                params.self_signed(&key).map_err(|e| {
                    PkiError::CertificateGeneration(format!(
                        "failed to self-sign {}: {}",
                        profile.common_name, e
                    ))
                })?
            }
        };

        debug!(common_name = %profile.common_name, is_ca = profile.is_ca, "Minted certificate");
        Ok(SigningPair::new(key, cert.pem()))
    }
}
