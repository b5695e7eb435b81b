//! The credential a device authenticates with.
//!
//! Exactly one variant is chosen at construction and it never changes for
//! the lifetime of the authenticator. Dispatch on `Credential` must stay
//! exhaustive — adding a new credential type is a deliberate, reviewed
//! change to every match site, not an accident hidden behind a wildcard arm.

use serde::{Deserialize, Serialize};

/// Which kind of credential an authenticator was built with.
///
/// Exposed separately from [`Credential`] so `get_credential_type` can
/// answer without handing out the secret material itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialType {
    /// No credential configured yet.
    None,
    /// A long-lived shared device key, used to mint short-lived SAS tokens.
    DeviceKey,
    /// A pre-minted SAS token supplied directly by the caller.
    DeviceSasToken,
    /// An X.509 client certificate, authenticated at the TLS layer.
    X509,
}

/// The device's authentication material.
///
/// `None` only exists transiently inside the builder that validates
/// [`crate::authenticator::AuthenticatorConfig`]; a successfully constructed
/// `Authenticator` always holds one of the other three variants.
#[derive(Debug, Clone)]
pub enum Credential {
    /// Not yet configured.
    None,
    /// Shared device key used to mint SAS tokens locally.
    DeviceKey(String),
    /// A caller-supplied SAS token, forwarded to CBS verbatim.
    DeviceSasToken(String),
    /// X.509 client certificate and private key, in PEM or DER form as
    /// supplied by the caller. This core never inspects their contents.
    X509 {
        certificate: String,
        private_key: String,
    },
}

impl Credential {
    pub fn credential_type(&self) -> CredentialType {
        match self {
            Credential::None => CredentialType::None,
            Credential::DeviceKey(_) => CredentialType::DeviceKey,
            Credential::DeviceSasToken(_) => CredentialType::DeviceSasToken,
            Credential::X509 { .. } => CredentialType::X509,
        }
    }

    /// Whether this credential type interacts with the CBS bridge at all.
    pub fn uses_cbs(&self) -> bool {
        matches!(self, Credential::DeviceKey(_) | Credential::DeviceSasToken(_))
    }
}
