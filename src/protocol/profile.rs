//! Per-device security profile.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::codec::crypto::{CipherAlgorithm, HmacType};

/// Authentication kind configured for a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Authentication {
    /// Envelopes are accepted without a MAC
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "hmac-md5")]
    HmacMd5,
    #[serde(rename = "hmac-sha1")]
    HmacSha1,
}

impl Authentication {
    /// Checksum digest, or `None` when authentication is off.
    pub fn hmac_type(self) -> Option<HmacType> {
        match self {
            Self::None => None,
            Self::HmacMd5 => Some(HmacType::Md5),
            Self::HmacSha1 => Some(HmacType::Sha1),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::HmacMd5 => "hmac-md5",
            Self::HmacSha1 => "hmac-sha1",
        }
    }
}

impl fmt::Display for Authentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Authentication {
    type Err = ProfileParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "hmac-md5" | "hmac_md5" => Ok(Self::HmacMd5),
            "hmac-sha1" | "hmac_sha1" => Ok(Self::HmacSha1),
            _ => Err(ProfileParseError::Authentication(s.to_string())),
        }
    }
}

/// Payload cipher configured for a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Encryption {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "aes-ctr-128")]
    AesCtr128,
    #[serde(rename = "aes-ctr-256")]
    AesCtr256,
    #[serde(rename = "aes-cbc-128")]
    AesCbc128,
    #[serde(rename = "aes-cbc-256")]
    AesCbc256,
}

impl Encryption {
    /// Cipher algorithm, or `None` for clear payloads.
    pub fn algorithm(self) -> Option<CipherAlgorithm> {
        match self {
            Self::None => None,
            Self::AesCtr128 => Some(CipherAlgorithm::AesCtr128),
            Self::AesCtr256 => Some(CipherAlgorithm::AesCtr256),
            Self::AesCbc128 => Some(CipherAlgorithm::AesCbc128),
            Self::AesCbc256 => Some(CipherAlgorithm::AesCbc256),
        }
    }

    pub fn name(self) -> &'static str {
        match self.algorithm() {
            Some(algorithm) => algorithm.name(),
            None => "none",
        }
    }
}

impl fmt::Display for Encryption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Encryption {
    type Err = ProfileParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "none" | "" => Ok(Self::None),
            "aes-ctr-128" => Ok(Self::AesCtr128),
            "aes-ctr-256" => Ok(Self::AesCtr256),
            "aes-cbc-128" => Ok(Self::AesCbc128),
            "aes-cbc-256" => Ok(Self::AesCbc256),
            _ => Err(ProfileParseError::Encryption(s.to_string())),
        }
    }
}

/// Unrecognized profile name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProfileParseError {
    #[error("unknown authentication: {0}")]
    Authentication(String),
    #[error("unknown encryption: {0}")]
    Encryption(String),
}

/// Security settings of one device, as kept by the security store.
///
/// `shared_key` is the registration password used only to protect password
/// negotiation. `credential` is the working password; while it is blank and
/// authentication is on, the device must negotiate one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityInfo {
    pub comm_id: String,
    #[serde(default)]
    pub authentication: Authentication,
    #[serde(default)]
    pub encryption: Encryption,
    /// Last nonce issued by the server
    #[serde(default)]
    pub nonce: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

/// Nonce given to devices that have not been challenged yet.
pub const INITIAL_NONCE: &str = "000000";

impl SecurityInfo {
    /// Profile for a device that is not secured.
    pub fn unsecured(comm_id: impl Into<String>) -> Self {
        Self {
            comm_id: comm_id.into(),
            authentication: Authentication::None,
            encryption: Encryption::None,
            nonce: INITIAL_NONCE.to_string(),
            shared_key: None,
            credential: None,
        }
    }

    /// Profile for a secured device holding only a registration password.
    ///
    /// The device negotiates its working credential on first contact.
    pub fn registered(
        comm_id: impl Into<String>,
        authentication: Authentication,
        encryption: Encryption,
        shared_key: impl Into<String>,
    ) -> Self {
        Self {
            authentication,
            encryption,
            shared_key: Some(shared_key.into()),
            ..Self::unsecured(comm_id)
        }
    }

    /// Builder setting the working credential directly.
    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    /// Working credential, ignoring blank values.
    pub fn credential(&self) -> Option<&str> {
        self.credential.as_deref().filter(|c| !c.trim().is_empty())
    }

    /// Whether authentication is on but no working credential exists yet.
    pub fn needs_negotiation(&self) -> bool {
        self.authentication != Authentication::None && self.credential().is_none()
    }
}
