//! # Secrets
//!
//! Credentials encrypted by the client against a workspace public key. The
//! core never sees plaintext; it stores the ciphertext and hands out
//! redacted views.

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::ids::LogicalId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SecretObjectType {
    Credential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SecretKind {
    DockerHub,
    AwsAccessKey,
    HelmRepo,
    AzurePrincipal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SecretVersion {
    #[default]
    V1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SecretAlgorithm {
    #[default]
    Sealedbox,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Secret {
    pub name: String,

    pub object_type: SecretObjectType,

    pub kind: SecretKind,

    /// Workspace key pair the ciphertext was sealed against
    pub key_pair_id: LogicalId,

    /// Base64 ciphertext
    pub crypted: String,

    #[serde(default)]
    pub version: SecretVersion,

    #[serde(default)]
    pub algorithm: SecretAlgorithm,
}

impl Secret {
    /// Whether `crypted` is valid base64 and not empty.
    pub fn has_valid_ciphertext(&self) -> bool {
        base64::engine::general_purpose::STANDARD
            .decode(&self.crypted)
            .map(|bytes| !bytes.is_empty())
            .unwrap_or(false)
    }

    pub fn redacted(&self, id: LogicalId) -> RedactedSecret {
        RedactedSecret {
            id,
            name: self.name.clone(),
            object_type: self.object_type,
            kind: self.kind,
        }
    }
}

/// A secret with its ciphertext removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedactedSecret {
    pub id: LogicalId,

    pub name: String,

    pub object_type: SecretObjectType,

    pub kind: SecretKind,
}
