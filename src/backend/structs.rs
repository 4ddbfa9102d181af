//! Types exchanged with the hosted platform, in its wire shape.
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;

/// The collections this app keeps documents in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    Posts,
    Saves,
}

impl Collection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Posts => "posts",
            Self::Saves => "saves",
        }
    }
}

/// A document as the database returns it. System attributes (`$id`, `$createdAt`, ...) sit next to
/// the data attributes.
pub type Document = Map<String, Value>;

/// One page of a document listing. `total` counts every match, not just the returned page.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct DocumentList {
    pub total: u64,
    pub documents: Vec<Document>,
}

/// An auth identity.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Account {
    #[serde(rename = "$id")]
    pub id: String,
    pub name: String,
    pub email: String,
}

/// Body of the create-account call.
#[derive(Serialize, Clone)]
pub struct NewAccount {
    #[serde(rename = "userId")]
    pub id: String,
    pub email: String,
    pub password: String,
    pub name: String,
}

impl fmt::Debug for NewAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewAccount")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("name", &self.name)
            .finish()
    }
}

#[derive(Serialize, Deserialize, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A backend-issued session. The app never looks inside the secret.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Session {
    #[serde(rename = "$id")]
    pub id: String,
    /// The account this session authenticates.
    #[serde(rename = "userId")]
    pub account_id: String,
    pub secret: SessionSecret,
}

/// The credential a session is presented with. Redacted from Debug output.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct SessionSecret(String);

impl SessionSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Hex SHA-256 of the secret, usable as a cache key or log field.
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.0.as_bytes()))
    }
}

impl fmt::Debug for SessionSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionSecret(<redacted>)")
    }
}

/// A file to put in storage.
#[derive(Clone, Debug)]
pub struct FileUpload {
    pub name: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

/// A file that storage accepted.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct StoredFile {
    #[serde(rename = "$id")]
    pub id: String,
    pub name: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    #[serde(rename = "sizeOriginal")]
    pub size: u64,
}
