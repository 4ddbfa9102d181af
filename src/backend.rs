pub mod appwrite;
#[cfg(test)]
pub mod mock;
pub mod query;
pub mod structs;

use crate::twoface::Fallible;
use async_trait::async_trait;
use query::Query;
use serde_json::Value;
use structs::{
    Account, Collection, Credentials, Document, DocumentList, FileUpload, NewAccount, Session,
    SessionSecret, StoredFile,
};
use url::Url;

#[async_trait(?Send)]
/// The hosted platform: accounts and sessions, a document database, and file storage.
/// Every method is one remote call.
pub trait Backend: Clone {
    async fn create_account(&self, new_account: NewAccount) -> Fallible<Account>;
    async fn create_email_session(&self, credentials: &Credentials) -> Fallible<Session>;
    async fn delete_session(&self, secret: &SessionSecret) -> Fallible<()>;
    async fn get_account(&self, secret: &SessionSecret) -> Fallible<Account>;

    async fn create_document(
        &self,
        collection: Collection,
        document_id: String,
        data: Value,
    ) -> Fallible<Document>;
    async fn get_document(&self, collection: Collection, document_id: &str) -> Fallible<Document>;
    async fn list_documents(
        &self,
        collection: Collection,
        queries: &[Query],
    ) -> Fallible<DocumentList>;
    /// Overwrites only the attributes present in `data`.
    async fn update_document(
        &self,
        collection: Collection,
        document_id: &str,
        data: Value,
    ) -> Fallible<Document>;
    async fn delete_document(&self, collection: Collection, document_id: &str) -> Fallible<()>;

    async fn create_file(&self, upload: FileUpload) -> Fallible<StoredFile>;
    async fn delete_file(&self, file_id: &str) -> Fallible<()>;
    fn file_preview_url(&self, file_id: &str) -> Fallible<Url>;
    fn avatar_initials_url(&self, name: &str) -> Fallible<Url>;
}

/// Names each backend operation, for metrics, logs and fault injection in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    CreateAccount,
    CreateSession,
    DeleteSession,
    GetAccount,
    CreateDocument(Collection),
    GetDocument(Collection),
    ListDocuments(Collection),
    UpdateDocument(Collection),
    DeleteDocument(Collection),
    CreateFile,
    DeleteFile,
    FilePreview,
    AvatarInitials,
}

impl Op {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateAccount => "create_account",
            Self::CreateSession => "create_session",
            Self::DeleteSession => "delete_session",
            Self::GetAccount => "get_account",
            Self::CreateDocument(_) => "create_document",
            Self::GetDocument(_) => "get_document",
            Self::ListDocuments(_) => "list_documents",
            Self::UpdateDocument(_) => "update_document",
            Self::DeleteDocument(_) => "delete_document",
            Self::CreateFile => "create_file",
            Self::DeleteFile => "delete_file",
            Self::FilePreview => "file_preview",
            Self::AvatarInitials => "avatar_initials",
        }
    }

    pub fn collection(self) -> Option<Collection> {
        match self {
            Self::CreateDocument(c)
            | Self::GetDocument(c)
            | Self::ListDocuments(c)
            | Self::UpdateDocument(c)
            | Self::DeleteDocument(c) => Some(c),
            _ => None,
        }
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.collection() {
            Some(c) => write!(f, "{}({})", self.as_str(), c.as_str()),
            None => write!(f, "{}", self.as_str()),
        }
    }
}

/// A fresh document or file id, in the platform's allowed alphabet (32 lowercase hex chars).
pub fn unique_id() -> String {
    uuid::Uuid::new_v4().to_simple().to_string()
}
