use crate::backend::{
    query::{self, Query, CREATED_AT},
    structs::{
        Account, Collection, Credentials, Document, DocumentList, FileUpload, NewAccount, Session,
        SessionSecret, StoredFile,
    },
    unique_id, Backend, Op,
};
use crate::twoface::{Cause, Fallible, TfError};
use async_trait::async_trait;
use chrono::{offset::Utc, Duration, SecondsFormat};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use url::Url;

/// A mock implementation of backend::Backend, holding everything in memory.
#[derive(Clone, Default, Debug)]
pub struct Client {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default, Debug)]
struct Inner {
    accounts: Vec<(Account, String)>,
    sessions: Vec<Session>,
    documents: HashMap<Collection, Vec<Document>>,
    files: Vec<StoredFile>,
    /// Operations whose next call fails, and how.
    failures: HashMap<Op, Cause>,
    /// Every call, in order.
    calls: Vec<Op>,
    /// Keeps `$createdAt` strictly increasing even within one clock tick.
    ticks: i64,
}

impl Client {
    /// The next call of `op` fails with a server error; later calls succeed again.
    pub fn fail_next(&self, op: Op) {
        self.fail_next_with(op, Cause::ServerError);
    }

    /// The next call of `op` fails with `cause`.
    pub fn fail_next_with(&self, op: Op, cause: Cause) {
        self.inner.lock().unwrap().failures.insert(op, cause);
    }

    pub fn accounts(&self) -> Vec<Account> {
        let inner = self.inner.lock().unwrap();
        inner.accounts.iter().map(|(a, _)| a.clone()).collect()
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.inner.lock().unwrap().sessions.clone()
    }

    pub fn documents(&self, collection: Collection) -> Vec<Document> {
        let inner = self.inner.lock().unwrap();
        inner.documents.get(&collection).cloned().unwrap_or_default()
    }

    pub fn files(&self) -> Vec<StoredFile> {
        self.inner.lock().unwrap().files.clone()
    }

    pub fn calls(&self) -> Vec<Op> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Record the call, and fail it if a failure was queued.
    fn enter(&self, op: Op) -> Fallible<std::sync::MutexGuard<'_, Inner>> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(op);
        if let Some(cause) = inner.failures.remove(&op) {
            return Err(TfError::new(
                format!("injected failure in {}", op),
                cause.into(),
            ));
        }
        Ok(inner)
    }
}

fn error(cause: Cause, internal: String) -> TfError {
    TfError::new(internal, cause.into())
}

fn find_doc<'a>(docs: &'a mut [Document], id: &str) -> Option<&'a mut Document> {
    docs.iter_mut()
        .find(|doc| doc.get("$id").and_then(Value::as_str) == Some(id))
}

#[async_trait(?Send)]
impl Backend for Client {
    async fn create_account(&self, new_account: NewAccount) -> Fallible<Account> {
        let mut inner = self.enter(Op::CreateAccount)?;
        if inner
            .accounts
            .iter()
            .any(|(a, _)| a.email == new_account.email || a.id == new_account.id)
        {
            return Err(error(
                Cause::Conflict,
                format!("account {} already exists", new_account.email),
            ));
        }
        let account = Account {
            id: new_account.id,
            name: new_account.name,
            email: new_account.email,
        };
        inner
            .accounts
            .push((account.clone(), new_account.password));
        Ok(account)
    }

    async fn create_email_session(&self, credentials: &Credentials) -> Fallible<Session> {
        let mut inner = self.enter(Op::CreateSession)?;
        let account = inner
            .accounts
            .iter()
            .find(|(a, password)| a.email == credentials.email && *password == credentials.password)
            .map(|(a, _)| a.clone());
        guard!(let Some(account) = account else {
            return Err(error(Cause::Unauthorized, "bad credentials".to_owned()))
        });
        let session = Session {
            id: unique_id(),
            account_id: account.id,
            secret: SessionSecret::new(unique_id()),
        };
        inner.sessions.push(session.clone());
        Ok(session)
    }

    async fn delete_session(&self, secret: &SessionSecret) -> Fallible<()> {
        let mut inner = self.enter(Op::DeleteSession)?;
        let before = inner.sessions.len();
        inner.sessions.retain(|s| &s.secret != secret);
        if inner.sessions.len() == before {
            return Err(error(Cause::Unauthorized, "no such session".to_owned()));
        }
        Ok(())
    }

    async fn get_account(&self, secret: &SessionSecret) -> Fallible<Account> {
        let inner = self.enter(Op::GetAccount)?;
        let session = inner.sessions.iter().find(|s| &s.secret == secret);
        guard!(let Some(session) = session else {
            return Err(error(Cause::Unauthorized, "no such session".to_owned()))
        });
        inner
            .accounts
            .iter()
            .find(|(a, _)| a.id == session.account_id)
            .map(|(a, _)| a.clone())
            .ok_or_else(|| error(Cause::Unauthorized, "session without account".to_owned()))
    }

    async fn create_document(
        &self,
        collection: Collection,
        document_id: String,
        data: Value,
    ) -> Fallible<Document> {
        let mut inner = self.enter(Op::CreateDocument(collection))?;
        let mut doc = match data {
            Value::Object(map) => map,
            other => {
                return Err(error(
                    Cause::Validation,
                    format!("document data must be an object, got {}", other),
                ))
            }
        };
        inner.ticks += 1;
        let created_at = (Utc::now() + Duration::milliseconds(inner.ticks))
            .to_rfc3339_opts(SecondsFormat::Millis, false);
        let docs = inner.documents.entry(collection).or_default();
        if find_doc(docs, &document_id).is_some() {
            return Err(error(
                Cause::Conflict,
                format!("document {} already exists", document_id),
            ));
        }
        doc.insert("$id".to_owned(), Value::String(document_id));
        doc.insert(CREATED_AT.to_owned(), Value::String(created_at.clone()));
        doc.insert("$updatedAt".to_owned(), Value::String(created_at));
        doc.insert(
            "$collectionId".to_owned(),
            Value::String(collection.as_str().to_owned()),
        );
        docs.push(doc.clone());
        Ok(doc)
    }

    async fn get_document(&self, collection: Collection, document_id: &str) -> Fallible<Document> {
        let mut inner = self.enter(Op::GetDocument(collection))?;
        let docs = inner.documents.entry(collection).or_default();
        find_doc(docs, document_id)
            .map(|doc| doc.clone())
            .ok_or_else(|| error(Cause::NotFound, format!("no document {}", document_id)))
    }

    async fn list_documents(
        &self,
        collection: Collection,
        queries: &[Query],
    ) -> Fallible<DocumentList> {
        let mut inner = self.enter(Op::ListDocuments(collection))?;
        let docs = inner.documents.entry(collection).or_default();
        let (total, documents) = query::evaluate(queries, docs.iter());
        Ok(DocumentList { total, documents })
    }

    async fn update_document(
        &self,
        collection: Collection,
        document_id: &str,
        data: Value,
    ) -> Fallible<Document> {
        let mut inner = self.enter(Op::UpdateDocument(collection))?;
        let docs = inner.documents.entry(collection).or_default();
        guard!(let Some(doc) = find_doc(docs, document_id) else {
            return Err(error(Cause::NotFound, format!("no document {}", document_id)))
        });
        if let Value::Object(changes) = data {
            for (key, value) in changes {
                doc.insert(key, value);
            }
        }
        Ok(doc.clone())
    }

    async fn delete_document(&self, collection: Collection, document_id: &str) -> Fallible<()> {
        let mut inner = self.enter(Op::DeleteDocument(collection))?;
        let docs = inner.documents.entry(collection).or_default();
        let before = docs.len();
        docs.retain(|doc| doc.get("$id").and_then(Value::as_str) != Some(document_id));
        if docs.len() == before {
            return Err(error(Cause::NotFound, format!("no document {}", document_id)));
        }
        Ok(())
    }

    async fn create_file(&self, upload: FileUpload) -> Fallible<StoredFile> {
        let mut inner = self.enter(Op::CreateFile)?;
        let file = StoredFile {
            id: unique_id(),
            name: upload.name,
            mime_type: upload.mime_type,
            size: upload.bytes.len() as u64,
        };
        inner.files.push(file.clone());
        Ok(file)
    }

    async fn delete_file(&self, file_id: &str) -> Fallible<()> {
        let mut inner = self.enter(Op::DeleteFile)?;
        let before = inner.files.len();
        inner.files.retain(|f| f.id != file_id);
        if inner.files.len() == before {
            return Err(error(Cause::NotFound, format!("no file {}", file_id)));
        }
        Ok(())
    }

    fn file_preview_url(&self, file_id: &str) -> Fallible<Url> {
        let _inner = self.enter(Op::FilePreview)?;
        Ok(Url::parse(&format!("https://backend.test/v1/storage/files/{}/preview", file_id))?)
    }

    fn avatar_initials_url(&self, name: &str) -> Fallible<Url> {
        let _inner = self.enter(Op::AvatarInitials)?;
        let mut url = Url::parse("https://backend.test/v1/avatars/initials")?;
        url.query_pairs_mut().append_pair("name", name);
        Ok(url)
    }
}
