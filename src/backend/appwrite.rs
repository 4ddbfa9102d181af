mod errors;
mod multipart;

use crate::backend::{
    query::Query,
    structs::{
        Account, Collection, Credentials, Document, DocumentList, FileUpload, NewAccount, Session,
        SessionSecret, StoredFile,
    },
    unique_id, Backend, Op,
};
use crate::config::BackendConfig;
use crate::twoface::{Cause, DescribeErr, ExternalError, Fallible, TfError};
use async_trait::async_trait;
use awc::Client;
use errors::{read_body, read_json};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

const PROJECT_HEADER: &str = "X-Appwrite-Project";
const KEY_HEADER: &str = "X-Appwrite-Key";
const SESSION_HEADER: &str = "X-Appwrite-Session";

/// Preview dimensions and quality requested for post images.
const PREVIEW_SIZE: u32 = 2000;
const PREVIEW_QUALITY: u32 = 100;

/// An implementation of backend::Backend speaking the hosted platform's REST API.
///
/// Account calls act as the caller, by presenting their session secret. Database and storage calls
/// act as the server, by presenting the API key.
#[derive(Clone)]
pub struct AppwriteClient {
    http: Client,
    config: BackendConfig,
}

#[derive(Serialize)]
struct ListParams {
    queries: Vec<String>,
}

impl AppwriteClient {
    pub fn new(config: BackendConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .finish();
        Self { http, config }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    fn collection_id(&self, collection: Collection) -> &str {
        match collection {
            Collection::Users => &self.config.users_collection_id,
            Collection::Posts => &self.config.posts_collection_id,
            Collection::Saves => &self.config.saves_collection_id,
        }
    }

    fn documents_url(&self, collection: Collection) -> String {
        self.endpoint(&format!(
            "/databases/{}/collections/{}/documents",
            self.config.database_id,
            self.collection_id(collection)
        ))
    }

    /// The documents URL with the queries encoded as `queries[]` parameters.
    fn list_url(&self, collection: Collection, queries: &[Query]) -> Fallible<String> {
        let params = ListParams {
            queries: queries.iter().map(Query::to_wire).collect(),
        };
        // serde_qs errors aren't Send, so they can't become anyhow errors directly.
        let query_string = serde_qs::to_string(&params)
            .map_err(|e| TfError::new(e, ExternalError::default()))?;
        Ok(format!("{}?{}", self.documents_url(collection), query_string))
    }

    fn files_url(&self) -> String {
        self.endpoint(&format!("/storage/buckets/{}/files", self.config.storage_id))
    }

    /// A URL the browser can load directly, so it carries the project but no credentials.
    fn public_url(&self, path: &str, params: &[(&str, &str)], op: Op) -> Fallible<Url> {
        let mut url = Url::parse(&self.endpoint(path)).describe_err(ExternalError {
            text: "The backend endpoint is misconfigured",
            ..Default::default()
        })?;
        url.query_pairs_mut()
            .extend_pairs(params)
            .append_pair("project", &self.config.project_id);
        tracing::debug!(operation = %op, "built public URL");
        Ok(url)
    }

    fn as_server(&self, request: awc::ClientRequest) -> awc::ClientRequest {
        request
            .header(PROJECT_HEADER, self.config.project_id.as_str())
            .header(KEY_HEADER, self.config.api_key.as_str())
    }

    fn as_caller(&self, request: awc::ClientRequest, secret: &SessionSecret) -> awc::ClientRequest {
        request
            .header(PROJECT_HEADER, self.config.project_id.as_str())
            .header(SESSION_HEADER, secret.expose())
    }
}

#[async_trait(?Send)]
impl Backend for AppwriteClient {
    async fn create_account(&self, new_account: NewAccount) -> Fallible<Account> {
        let request = self
            .http
            .post(self.endpoint("/account"))
            .header(PROJECT_HEADER, self.config.project_id.as_str());
        read_json(Op::CreateAccount, request.send_json(&new_account).await).await
    }

    async fn create_email_session(&self, credentials: &Credentials) -> Fallible<Session> {
        // Created with the server key, so the response includes the session secret.
        let request = self.as_server(self.http.post(self.endpoint("/account/sessions/email")));
        read_json(Op::CreateSession, request.send_json(credentials).await).await
    }

    async fn delete_session(&self, secret: &SessionSecret) -> Fallible<()> {
        let request = self.as_caller(
            self.http.delete(self.endpoint("/account/sessions/current")),
            secret,
        );
        read_body(Op::DeleteSession, request.send().await).await?;
        Ok(())
    }

    async fn get_account(&self, secret: &SessionSecret) -> Fallible<Account> {
        let request = self.as_caller(self.http.get(self.endpoint("/account")), secret);
        read_json(Op::GetAccount, request.send().await).await
    }

    async fn create_document(
        &self,
        collection: Collection,
        document_id: String,
        data: Value,
    ) -> Fallible<Document> {
        let body = json!({ "documentId": document_id, "data": data });
        let request = self.as_server(self.http.post(self.documents_url(collection)));
        read_json(Op::CreateDocument(collection), request.send_json(&body).await).await
    }

    async fn get_document(&self, collection: Collection, document_id: &str) -> Fallible<Document> {
        let url = format!("{}/{}", self.documents_url(collection), document_id);
        let request = self.as_server(self.http.get(url));
        read_json(Op::GetDocument(collection), request.send().await).await
    }

    async fn list_documents(
        &self,
        collection: Collection,
        queries: &[Query],
    ) -> Fallible<DocumentList> {
        let url = self.list_url(collection, queries)?;
        let request = self.as_server(self.http.get(url));
        read_json(Op::ListDocuments(collection), request.send().await).await
    }

    async fn update_document(
        &self,
        collection: Collection,
        document_id: &str,
        data: Value,
    ) -> Fallible<Document> {
        let url = format!("{}/{}", self.documents_url(collection), document_id);
        let request = self.as_server(self.http.patch(url));
        let body = json!({ "data": data });
        read_json(Op::UpdateDocument(collection), request.send_json(&body).await).await
    }

    async fn delete_document(&self, collection: Collection, document_id: &str) -> Fallible<()> {
        let url = format!("{}/{}", self.documents_url(collection), document_id);
        let request = self.as_server(self.http.delete(url));
        read_body(Op::DeleteDocument(collection), request.send().await).await?;
        Ok(())
    }

    async fn create_file(&self, upload: FileUpload) -> Fallible<StoredFile> {
        let boundary = format!("snapgram-{}", unique_id());
        let body = multipart::Form::new(&boundary)
            .text("fileId", &unique_id())
            .file("file", &upload)
            .finish();
        let request = self
            .as_server(self.http.post(self.files_url()))
            .content_type(multipart::content_type(&boundary));
        read_json(Op::CreateFile, request.send_body(body).await).await
    }

    async fn delete_file(&self, file_id: &str) -> Fallible<()> {
        let url = format!("{}/{}", self.files_url(), file_id);
        let request = self.as_server(self.http.delete(url));
        read_body(Op::DeleteFile, request.send().await).await?;
        Ok(())
    }

    fn file_preview_url(&self, file_id: &str) -> Fallible<Url> {
        if file_id.is_empty() {
            return Err(TfError::new(
                "preview requested for an empty file id",
                Cause::Validation.into(),
            ));
        }
        let size = PREVIEW_SIZE.to_string();
        let quality = PREVIEW_QUALITY.to_string();
        self.public_url(
            &format!(
                "/storage/buckets/{}/files/{}/preview",
                self.config.storage_id, file_id
            ),
            &[
                ("width", size.as_str()),
                ("height", size.as_str()),
                ("quality", quality.as_str()),
            ],
            Op::FilePreview,
        )
    }

    fn avatar_initials_url(&self, name: &str) -> Fallible<Url> {
        self.public_url("/avatars/initials", &[("name", name)], Op::AvatarInitials)
    }
}
