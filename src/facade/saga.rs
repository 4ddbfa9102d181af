//! Post creation touches two backend services that share no transaction: storage holds the image,
//! the database holds the post. The steps run in order, and each step that leaves something behind
//! records how to undo it. If a later step fails, the recorded undos run newest first.
//!
//! Undoing is best-effort. A failed undo is logged and counted, and the caller still gets the error
//! of the step that failed, so at most one orphaned file is left per failed creation.
use crate::backend::{structs::Collection, unique_id, Backend};
use crate::facade::decode;
use crate::metrics;
use crate::models::{parse_tags, NewPost, Post};
use crate::twoface::{ExternalError, Fallible, TfError};
use serde_json::json;
use tracing::{info, warn};

/// The steps of creating a post, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Upload,
    Preview,
    CreateDocument,
}

/// How to undo a completed step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compensation {
    DeleteFile(String),
}

impl Compensation {
    fn label(&self) -> &'static str {
        match self {
            Self::DeleteFile(_) => "delete_file",
        }
    }
}

const CREATE_FAILED: &str = "Post creation failed. Please try again.";

pub struct CreatePost<'a, B> {
    backend: &'a B,
    compensations: Vec<Compensation>,
}

impl<'a, B: Backend> CreatePost<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self {
            backend,
            compensations: Vec::new(),
        }
    }

    pub async fn run(mut self, post: NewPost) -> Fallible<Post> {
        let file = match self.backend.create_file(post.file).await {
            Ok(file) => file,
            Err(e) => return Err(self.abort(Step::Upload, e).await),
        };
        self.compensations
            .push(Compensation::DeleteFile(file.id.clone()));

        let image_url = match self.backend.file_preview_url(&file.id) {
            Ok(url) => url,
            Err(e) => return Err(self.abort(Step::Preview, e).await),
        };

        let data = json!({
            "creator": post.creator,
            "caption": post.caption,
            "imageURL": image_url.as_str(),
            "imageId": file.id,
            "location": post.location,
            "tags": parse_tags(&post.tags),
        });
        let doc = match self
            .backend
            .create_document(Collection::Posts, unique_id(), data)
            .await
        {
            Ok(doc) => doc,
            Err(e) => return Err(self.abort(Step::CreateDocument, e).await),
        };

        let post: Post = decode(doc)?;
        info!(post_id = %post.id, file_id = %file.id, "created post");
        Ok(post)
    }

    /// Undo every completed step, then hand back the error that stopped the saga.
    async fn abort(&mut self, step: Step, err: TfError) -> TfError {
        warn!(?step, cause = %err.cause(), "post creation failed: {:#}", err.internal);
        while let Some(compensation) = self.compensations.pop() {
            self.compensate(&compensation).await;
        }
        let cause = err.cause();
        err.redescribe(ExternalError::new(cause, CREATE_FAILED))
    }

    async fn compensate(&self, compensation: &Compensation) {
        let result = match compensation {
            Compensation::DeleteFile(file_id) => self.backend.delete_file(file_id).await,
        };
        let outcome = match &result {
            Ok(()) => "ok",
            Err(_) => "err",
        };
        metrics::COMPENSATIONS
            .with_label_values(&[compensation.label(), outcome])
            .inc();
        if let Err(e) = result {
            warn!(?compensation, "compensation failed, leaving an orphan: {:#}", e.internal);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{mock, structs::FileUpload, Op};
    use crate::twoface::Cause;
    use bytes::Bytes;

    fn new_post(tags: &str) -> NewPost {
        NewPost {
            creator: "u1".to_owned(),
            caption: "Sunset over the bay".to_owned(),
            file: FileUpload {
                name: "sunset.jpg".to_owned(),
                mime_type: "image/jpeg".to_owned(),
                bytes: Bytes::from_static(b"\xff\xd8\xff"),
            },
            location: "Lisbon".to_owned(),
            tags: tags.to_owned(),
        }
    }

    #[actix_rt::test]
    async fn test_post_references_uploaded_file() {
        let backend = mock::Client::default();
        let post = CreatePost::new(&backend)
            .run(new_post("art, travel, education"))
            .await
            .unwrap();

        let files = backend.files();
        assert_eq!(files.len(), 1);
        assert_eq!(post.image_id, files[0].id);
        assert!(post.image_url.contains(&files[0].id));
        assert_eq!(post.tags, vec!["art", "travel", "education"]);
        assert_eq!(post.creator, "u1");
        assert_eq!(post.location, "Lisbon");
        assert!(post.likes.is_empty());
    }

    #[actix_rt::test]
    async fn test_failed_document_deletes_file() {
        let backend = mock::Client::default();
        backend.fail_next(Op::CreateDocument(Collection::Posts));

        let err = CreatePost::new(&backend)
            .run(new_post("art"))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), format!("ServerError: {}", CREATE_FAILED));
        assert!(backend.files().is_empty());
        assert!(backend.documents(Collection::Posts).is_empty());
        assert!(backend.calls().contains(&Op::DeleteFile));
    }

    #[actix_rt::test]
    async fn test_failed_preview_deletes_file() {
        let backend = mock::Client::default();
        backend.fail_next(Op::FilePreview);

        assert!(CreatePost::new(&backend).run(new_post("")).await.is_err());
        assert!(backend.files().is_empty());
        assert!(!backend
            .calls()
            .contains(&Op::CreateDocument(Collection::Posts)));
    }

    #[actix_rt::test]
    async fn test_failed_compensation_leaves_one_orphan() {
        let backend = mock::Client::default();
        backend.fail_next(Op::CreateDocument(Collection::Posts));
        backend.fail_next(Op::DeleteFile);

        let err = CreatePost::new(&backend)
            .run(new_post("art"))
            .await
            .unwrap_err();

        // The document error is reported, not the compensation's.
        assert_eq!(err.cause(), Cause::ServerError);
        assert!(err.internal.to_string().contains("create_document"));
        assert_eq!(backend.files().len(), 1);
    }

    #[actix_rt::test]
    async fn test_failed_upload_needs_no_compensation() {
        let backend = mock::Client::default();
        backend.fail_next(Op::CreateFile);

        assert!(CreatePost::new(&backend).run(new_post("art")).await.is_err());
        assert!(!backend.calls().contains(&Op::DeleteFile));
    }
}
