//! Domain operations over the hosted backend. Each method is one user intent (sign up, like a post,
//! ...) translated into backend calls, with every failure returned as a tagged `TfError`.
pub mod saga;

use crate::backend::{
    query::{Query, CREATED_AT},
    structs::{Account, Collection, Credentials, Document, NewAccount, Session, SessionSecret},
    unique_id, Backend,
};
use crate::models::{NewPost, NewUser, Post, Save, User};
use crate::twoface::{Cause, ExternalError, Fallible, TfError};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct Snapgram<B> {
    backend: B,
    feed_limit: u32,
}

impl<B: Backend> Snapgram<B> {
    pub fn new(backend: B, feed_limit: u32) -> Self {
        Self {
            backend,
            feed_limit,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Create the auth account, then the user document that the rest of the app refers to.
    pub async fn create_user_account(&self, user: &NewUser) -> Fallible<User> {
        let account = self
            .backend
            .create_account(NewAccount {
                id: unique_id(),
                email: user.email.clone(),
                password: user.password.clone(),
                name: user.name.clone(),
            })
            .await
            .map_err(|e| match e.cause() {
                Cause::Conflict => e.redescribe(ExternalError::new(
                    Cause::Conflict,
                    "An account with this email already exists",
                )),
                _ => e,
            })?;
        let avatar = self.backend.avatar_initials_url(&account.name)?;
        let user = self
            .save_user_to_db(&account, &user.username, avatar.as_str())
            .await?;
        info!(user_id = %user.id, "created user account");
        Ok(user)
    }

    async fn save_user_to_db(
        &self,
        account: &Account,
        username: &str,
        image_url: &str,
    ) -> Fallible<User> {
        let data = json!({
            "accountId": account.id,
            "email": account.email,
            "name": account.name,
            "imageUrl": image_url,
            "username": username,
        });
        let doc = self
            .backend
            .create_document(Collection::Users, account.id.clone(), data)
            .await?;
        decode(doc)
    }

    pub async fn sign_in_account(&self, credentials: &Credentials) -> Fallible<Session> {
        let session = self.backend.create_email_session(credentials).await?;
        debug!(account_id = %session.account_id, "created session");
        Ok(session)
    }

    pub async fn sign_out_account(&self, secret: &SessionSecret) -> Fallible<()> {
        self.backend.delete_session(secret).await
    }

    /// The user document behind the session. Anything but a transport failure means the caller is
    /// not authenticated.
    pub async fn get_current_user(&self, secret: &SessionSecret) -> Fallible<User> {
        let not_authenticated = |e: TfError| match e.cause() {
            Cause::Network => e,
            _ => e.redescribe(Cause::Unauthorized.into()),
        };
        let account = self
            .backend
            .get_account(secret)
            .await
            .map_err(not_authenticated)?;
        let users = self
            .backend
            .list_documents(
                Collection::Users,
                &[Query::equal("accountId", account.id.as_str()), Query::limit(1)],
            )
            .await
            .map_err(not_authenticated)?;
        guard!(let Some(doc) = users.documents.into_iter().next() else {
            return Err(TfError::new(
                format!("account {} has no user document", account.id),
                Cause::Unauthorized.into(),
            ))
        });
        decode(doc)
    }

    pub async fn get_user_by_id(&self, user_id: &str) -> Fallible<User> {
        let doc = self
            .backend
            .get_document(Collection::Users, user_id)
            .await
            .map_err(|e| match e.cause() {
                Cause::NotFound => e.redescribe(ExternalError::new(Cause::NotFound, "No such user")),
                _ => e,
            })?;
        decode(doc)
    }

    /// Upload the image, then create the post referencing it. See `saga` for what happens when the
    /// second half fails.
    pub async fn create_post(&self, post: NewPost) -> Fallible<Post> {
        saga::CreatePost::new(&self.backend).run(post).await
    }

    /// The newest posts, newest first. There is no paging past the configured limit.
    pub async fn get_recent_posts(&self) -> Fallible<Vec<Post>> {
        let posts = self
            .backend
            .list_documents(
                Collection::Posts,
                &[Query::order_desc(CREATED_AT), Query::limit(self.feed_limit)],
            )
            .await?;
        posts.documents.into_iter().map(decode).collect()
    }

    pub async fn get_post(&self, post_id: &str) -> Fallible<Post> {
        let doc = self
            .backend
            .get_document(Collection::Posts, post_id)
            .await
            .map_err(|e| match e.cause() {
                Cause::NotFound => e.redescribe(ExternalError::new(Cause::NotFound, "No such post")),
                _ => e,
            })?;
        decode(doc)
    }

    /// Replace the post's whole liker list. Two users liking at once can each overwrite the
    /// other's like: last write wins.
    pub async fn like_post(&self, post_id: &str, likes: &[String]) -> Fallible<Post> {
        let mut unique: Vec<&String> = Vec::with_capacity(likes.len());
        for id in likes {
            if !unique.contains(&id) {
                unique.push(id);
            }
        }
        if unique.len() != likes.len() {
            warn!(post_id, "dropped duplicate ids from liker list");
        }
        let doc = self
            .backend
            .update_document(Collection::Posts, post_id, json!({ "likes": unique }))
            .await?;
        decode(doc)
    }

    /// The user's save record for this post, if they saved it. Assumes at most one exists.
    pub async fn find_saved_record(&self, user_id: &str, post_id: &str) -> Fallible<Option<Save>> {
        let saves = self
            .backend
            .list_documents(
                Collection::Saves,
                &[Query::equal("user", user_id), Query::equal("post", post_id)],
            )
            .await?;
        if saves.total > 1 {
            warn!(user_id, post_id, total = saves.total, "user saved the same post more than once");
        }
        saves.documents.into_iter().next().map(decode).transpose()
    }

    pub async fn save_post(&self, user_id: &str, post_id: &str) -> Fallible<Save> {
        let doc = self
            .backend
            .create_document(
                Collection::Saves,
                unique_id(),
                json!({ "post": post_id, "user": user_id }),
            )
            .await?;
        decode(doc)
    }

    pub async fn delete_saved_post(&self, saved_record_id: &str) -> Fallible<()> {
        if saved_record_id.is_empty() {
            return Err(TfError::new(
                "missing saved record id",
                ExternalError::new(Cause::Validation, "Missing saved record id"),
            ));
        }
        self.backend
            .delete_document(Collection::Saves, saved_record_id)
            .await
    }

    /// How many users saved this post. Exact only up to the backend's listing limits.
    pub async fn count_saved_post(&self, post_id: &str) -> Fallible<u64> {
        let saves = self
            .backend
            .list_documents(Collection::Saves, &[Query::equal("post", post_id)])
            .await?;
        Ok(saves.total)
    }
}

/// Decode a backend document into one of our records.
pub(crate) fn decode<T: DeserializeOwned>(doc: Document) -> Fallible<T> {
    let id = doc
        .get("$id")
        .and_then(Value::as_str)
        .unwrap_or("<no id>")
        .to_owned();
    serde_json::from_value(Value::Object(doc)).map_err(|e| {
        TfError::new(
            format!("document {} has an unexpected shape: {}", id, e),
            ExternalError::default(),
        )
    })
}
