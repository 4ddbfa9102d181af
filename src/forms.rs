//! What users submit: field checks, and the backend calls each submission makes.
use crate::backend::{
    structs::{Credentials, FileUpload, Session},
    Backend,
};
use crate::facade::Snapgram;
use crate::models::{NewPost, NewUser, Post, User};
use crate::queries::QueryClient;
use crate::session::AuthContext;
use crate::twoface::{Cause, ExternalError, Fallible, TfError};
use bytes::Bytes;
use serde::Deserialize;
use std::fmt;
use tracing::{info, warn};

const SIGNUP_FAILED: &str = "Sign up failed. Please try again.";
const SIGNIN_FAILED: &str = "Sign in failed. Please try again.";

/// Fail with `text` unless `ok`.
fn check(ok: bool, text: &'static str) -> Fallible<()> {
    if ok {
        Ok(())
    } else {
        Err(TfError::new(text, ExternalError::new(Cause::Validation, text)))
    }
}

fn chars(s: &str) -> usize {
    s.chars().count()
}

#[derive(Deserialize, Clone)]
pub struct SignupForm {
    pub name: String,
    pub username: String,
    pub email: String,
    pub password: String,
}

impl fmt::Debug for SignupForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignupForm")
            .field("name", &self.name)
            .field("username", &self.username)
            .field("email", &self.email)
            .finish()
    }
}

impl SignupForm {
    pub fn validate(&self) -> Fallible<()> {
        check(chars(&self.name) >= 2, "Name is too short")?;
        check(chars(&self.name) <= 100, "Name is too long")?;
        check(chars(self.username.trim()) >= 2, "Username is too short")?;
        check(chars(&self.email) >= 3, "Email is too short")?;
        check(self.email.contains('@'), "Email is invalid")?;
        check(
            chars(&self.password) >= 8,
            "Password must be at least 8 characters",
        )
    }

    fn credentials(&self) -> Credentials {
        Credentials {
            email: self.email.clone(),
            password: self.password.clone(),
        }
    }
}

impl From<SignupForm> for NewUser {
    fn from(form: SignupForm) -> Self {
        Self {
            name: form.name,
            username: form.username.trim().to_owned(),
            email: form.email,
            password: form.password,
        }
    }
}

#[derive(Deserialize, Clone)]
pub struct SigninForm {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for SigninForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigninForm")
            .field("email", &self.email)
            .finish()
    }
}

impl SigninForm {
    pub fn validate(&self) -> Fallible<()> {
        check(chars(&self.email) >= 3, "Email is too short")?;
        check(
            chars(&self.password) >= 8,
            "Password must be at least 8 characters",
        )
    }
}

/// An attached file, base64-encoded in the JSON body.
#[derive(Deserialize, Clone, Debug)]
pub struct FilePayload {
    pub name: String,
    pub mime_type: String,
    pub data: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct PostForm {
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub files: Vec<FilePayload>,
    #[serde(default)]
    pub location: String,
    /// Comma-separated, e.g. "art, travel, education".
    #[serde(default)]
    pub tags: String,
}

impl PostForm {
    pub fn validate(&self) -> Fallible<()> {
        check(chars(&self.caption) <= 2200, "Caption is too long")?;
        check(self.files.len() == 1, "Attach exactly one image")?;
        check(chars(&self.location) <= 100, "Location is too long")?;
        let file = &self.files[0];
        check(
            file.mime_type.starts_with("image/") && !file.mime_type.contains(&['\r', '\n'][..]),
            "Only images can be uploaded",
        )?;
        check(!file.name.trim().is_empty(), "The image needs a file name")
    }

    /// Validate, then decode the image. Fails if the decoded image exceeds `max_upload_bytes`.
    pub fn into_new_post(mut self, creator: &User, max_upload_bytes: usize) -> Fallible<NewPost> {
        self.validate()?;
        let file = self.files.remove(0);
        let bytes = base64::decode(&file.data).map_err(|e| {
            TfError::new(
                format!("image isn't valid base64: {}", e),
                ExternalError::new(Cause::Validation, "The image couldn't be read"),
            )
        })?;
        check(!bytes.is_empty(), "The image is empty")?;
        check(bytes.len() <= max_upload_bytes, "The image is too large")?;
        Ok(NewPost {
            creator: creator.id.clone(),
            caption: self.caption,
            file: FileUpload {
                name: file.name,
                mime_type: file.mime_type,
                bytes: Bytes::from(bytes),
            },
            location: self.location,
            tags: self.tags,
        })
    }
}

/// A session and the user it belongs to.
#[derive(Debug, Clone)]
pub struct SignedIn {
    pub session: Session,
    pub user: User,
}

/// Sign a new user up and in: create the account, open a session, then confirm the session
/// resolves to the new user.
///
/// An account whose sign-in then fails is left in place; the user can sign in later.
pub async fn submit_signup<B: Backend>(
    snapgram: &Snapgram<B>,
    queries: &QueryClient,
    form: SignupForm,
) -> Fallible<SignedIn> {
    form.validate()?;
    let credentials = form.credentials();
    let new_user: NewUser = form.into();

    snapgram
        .create_user_account(&new_user)
        .await
        .map_err(|e| match e.cause() {
            // Tell the user their email is taken, everything else gets the generic toast.
            Cause::Conflict => e,
            cause => e.redescribe(ExternalError::new(cause, SIGNUP_FAILED)),
        })?;

    let signed_in = sign_in(snapgram, queries, &credentials).await.map_err(|e| {
        warn!(email = %credentials.email, "account created but sign-in failed");
        let cause = e.cause();
        e.redescribe(ExternalError::new(cause, SIGNUP_FAILED))
    })?;
    info!(user_id = %signed_in.user.id, "signed up");
    Ok(signed_in)
}

pub async fn submit_signin<B: Backend>(
    snapgram: &Snapgram<B>,
    queries: &QueryClient,
    form: SigninForm,
) -> Fallible<SignedIn> {
    form.validate()?;
    let credentials = Credentials {
        email: form.email,
        password: form.password,
    };
    sign_in(snapgram, queries, &credentials).await.map_err(|e| {
        let cause = e.cause();
        e.redescribe(ExternalError::new(cause, SIGNIN_FAILED))
    })
}

async fn sign_in<B: Backend>(
    snapgram: &Snapgram<B>,
    queries: &QueryClient,
    credentials: &Credentials,
) -> Fallible<SignedIn> {
    let session = snapgram.sign_in_account(credentials).await?;
    // The new session has to resolve to a user before we call the user signed in.
    let mut auth = AuthContext::new(snapgram, queries, session.secret.clone());
    let user = auth.require_user().await?;
    Ok(SignedIn { session, user })
}

/// Validate the form, then create the post as `creator`.
pub async fn submit_post<B: Backend>(
    snapgram: &Snapgram<B>,
    creator: &User,
    form: PostForm,
    max_upload_bytes: usize,
) -> Fallible<Post> {
    let new_post = form.into_new_post(creator, max_upload_bytes)?;
    snapgram.create_post(new_post).await
}
