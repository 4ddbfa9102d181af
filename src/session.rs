//! Who is making this request. There is no process-wide "current user": each handler builds an
//! `AuthContext` from the session credential on its own request.
use crate::backend::{structs::SessionSecret, Backend};
use crate::facade::Snapgram;
use crate::models::User;
use crate::queries::QueryClient;
use crate::twoface::{Cause, ExternalError, Fallible, TfError};
use actix_web::{dev::Payload, http::header::Header, FromRequest, HttpRequest};
use actix_web_httpauth::headers::authorization::{Authorization, Bearer};
use futures::future::{ready, Ready};
use tracing::debug;

/// The session secret presented as `Authorization: Bearer <secret>`.
#[derive(Debug, Clone)]
pub struct SessionToken(pub SessionSecret);

impl FromRequest for SessionToken {
    type Error = TfError;
    type Future = Ready<Result<Self, Self::Error>>;
    type Config = ();

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let token = Authorization::<Bearer>::parse(req)
            .map(|auth| {
                let token = auth.into_scheme().token().to_string();
                SessionToken(SessionSecret::new(token))
            })
            .map_err(|e| {
                TfError::new(
                    format!("no usable bearer credential: {}", e),
                    ExternalError::new(Cause::Unauthorized, "Please sign in"),
                )
            });
        ready(token)
    }
}

/// The signed-in user, if any, for one request.
pub struct AuthContext<'a, B> {
    snapgram: &'a Snapgram<B>,
    queries: &'a QueryClient,
    secret: SessionSecret,
    user: Option<User>,
    is_loading: bool,
}

impl<'a, B: Backend> AuthContext<'a, B> {
    pub fn new(snapgram: &'a Snapgram<B>, queries: &'a QueryClient, secret: SessionSecret) -> Self {
        Self {
            snapgram,
            queries,
            secret,
            user: None,
            is_loading: false,
        }
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    /// Resolve the session to its user. Returns whether the session is signed in.
    pub async fn check_auth_user(&mut self) -> bool {
        self.resolve().await.is_ok()
    }

    /// The signed-in user, or an `Unauthorized` error.
    pub async fn require_user(&mut self) -> Fallible<User> {
        self.resolve().await
    }

    async fn resolve(&mut self) -> Fallible<User> {
        self.is_loading = true;
        let snapgram = self.snapgram;
        let secret = &self.secret;
        let result = self
            .queries
            .current_user
            .fetch(secret.digest(), || snapgram.get_current_user(secret))
            .await;
        self.is_loading = false;
        match result {
            Ok(user) => {
                self.user = Some(user.clone());
                Ok(user)
            }
            Err(e) => {
                debug!(cause = %e.cause(), "session isn't signed in");
                self.user = None;
                Err(e)
            }
        }
    }

    /// Delete the session, then forget its cached user. The cache is cleared even if the delete
    /// fails, and only after it's done, so a lookup racing the delete can't outlive it.
    pub async fn sign_out(self) -> Fallible<()> {
        let deleted = self.snapgram.sign_out_account(&self.secret).await;
        self.queries.forget_session(&self.secret);
        deleted
    }
}
