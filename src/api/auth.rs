use crate::api::{observe, userfacing::UserFacingUser, State};
use crate::backend::{structs::SessionSecret, Backend};
use crate::forms::{self, SignedIn, SigninForm, SignupForm};
use crate::session::SessionToken;
use crate::twoface::Fallible;
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

pub fn configure<B: Backend + 'static>(cfg: &mut web::ServiceConfig) {
    cfg.route("/signup", web::post().to(signup::<B>))
        .route("/signin", web::post().to(signin::<B>))
        .route("/signout", web::post().to(signout::<B>))
        .route("/me", web::get().to(me::<B>));
}

/// Handed to the client once, at sign-in. The client presents `secret` as its bearer token.
#[derive(Serialize, Deserialize, Debug)]
pub struct SessionBody {
    pub id: String,
    pub secret: SessionSecret,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SignedInBody {
    pub session: SessionBody,
    pub user: UserFacingUser,
}

impl From<SignedIn> for SignedInBody {
    fn from(s: SignedIn) -> Self {
        Self {
            session: SessionBody {
                id: s.session.id,
                secret: s.session.secret,
            },
            user: s.user.into(),
        }
    }
}

async fn signup<B: Backend>(
    state: web::Data<State<B>>,
    body: web::Json<SignupForm>,
) -> Fallible<web::Json<SignedInBody>> {
    observe("signup", || async {
        let signed_in = forms::submit_signup(&state.snapgram, &state.queries, body.into_inner()).await?;
        Ok(web::Json(signed_in.into()))
    })
    .await
}

async fn signin<B: Backend>(
    state: web::Data<State<B>>,
    body: web::Json<SigninForm>,
) -> Fallible<web::Json<SignedInBody>> {
    observe("signin", || async {
        let signed_in = forms::submit_signin(&state.snapgram, &state.queries, body.into_inner()).await?;
        Ok(web::Json(signed_in.into()))
    })
    .await
}

async fn signout<B: Backend>(
    state: web::Data<State<B>>,
    token: SessionToken,
) -> Fallible<HttpResponse> {
    observe("signout", || async {
        state.auth(token).sign_out().await?;
        Ok(HttpResponse::NoContent().finish())
    })
    .await
}

/// Who the bearer is. `authenticated` is false for a missing, unknown or expired session.
#[derive(Serialize, Deserialize, Debug)]
pub struct MeBody {
    pub authenticated: bool,
    pub user: Option<UserFacingUser>,
}

async fn me<B: Backend>(
    state: web::Data<State<B>>,
    token: Option<SessionToken>,
) -> Fallible<web::Json<MeBody>> {
    observe("me", || async {
        guard!(let Some(token) = token else {
            return Ok(web::Json(MeBody {
                authenticated: false,
                user: None,
            }))
        });
        let mut auth = state.auth(token);
        let authenticated = auth.check_auth_user().await;
        Ok(web::Json(MeBody {
            authenticated,
            user: auth.user().cloned().map(UserFacingUser::from),
        }))
    })
    .await
}

#[cfg(test)]
mod tests {
    use crate::api::testing::{call, json};
    use crate::backend::{mock, structs::Collection};
    use actix_web::{http::StatusCode, test::TestRequest};
    use serde_json::json;

    fn signup_body(email: &str) -> serde_json::Value {
        json!({
            "name": "Katherine Johnson",
            "username": "katherine",
            "email": email,
            "password": "trajectory",
        })
    }

    #[actix_rt::test]
    async fn test_signup_then_me_then_signout() {
        let backend = mock::Client::default();
        let resp = call(
            &backend,
            TestRequest::post()
                .uri("/auth/signup")
                .set_json(&signup_body("kj@example.com")),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json(resp).await;
        let secret = body["session"]["secret"].as_str().unwrap().to_owned();
        assert_eq!(body["user"]["username"], "katherine");
        assert!(body["user"].get("email").is_none());

        let bearer = format!("Bearer {}", secret);
        let resp = call(
            &backend,
            TestRequest::get().uri("/auth/me").header("Authorization", bearer.as_str()),
        )
        .await;
        let body = json(resp).await;
        assert_eq!(body["authenticated"], true);
        assert_eq!(body["user"]["name"], "Katherine Johnson");

        let resp = call(
            &backend,
            TestRequest::post()
                .uri("/auth/signout")
                .header("Authorization", bearer.as_str()),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert!(backend.sessions().is_empty());

        let resp = call(
            &backend,
            TestRequest::get().uri("/auth/me").header("Authorization", bearer.as_str()),
        )
        .await;
        let body = json(resp).await;
        assert_eq!(body["authenticated"], false);
        assert!(body["user"].is_null());
    }

    #[actix_rt::test]
    async fn test_duplicate_signup_is_a_conflict() {
        let backend = mock::Client::default();
        let req = || {
            TestRequest::post()
                .uri("/auth/signup")
                .set_json(&signup_body("kj@example.com"))
        };
        assert_eq!(call(&backend, req()).await.status(), StatusCode::OK);

        let resp = call(&backend, req()).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body = json(resp).await;
        assert_eq!(
            body["error"],
            "Conflict: An account with this email already exists"
        );
        assert_eq!(backend.documents(Collection::Users).len(), 1);
        assert_eq!(backend.sessions().len(), 1);
    }

    #[actix_rt::test]
    async fn test_invalid_signup_is_rejected_before_the_backend() {
        let backend = mock::Client::default();
        let mut body = signup_body("kj@example.com");
        body["password"] = json!("short");
        let resp = call(
            &backend,
            TestRequest::post().uri("/auth/signup").set_json(&body),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(backend.calls().is_empty());
    }

    #[actix_rt::test]
    async fn test_me_without_token() {
        let backend = mock::Client::default();
        let resp = call(&backend, TestRequest::get().uri("/auth/me")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json(resp).await;
        assert_eq!(body["authenticated"], false);
        assert!(body["user"].is_null());
        assert!(backend.calls().is_empty());
    }

    #[actix_rt::test]
    async fn test_signout_without_token() {
        let backend = mock::Client::default();
        let resp = call(&backend, TestRequest::post().uri("/auth/signout")).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
