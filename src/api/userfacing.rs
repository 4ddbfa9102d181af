//! For every record in `models`, this module has a matching struct which redacts fields users
//! shouldn't see (storage ids, other users' emails).
use crate::api::{observe, CoerceColl, State};
use crate::backend::Backend;
use crate::forms::{self, PostForm};
use crate::models::{Post, User};
use crate::queries::{MutationKey, MutationKind, RECENT_POSTS};
use crate::session::SessionToken;
use crate::stats::PostStats;
use crate::twoface::Fallible;
use actix_web::web;
use chrono::{offset::Utc, DateTime};
use serde::{Deserialize, Serialize};

pub fn configure<B: Backend + 'static>(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/posts")
            .route("", web::get().to(list_recent_posts::<B>))
            .route("", web::post().to(write_post::<B>))
            .route("/{post_id}/stats", web::get().to(get_stats::<B>))
            .route("/{post_id}/like", web::post().to(toggle_like::<B>))
            .route("/{post_id}/save", web::post().to(toggle_save::<B>)),
    )
    .route("/profile/{user_id}", web::get().to(get_profile::<B>));
}

/// A post without its storage id.
#[derive(Serialize, Deserialize, Eq, PartialEq, Debug)]
pub struct UserFacingPost {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub creator: String,
    pub caption: String,
    pub image_url: String,
    pub location: String,
    pub tags: Vec<String>,
    pub likes: Vec<String>,
}

impl From<Post> for UserFacingPost {
    fn from(p: Post) -> Self {
        Self {
            id: p.id,
            created_at: p.created_at,
            creator: p.creator,
            caption: p.caption,
            image_url: p.image_url,
            location: p.location,
            tags: p.tags,
            likes: p.likes,
        }
    }
}

/// A user without their email or account id.
#[derive(Serialize, Deserialize, Eq, PartialEq, Debug)]
pub struct UserFacingUser {
    pub id: String,
    pub name: String,
    pub username: String,
    pub image_url: String,
}

impl From<User> for UserFacingUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            name: u.name,
            username: u.username,
            image_url: u.image_url,
        }
    }
}

/// Like and save state of a post, as the requesting user sees it.
#[derive(Serialize, Deserialize, Eq, PartialEq, Debug)]
pub struct UserFacingStats {
    pub post_id: String,
    pub likes: Vec<String>,
    pub like_count: usize,
    pub liked: bool,
    pub saved: bool,
    pub save_count: u64,
}

impl From<PostStats> for UserFacingStats {
    fn from(s: PostStats) -> Self {
        Self {
            liked: s.is_liked(),
            saved: s.is_saved(),
            like_count: s.like_count(),
            post_id: s.post_id,
            likes: s.likes,
            save_count: s.save_count,
        }
    }
}

// The home feed. Served from cache while fresh, so a post created meanwhile may not show yet.
async fn list_recent_posts<B: Backend>(
    state: web::Data<State<B>>,
    token: SessionToken,
) -> Fallible<web::Json<Vec<UserFacingPost>>> {
    observe("list_recent_posts", || async {
        state.auth(token).require_user().await?;
        let snapgram = &state.snapgram;
        let posts = state
            .queries
            .feed
            .fetch(RECENT_POSTS, || snapgram.get_recent_posts())
            .await?;
        Ok(web::Json(posts.coerce_into()))
    })
    .await
}

async fn write_post<B: Backend>(
    state: web::Data<State<B>>,
    token: SessionToken,
    body: web::Json<PostForm>,
) -> Fallible<web::Json<UserFacingPost>> {
    observe("write_post", || async {
        let user = state.auth(token).require_user().await?;
        let _pending = state
            .queries
            .mutations
            .begin(MutationKey::new(MutationKind::CreatePost, &user.id, ""))?;
        let post = forms::submit_post(
            &state.snapgram,
            &user,
            body.into_inner(),
            state.max_upload_bytes,
        )
        .await?;
        Ok(web::Json(post.into()))
    })
    .await
}

async fn get_stats<B: Backend>(
    state: web::Data<State<B>>,
    token: SessionToken,
    post_id: web::Path<String>,
) -> Fallible<web::Json<UserFacingStats>> {
    observe("get_stats", || async {
        let user = state.auth(token).require_user().await?;
        let stats = PostStats::load(&state.snapgram, &user.id, &post_id).await?;
        Ok(web::Json(stats.into()))
    })
    .await
}

async fn toggle_like<B: Backend>(
    state: web::Data<State<B>>,
    token: SessionToken,
    post_id: web::Path<String>,
) -> Fallible<web::Json<UserFacingStats>> {
    observe("toggle_like", || async {
        let user = state.auth(token).require_user().await?;
        let _pending = state
            .queries
            .mutations
            .begin(MutationKey::new(MutationKind::Like, &user.id, &post_id))?;
        let mut stats = PostStats::load(&state.snapgram, &user.id, &post_id).await?;
        stats.like(&state.snapgram).await?;
        Ok(web::Json(stats.into()))
    })
    .await
}

async fn toggle_save<B: Backend>(
    state: web::Data<State<B>>,
    token: SessionToken,
    post_id: web::Path<String>,
) -> Fallible<web::Json<UserFacingStats>> {
    observe("toggle_save", || async {
        let user = state.auth(token).require_user().await?;
        let _pending = state
            .queries
            .mutations
            .begin(MutationKey::new(MutationKind::Save, &user.id, &post_id))?;
        let mut stats = PostStats::load(&state.snapgram, &user.id, &post_id).await?;
        stats.save(&state.snapgram).await?;
        Ok(web::Json(stats.into()))
    })
    .await
}

async fn get_profile<B: Backend>(
    state: web::Data<State<B>>,
    token: SessionToken,
    user_id: web::Path<String>,
) -> Fallible<web::Json<UserFacingUser>> {
    observe("get_profile", || async {
        state.auth(token).require_user().await?;
        let user = state.snapgram.get_user_by_id(&user_id).await?;
        Ok(web::Json(user.into()))
    })
    .await
}
