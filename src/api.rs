use crate::backend::Backend;
use crate::facade::Snapgram;
use crate::metrics;
use crate::queries::QueryClient;
use crate::session::{AuthContext, SessionToken};
use crate::twoface::Fallible;
use actix_web::web;
use std::future::Future;
use std::time::Instant;

pub mod auth;
pub mod userfacing;

/// Everything a handler needs, shared by every request on a worker.
pub struct State<B> {
    pub snapgram: Snapgram<B>,
    pub queries: QueryClient,
    pub max_upload_bytes: usize,
}

impl<B: Backend> State<B> {
    pub fn new(snapgram: Snapgram<B>, queries: QueryClient, max_upload_bytes: usize) -> Self {
        Self {
            snapgram,
            queries,
            max_upload_bytes,
        }
    }

    /// The auth context of one request.
    pub fn auth(&self, token: SessionToken) -> AuthContext<'_, B> {
        AuthContext::new(&self.snapgram, &self.queries, token.0)
    }
}

/// Mount every route. Generic over the backend, so tests can mount the same routes over a mock.
pub fn configure<B: Backend + 'static>(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/auth").configure(auth::configure::<B>));
    userfacing::configure::<B>(cfg);
}

pub trait CoerceColl<T>
where
    Self: IntoIterator<Item = T>,
{
    fn coerce_into<U: From<T>>(self) -> Vec<U>;
}

impl<T> CoerceColl<T> for Vec<T> {
    fn coerce_into<U: From<T>>(self) -> Vec<U> {
        self.into_iter().map(|v| v.into()).collect()
    }
}

/// Execute the closure, then log its operational metrics, e.g. time taken, whether it returned Ok/Err, etc.
async fn observe<F, Fut, R>(name: &'static str, f: F) -> Fallible<R>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Fallible<R>>,
{
    let start = Instant::now();
    let return_val = f().await;
    let duration = start.elapsed();
    metrics::HANDLER_SECS
        .with_label_values(&[name])
        .observe(duration.as_secs_f64());
    metrics::RESPONSES
        .with_label_values(&[name, variant_name(&return_val)])
        .inc();
    return_val
}

fn variant_name<T, E>(result: &Result<T, E>) -> &'static str {
    if result.is_ok() {
        "ok"
    } else {
        "err"
    }
}
