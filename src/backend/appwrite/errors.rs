use crate::backend::Op;
use crate::metrics;
use crate::twoface::{Cause, ExternalError, Fallible, TfError};
use awc::error::{PayloadError, SendRequestError};
use awc::ClientResponse;
use bytes::Bytes;
use futures::Stream;
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Largest response body we'll buffer. A feed page of documents is well under this.
const MAX_RESPONSE_BYTES: usize = 4 * 1024 * 1024;

/// What the platform sends alongside a non-2xx status.
#[derive(Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(rename = "type", default)]
    kind: String,
}

/// Turn a sent request into its response body, or a tagged error. Records the outcome in metrics.
pub(super) async fn read_body<S>(
    op: Op,
    sent: Result<ClientResponse<S>, SendRequestError>,
) -> Fallible<Bytes>
where
    S: Stream<Item = Result<Bytes, PayloadError>> + Unpin,
{
    let result = read_body_inner(op, sent).await;
    let label = match &result {
        Ok(_) => "ok".to_owned(),
        Err(e) => e.cause().to_string(),
    };
    metrics::BACKEND_CALLS
        .with_label_values(&[op.as_str(), &label])
        .inc();
    result
}

async fn read_body_inner<S>(
    op: Op,
    sent: Result<ClientResponse<S>, SendRequestError>,
) -> Fallible<Bytes>
where
    S: Stream<Item = Result<Bytes, PayloadError>> + Unpin,
{
    let mut response = sent.map_err(|e| {
        TfError::new(
            format!("{} couldn't be sent: {}", op, e),
            Cause::Network.into(),
        )
    })?;
    let status = response.status();
    let body = response
        .body()
        .limit(MAX_RESPONSE_BYTES)
        .await
        .map_err(|e| {
            TfError::new(
                format!("{} response body couldn't be read: {}", op, e),
                Cause::Network.into(),
            )
        })?;
    if status.is_success() {
        return Ok(body);
    }
    let detail = match serde_json::from_slice::<ErrorBody>(&body) {
        Ok(err) => format!("{} ({})", err.message, err.kind),
        Err(_) => String::from_utf8_lossy(&body).into_owned(),
    };
    Err(TfError::new(
        format!("{} returned {}: {}", op, status, detail),
        Cause::from_backend_status(status).into(),
    ))
}

/// Read the body as JSON.
pub(super) async fn read_json<S, T>(
    op: Op,
    sent: Result<ClientResponse<S>, SendRequestError>,
) -> Fallible<T>
where
    S: Stream<Item = Result<Bytes, PayloadError>> + Unpin,
    T: DeserializeOwned,
{
    let body = read_body(op, sent).await?;
    serde_json::from_slice(&body).map_err(|e| {
        TfError::new(
            format!("{} returned a body we couldn't decode: {}", op, e),
            ExternalError::default(),
        )
    })
}
