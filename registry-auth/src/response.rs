//! Response body collection helpers.

use bytes::Bytes;
use http_body_util::BodyExt as _;
use hyperdriver::Body;

/// Boxed error produced while collecting a body.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Collect a response body into contiguous bytes.
pub async fn bytes(body: Body) -> Result<Bytes, BoxError> {
    let collected = body.collect().await.map_err(Into::<BoxError>::into)?;
    Ok(collected.to_bytes())
}

/// Collect a response body as UTF-8 text.
pub async fn text(body: Body) -> Result<String, BoxError> {
    let collected = bytes(body).await?;
    String::from_utf8(collected.to_vec()).map_err(Into::into)
}
