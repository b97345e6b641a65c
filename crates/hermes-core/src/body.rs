//! Lazily collected request bodies.
//!
//! The transport hands the pipeline a streaming body wrapped in a size
//! limit. Nothing is read until a stage or handler asks for it; the bytes
//! are then buffered so later readers see the same content.

use bytes::Bytes;
use http_body::Body;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, LengthLimitError, Limited};
use parking_lot::Mutex;

use crate::error::PipelineError;

/// Boxed error type used by streaming bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A streaming body of bytes.
pub type BoxBody = UnsyncBoxBody<Bytes, BoxError>;

/// Request body, collected on first access.
pub struct RequestBody {
    // The lock only makes the body shareable by reference; it is never
    // contended because a request belongs to one execution.
    pending: Mutex<Option<BoxBody>>,
    buffered: Option<Bytes>,
    limit: usize,
}

impl std::fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBody")
            .field("buffered", &self.buffered.as_ref().map(Bytes::len))
            .field("limit", &self.limit)
            .finish()
    }
}

impl RequestBody {
    /// Wraps a streaming body, refusing more than `limit` bytes.
    pub fn streaming<B>(body: B, limit: usize) -> Self
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        Self {
            pending: Mutex::new(Some(Limited::new(body, limit).boxed_unsync())),
            buffered: None,
            limit,
        }
    }

    /// An already buffered body.
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        Self {
            limit: bytes.len(),
            pending: Mutex::new(None),
            buffered: Some(bytes),
        }
    }

    /// An empty body.
    #[must_use]
    pub fn empty() -> Self {
        Self::streaming(Empty::<Bytes>::new(), 0)
    }

    /// Returns true once the body has been read.
    #[must_use]
    pub fn is_buffered(&self) -> bool {
        self.buffered.is_some()
    }

    /// Reads the whole body.
    ///
    /// The first call awaits the transport; later calls return the buffered
    /// bytes. Fails with [`PipelineError::PayloadTooLarge`] when the limit
    /// is exceeded.
    pub async fn bytes(&mut self) -> Result<Bytes, PipelineError> {
        if let Some(bytes) = &self.buffered {
            return Ok(bytes.clone());
        }

        let pending = self.pending.lock().take();
        let bytes = match pending {
            None => Bytes::new(),
            Some(body) => match body.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
                    return Err(PipelineError::PayloadTooLarge { limit: self.limit });
                }
                Err(err) => {
                    return Err(PipelineError::BodyRead {
                        reason: err.to_string(),
                    });
                }
            },
        };

        self.buffered = Some(bytes.clone());
        Ok(bytes)
    }
}

impl Default for RequestBody {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Full;

    #[tokio::test]
    async fn test_reads_once_and_buffers() {
        let mut body = RequestBody::streaming(Full::new(Bytes::from_static(b"hello")), 16);
        assert!(!body.is_buffered());
        assert_eq!(body.bytes().await.unwrap(), Bytes::from_static(b"hello"));
        assert!(body.is_buffered());
        assert_eq!(body.bytes().await.unwrap(), Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn test_limit_exceeded() {
        let mut body = RequestBody::streaming(Full::new(Bytes::from(vec![0u8; 32])), 8);
        let err = body.bytes().await.unwrap_err();
        assert!(matches!(err, PipelineError::PayloadTooLarge { limit: 8 }));
    }

    #[tokio::test]
    async fn test_empty() {
        let mut body = RequestBody::empty();
        assert!(body.bytes().await.unwrap().is_empty());
    }
}
