//! Bidirectional byte relay with an optional pre-forwarding hook.

use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::Result;

/// Verdict of a [`ConnectionAuthorizer`] on a freshly accepted client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    /// Open the pipe. `preamble` holds bytes already consumed from the
    /// client and must reach upstream first, unmodified.
    Forward {
        /// Bytes read during authorization.
        preamble: Vec<u8>,
    },
    /// Refuse the client. `response` is written back before closing; the
    /// upstream is never contacted.
    Reject {
        /// Raw response bytes for the client.
        response: Vec<u8>,
    },
}

/// Hook deciding whether a client may be forwarded.
///
/// Implementations may read from the client to inspect a protocol header
/// but must hand every consumed byte back through
/// [`AuthDecision::Forward`].
pub trait ConnectionAuthorizer: Send + Sync {
    /// Inspect the start of the client stream and decide.
    ///
    /// # Errors
    ///
    /// Returns an error if reading from the client fails; the connection is
    /// then dropped without a response.
    fn authorize<'a>(
        &'a self,
        client: &'a mut (dyn AsyncRead + Unpin + Send),
    ) -> Pin<Box<dyn Future<Output = Result<AuthDecision>> + Send + 'a>>;
}

/// Byte counts relayed in each direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Client to upstream, including the preamble.
    pub to_upstream: u64,
    /// Upstream to client.
    pub to_client: u64,
}

/// Relay bytes between `client` and `upstream` until either side closes.
///
/// `preamble` is written to `upstream` before relaying starts. Bytes are
/// forwarded unmodified and in order in both directions.
///
/// # Errors
///
/// Returns the underlying I/O error if either side fails mid-stream.
pub async fn pipe<C, U>(
    client: &mut C,
    upstream: &mut U,
    preamble: &[u8],
) -> std::io::Result<RelayStats>
where
    C: AsyncRead + AsyncWrite + Unpin + ?Sized,
    U: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    if !preamble.is_empty() {
        upstream.write_all(preamble).await?;
    }

    let (to_upstream, to_client) = tokio::io::copy_bidirectional(client, upstream).await?;
    Ok(RelayStats {
        to_upstream: to_upstream + preamble.len() as u64,
        to_client,
    })
}
