//! HTTP Basic shared-secret check for the control port.
//!
//! The request head of each new connection is buffered and scanned for an
//! `Authorization: Basic` header. The username is ignored; the password
//! must equal the configured token. Only the first request on a connection
//! is inspected: once admitted, the connection (including WebSocket
//! upgrades) is relayed transparently.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::relay::{AuthDecision, ConnectionAuthorizer};
use crate::{AppError, Result};

/// Upper bound on a buffered request head.
pub const MAX_HEAD_BYTES: usize = 16 * 1024;

/// Time a client gets to deliver its complete request head.
pub const HEAD_READ_TIMEOUT: Duration = Duration::from_secs(10);

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

const UNAUTHORIZED_BODY: &str = "<html><body><h1>401 Unauthorized</h1></body></html>";

/// Admits connections whose first request carries the configured token.
#[derive(Clone)]
pub struct BasicAuthorizer {
    token_digest: [u8; 32],
    head_timeout: Duration,
}

impl std::fmt::Debug for BasicAuthorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuthorizer").finish_non_exhaustive()
    }
}

impl BasicAuthorizer {
    /// Construct an authorizer for `token`.
    #[must_use]
    pub fn new(token: &str) -> Self {
        Self {
            token_digest: digest(token.as_bytes()),
            head_timeout: HEAD_READ_TIMEOUT,
        }
    }

    /// Override the request-head deadline.
    #[must_use]
    pub fn with_head_timeout(mut self, head_timeout: Duration) -> Self {
        self.head_timeout = head_timeout;
        self
    }

    /// Whether a complete request head carries a valid credential.
    #[must_use]
    pub fn head_is_authorized(&self, head: &[u8]) -> bool {
        let Ok(text) = std::str::from_utf8(head) else {
            return false;
        };

        text.split("\r\n")
            .skip(1)
            .filter_map(|line| line.split_once(':'))
            .filter(|(name, _)| name.trim().eq_ignore_ascii_case("authorization"))
            .filter_map(|(_, value)| basic_password(value))
            .any(|password| digest(password.as_bytes()) == self.token_digest)
    }
}

impl ConnectionAuthorizer for BasicAuthorizer {
    fn authorize<'a>(
        &'a self,
        client: &'a mut (dyn AsyncRead + Unpin + Send),
    ) -> Pin<Box<dyn Future<Output = Result<AuthDecision>> + Send + 'a>> {
        Box::pin(async move {
            let head = tokio::time::timeout(self.head_timeout, read_head(client))
                .await
                .map_err(|_| {
                    AppError::Gateway(format!(
                        "request head not received within {:?}",
                        self.head_timeout
                    ))
                })??;

            let Some((buf, head_len)) = head else {
                return Ok(AuthDecision::Reject {
                    response: header_too_large_response(),
                });
            };

            if self.head_is_authorized(&buf[..head_len]) {
                Ok(AuthDecision::Forward { preamble: buf })
            } else {
                Ok(AuthDecision::Reject {
                    response: unauthorized_response(),
                })
            }
        })
    }
}

/// Read until the end of the request head.
///
/// Returns the buffered bytes and the head length, or `None` once the head
/// exceeds [`MAX_HEAD_BYTES`].
async fn read_head(
    client: &mut (dyn AsyncRead + Unpin + Send),
) -> Result<Option<(Vec<u8>, usize)>> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0_u8; 4096];

    loop {
        if let Some(pos) = find_terminator(&buf) {
            let head_len = pos + HEAD_TERMINATOR.len();
            if head_len > MAX_HEAD_BYTES {
                return Ok(None);
            }
            return Ok(Some((buf, head_len)));
        }
        if buf.len() > MAX_HEAD_BYTES {
            return Ok(None);
        }

        let n = client
            .read(&mut chunk)
            .await
            .map_err(|err| AppError::Gateway(format!("failed to read request: {err}")))?;
        if n == 0 {
            return Err(AppError::Gateway(
                "client closed before completing request head".into(),
            ));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Extract the password from a `Basic` authorization header value.
///
/// Accepts `user:password` and `:password`; the username is discarded.
#[must_use]
pub fn basic_password(value: &str) -> Option<String> {
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (_user, password) = decoded.split_once(':')?;
    Some(password.to_owned())
}

/// `401` response sent to clients without a valid credential.
#[must_use]
pub fn unauthorized_response() -> Vec<u8> {
    format!(
        "HTTP/1.1 401 Unauthorized\r\n\
         WWW-Authenticate: Basic realm=\"DevTools\"\r\n\
         Content-Type: text/html\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\r\n{UNAUTHORIZED_BODY}",
        UNAUTHORIZED_BODY.len()
    )
    .into_bytes()
}

fn header_too_large_response() -> Vec<u8> {
    b"HTTP/1.1 431 Request Header Fields Too Large\r\n\
      Content-Length: 0\r\n\
      Connection: close\r\n\r\n"
        .to_vec()
}

fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(HEAD_TERMINATOR.len())
        .position(|window| window == HEAD_TERMINATOR)
}

// Compare digests so the check does not stop at the first differing byte.
fn digest(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}
