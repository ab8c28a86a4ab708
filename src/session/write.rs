// Transport write logic

use std::io::Error;

use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Write bytes to the session write stream
/// The bytes are fully written before returning
pub async fn session_write_bytes<TW: AsyncWrite + Unpin>(
    write_stream: &mut TW,
    bytes: &[u8],
) -> Result<(), Error> {
    write_stream.write_all(bytes).await
}
