// Transport read logic

use std::cmp;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::log::Logger;
use crate::rtmp::RTMP_BUFFER_CACHE_SIZE;

/// Buffered reader over the session transport
///
/// Keeps the received-bytes accounting used to trigger the
/// acknowledgement messages the server expects
pub struct SessionReader<TR: AsyncRead + Unpin> {
    /// The transport read half
    stream: TR,

    /// Receive buffer
    buffer: Vec<u8>,

    /// Offset of the first pending byte in the buffer
    buffer_start: usize,

    /// Number of pending bytes in the buffer
    buffer_size: usize,

    /// Total bytes received
    pub bytes_in: u64,

    /// Value of bytes_in when the last acknowledgement was sent
    pub bytes_in_sent: u64,

    /// Set when the last read failed due to the receive timeout
    /// A timeout does not kill the transport, the caller may retry
    pub timed_out: bool,

    /// Receive timeout
    timeout: Duration,
}

impl<TR: AsyncRead + Unpin> SessionReader<TR> {
    /// Creates a reader over a transport read half
    /// stream - The read half
    /// timeout_seconds - Receive timeout (seconds)
    pub fn new(stream: TR, timeout_seconds: u32) -> SessionReader<TR> {
        SessionReader {
            stream,
            buffer: vec![0; RTMP_BUFFER_CACHE_SIZE],
            buffer_start: 0,
            buffer_size: 0,
            bytes_in: 0,
            bytes_in_sent: 0,
            timed_out: false,
            timeout: Duration::from_secs(timeout_seconds as u64),
        }
    }

    /// Fills the receive buffer with a single transport read
    /// Only called when the buffer is empty
    async fn fill_buffer(&mut self, logger: &Logger) -> Result<(), ()> {
        let read_future = self.stream.read(&mut self.buffer);

        match tokio::time::timeout(self.timeout, read_future).await {
            Ok(Ok(0)) => {
                logger.log_debug("RTMP socket closed by server");
                Err(())
            }
            Ok(Ok(n)) => {
                self.buffer_start = 0;
                self.buffer_size = n;
                Ok(())
            }
            Ok(Err(e)) => {
                logger.log_error(&format!("RTMP receive error: {}", e));
                Err(())
            }
            Err(_) => {
                self.timed_out = true;
                logger.log_debug("RTMP receive timed out");
                Err(())
            }
        }
    }

    /// Reads an exact number of bytes from the transport
    /// out - Destination buffer, fully filled on success
    /// logger - Session logger
    ///
    /// On failure the caller must check timed_out: a timeout leaves
    /// the transport usable, any other failure means it is dead
    pub async fn read_n(&mut self, out: &mut [u8], logger: &Logger) -> Result<(), ()> {
        self.timed_out = false;

        let mut pos: usize = 0;

        while pos < out.len() {
            if self.buffer_size == 0 {
                self.fill_buffer(logger).await?;
            }

            let count = cmp::min(out.len() - pos, self.buffer_size);

            out[pos..pos + count]
                .copy_from_slice(&self.buffer[self.buffer_start..self.buffer_start + count]);

            self.buffer_start += count;
            self.buffer_size -= count;
            pos += count;

            self.bytes_in += count as u64;
        }

        Ok(())
    }

    /// Reads a single byte from the transport
    /// logger - Session logger
    pub async fn read_byte(&mut self, logger: &Logger) -> Result<u8, ()> {
        let mut b = [0u8; 1];
        self.read_n(&mut b, logger).await?;
        Ok(b[0])
    }

    /// Returns true when enough bytes arrived since the last
    /// acknowledgement to owe the server a new one
    /// client_bw - Current client bandwidth setting
    pub fn ack_due(&self, client_bw: u32) -> bool {
        self.bytes_in > self.bytes_in_sent + (client_bw as u64) / 2
    }

    /// Marks the acknowledgement as sent for the current byte count
    pub fn mark_ack_sent(&mut self) {
        self.bytes_in_sent = self.bytes_in;
    }

    /// Resets the counters and drops any buffered bytes
    pub fn reset(&mut self) {
        self.buffer_start = 0;
        self.buffer_size = 0;
        self.bytes_in = 0;
        self.bytes_in_sent = 0;
        self.timed_out = false;
    }
}

// Tests
