// Session cleanup logic

use tokio::io::{AsyncRead, AsyncWrite};

use crate::rtmp::{
    RTMP_DEFAULT_CHUNK_SIZE, RTMP_DEFAULT_CLIENT_BW, RTMP_DEFAULT_CLIENT_BW2,
    RTMP_DEFAULT_SERVER_BW,
};

use super::RtmpSession;

impl<TR: AsyncRead + Unpin, TW: AsyncWrite + Unpin> RtmpSession<TR, TW> {
    /// Closes the session
    ///
    /// Every piece of protocol state goes back to its default:
    /// channel tables and pending calls are dropped, bandwidth and
    /// chunk size return to their initial values. The transport is
    /// released when the session itself is dropped.
    pub fn close(&mut self) {
        if self.alive {
            self.logger.log_debug("Closing connection");
        }

        self.alive = false;

        self.stream_id = -1;
        self.in_chunk_size = RTMP_DEFAULT_CHUNK_SIZE;
        self.bw_check_counter = 0;

        self.client_bw = RTMP_DEFAULT_CLIENT_BW;
        self.client_bw2 = RTMP_DEFAULT_CLIENT_BW2;
        self.server_bw = RTMP_DEFAULT_SERVER_BW;

        self.channels_in.clear();
        self.channels_out.clear();
        self.method_calls.clear();

        self.playing = false;

        self.reader.reset();
    }
}

// Tests
