// Session state

use std::collections::HashMap;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::log::Logger;
use crate::rtmp::{
    RtmpPacketHeader, RTMP_DEFAULT_BUFFER_MS, RTMP_DEFAULT_CHUNK_SIZE, RTMP_DEFAULT_CLIENT_BW,
    RTMP_DEFAULT_CLIENT_BW2, RTMP_DEFAULT_SERVER_BW, SWF_VERIFICATION_RESPONSE_SIZE,
};

use super::{RtmpLink, SessionReader};

/// Pause and resume state of the playing stream
///
/// The four states are behaviorally distinct: a pause is first
/// requested, then acknowledged by the server with a Stream EOF
/// event, and after resuming the stale packets the server replays
/// must be dropped until the pre-pause timestamp is passed
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PauseState {
    /// Normal playback
    Playing,

    /// Pause sent, waiting for the server to acknowledge
    PauseRequested,

    /// Server acknowledged the pause with a Stream EOF event
    PauseAcked,

    /// Unpause sent, dropping packets up to the pause timestamp
    Resuming,
}

/// Reassembly state of one inbound channel
///
/// The last header fields double as the defaults for compressed
/// headers arriving later on the same channel
pub struct RtmpChannelState {
    /// Last header seen on the channel
    pub header: RtmpPacketHeader,

    /// Accumulated absolute timestamp, relative deltas are summed here
    pub clock: i64,

    /// True if the in-progress message carries an absolute timestamp
    pub has_abs_timestamp: bool,

    /// Reassembly buffer for the in-progress message
    pub payload: Vec<u8>,

    /// Bytes of the in-progress message received so far
    pub bytes_read: usize,
}

impl RtmpChannelState {
    /// Creates the state for a channel not seen before
    pub fn new_blank() -> RtmpChannelState {
        RtmpChannelState {
            header: RtmpPacketHeader::new_blank(),
            clock: 0,
            has_abs_timestamp: false,
            payload: Vec::new(),
            bytes_read: 0,
        }
    }
}

/// RTMP client session
///
/// Single owner of the transport and of every piece of protocol
/// state. All operations run sequentially on the caller's task.
pub struct RtmpSession<TR: AsyncRead + Unpin, TW: AsyncWrite + Unpin> {
    /// Link parameters
    pub link: RtmpLink,

    /// Session logger
    pub logger: Logger,

    /// Buffered transport reader
    pub reader: SessionReader<TR>,

    /// Transport write half
    pub write_stream: TW,

    /// False once the transport died or the session was closed
    pub alive: bool,

    /// Chunk size for inbound messages, the peer may raise it
    pub in_chunk_size: usize,

    /// Per-channel inbound state (header compression + reassembly)
    pub channels_in: HashMap<u32, RtmpChannelState>,

    /// Last header sent per channel, for outbound header compression
    pub channels_out: HashMap<u32, RtmpPacketHeader>,

    /// Server bandwidth (window acknowledgement size)
    pub server_bw: u32,

    /// Client bandwidth announced by the server
    pub client_bw: u32,

    /// Client bandwidth limit type
    pub client_bw2: u8,

    /// Counter for replies to the server's bandwidth probes
    pub bw_check_counter: u32,

    /// Stream ID of the created stream, -1 when no stream exists
    pub stream_id: i64,

    /// True once play was confirmed by the server
    pub playing: bool,

    /// Pause FSM state
    pub pausing: PauseState,

    /// Timestamp (ms) at which the pause was issued
    pub pause_stamp: i64,

    /// Channel the first media packet arrived on, 0 until known
    pub media_channel: u32,

    /// Timestamp (ms) of the last delivered media packet
    pub media_stamp: i64,

    /// Client buffer length (ms) reported to the server
    pub buffer_ms: u32,

    /// Stream duration (seconds) taken from onMetaData, 0 if unknown
    pub duration: f64,

    /// Method names of invokes awaiting a response, in send order
    pub method_calls: Vec<String>,

    /// SWF verification response derived from the handshake
    pub swf_verification_response: Option<[u8; SWF_VERIFICATION_RESPONSE_SIZE]>,
}

impl<TR: AsyncRead + Unpin, TW: AsyncWrite + Unpin> RtmpSession<TR, TW> {
    /// Creates a session over an established transport
    /// link - Link parameters
    /// reader - Buffered reader over the transport read half
    /// write_stream - Transport write half
    /// logger - Session logger
    pub fn new(
        link: RtmpLink,
        reader: SessionReader<TR>,
        write_stream: TW,
        logger: Logger,
    ) -> RtmpSession<TR, TW> {
        RtmpSession {
            link,
            logger,
            reader,
            write_stream,
            alive: true,
            in_chunk_size: RTMP_DEFAULT_CHUNK_SIZE,
            channels_in: HashMap::new(),
            channels_out: HashMap::new(),
            server_bw: RTMP_DEFAULT_SERVER_BW,
            client_bw: RTMP_DEFAULT_CLIENT_BW,
            client_bw2: RTMP_DEFAULT_CLIENT_BW2,
            bw_check_counter: 0,
            stream_id: -1,
            playing: false,
            pausing: PauseState::Playing,
            pause_stamp: 0,
            media_channel: 0,
            media_stamp: 0,
            buffer_ms: RTMP_DEFAULT_BUFFER_MS,
            duration: 0.0,
            method_calls: Vec::new(),
            swf_verification_response: None,
        }
    }

    /// Returns true while the transport is usable
    pub fn is_connected(&self) -> bool {
        self.alive
    }

    /// Returns true if the last read failed due to the receive timeout
    pub fn is_timedout(&self) -> bool {
        self.reader.timed_out
    }

    /// Returns true once play was confirmed by the server
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Returns the stream duration (seconds) or 0 if not known yet
    pub fn get_duration(&self) -> f64 {
        self.duration
    }

    /// Sets the client buffer length (milliseconds)
    pub fn set_buffer_ms(&mut self, buffer_ms: u32) {
        self.buffer_ms = buffer_ms;
    }

    /// Gets the accumulated timestamp of an inbound channel
    /// channel_id - The channel
    pub fn get_channel_timestamp(&self, channel_id: u32) -> i64 {
        match self.channels_in.get(&channel_id) {
            Some(state) => state.clock,
            None => 0,
        }
    }
}
