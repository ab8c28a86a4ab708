// RTMP constants

// Chunk types
pub const RTMP_CHUNK_TYPE_0: u32 = 0; // 11-bytes: timestamp(3) + length(3) + stream type(1) + stream id(4)
pub const RTMP_CHUNK_TYPE_1: u32 = 1; // 7-bytes: delta(3) + length(3) + stream type(1)
pub const RTMP_CHUNK_TYPE_2: u32 = 2; // 3-bytes: delta(3)
pub const RTMP_CHUNK_TYPE_3: u32 = 3; // 0-byte

// RTMP channel types
pub const RTMP_CHANNEL_PROTOCOL: u32 = 2;
pub const RTMP_CHANNEL_INVOKE: u32 = 3;
pub const RTMP_CHANNEL_MEDIA: u32 = 8;

/// Gets RTMP header size from the chunk type
pub fn get_rtmp_header_size(header_byte: u8) -> usize {
    match header_byte {
        0 => 11,
        1 => 7,
        2 => 3,
        _ => 0,
    }
}

// Packet types

/* Protocol Control Messages */
pub const RTMP_TYPE_SET_CHUNK_SIZE: u32 = 1;
pub const RTMP_TYPE_ABORT: u32 = 2;
pub const RTMP_TYPE_ACKNOWLEDGEMENT: u32 = 3; // bytes read report
pub const RTMP_TYPE_WINDOW_ACKNOWLEDGEMENT_SIZE: u32 = 5; // server bandwidth
pub const RTMP_TYPE_SET_PEER_BANDWIDTH: u32 = 6; // client bandwidth

/* User Control Messages Event (4) */
pub const RTMP_TYPE_EVENT: u32 = 4;

pub const RTMP_TYPE_AUDIO: u32 = 8;
pub const RTMP_TYPE_VIDEO: u32 = 9;

/* Data Message */
pub const RTMP_TYPE_FLEX_STREAM: u32 = 15; // AMF3
pub const RTMP_TYPE_DATA: u32 = 18; // AMF0

/* Shared Object Message */
pub const RTMP_TYPE_FLEX_OBJECT: u32 = 16; // AMF3
pub const RTMP_TYPE_SHARED_OBJECT: u32 = 19; // AMF0

/* Command Message */
pub const RTMP_TYPE_FLEX_MESSAGE: u32 = 17; // AMF3
pub const RTMP_TYPE_INVOKE: u32 = 20; // AMF0

/* Aggregate Message */
pub const RTMP_TYPE_AGGREGATE: u32 = 22;

// Control event types (inbound)

pub const STREAM_BEGIN: u16 = 0x00;
pub const STREAM_EOF: u16 = 0x01;
pub const STREAM_DRY: u16 = 0x02;
pub const STREAM_IS_RECORDED: u16 = 0x04;
pub const STREAM_PING: u16 = 0x06;
pub const STREAM_BUFFER_EMPTY: u16 = 0x1f;
pub const STREAM_BUFFER_READY: u16 = 0x20;

// Control event types (outbound)

pub const CTRL_SET_BUFFER_LENGTH: u16 = 0x03;
pub const CTRL_PONG: u16 = 0x07;
pub const CTRL_SWF_VERIFICATION_RESPONSE: u16 = 0x1b;

pub const SWF_VERIFICATION_REQUEST: u16 = 0x1a;

// Protocol defaults

/// Default RTMP port
pub const RTMP_DEFAULT_PORT: u16 = 1935;

/// Default SOCKS4 proxy port
pub const SOCKS_DEFAULT_PORT: u16 = 1080;

/// Size of a chunk sent by this client. The peer may raise its own
/// chunk size via a Set Chunk Size message, ours stays fixed.
pub const RTMP_DEFAULT_CHUNK_SIZE: usize = 128;

/// Size of the handshake signatures (C1/C2/S1/S2)
pub const RTMP_SIG_SIZE: usize = 1536;

/// Protocol version sent in C0
pub const RTMP_VERSION: u8 = 0x03;

/// Size of the transport receive buffer
pub const RTMP_BUFFER_CACHE_SIZE: usize = 16384;

/// Default bandwidth values, restored when a session is closed
pub const RTMP_DEFAULT_CLIENT_BW: u32 = 2500000;
pub const RTMP_DEFAULT_CLIENT_BW2: u8 = 2;
pub const RTMP_DEFAULT_SERVER_BW: u32 = 2500000;

/// Default client buffer length (milliseconds)
pub const RTMP_DEFAULT_BUFFER_MS: u32 = 300;

/// Largest message body this client will reassemble. Declared lengths
/// past this point can only come from a corrupt or hostile peer.
pub const RTMP_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Size of the SWF verification response payload (type + digest block)
pub const SWF_VERIFICATION_RESPONSE_SIZE: usize = 42;
