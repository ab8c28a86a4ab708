// RTMP message builders

use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Instant;

use byteorder::{BigEndian, ByteOrder};

use crate::amf::AMF0Value;
use crate::session::RtmpLink;

use super::{
    RtmpPacket, CTRL_SWF_VERIFICATION_RESPONSE, RTMP_CHANNEL_INVOKE, RTMP_CHANNEL_MEDIA,
    RTMP_CHANNEL_PROTOCOL, RTMP_TYPE_ACKNOWLEDGEMENT, RTMP_TYPE_EVENT, RTMP_TYPE_INVOKE,
    RTMP_TYPE_WINDOW_ACKNOWLEDGEMENT_SIZE, SWF_VERIFICATION_RESPONSE_SIZE,
};

static START_TIME: LazyLock<Instant> = LazyLock::new(Instant::now);

/// Gets the process uptime in milliseconds
/// Used for the timestamp field of outgoing packets
pub fn rtmp_get_time() -> u32 {
    START_TIME.elapsed().as_millis() as u32
}

/// Makes an invoke packet on the given channel
/// channel_id - Channel to send the invoke on
/// stream_id - Message stream ID
/// body - Encoded AMF0 body
fn make_invoke_packet(channel_id: u32, stream_id: u32, body: Vec<u8>) -> RtmpPacket {
    let mut packet = RtmpPacket::new_blank();

    packet.header.channel_id = channel_id;
    packet.header.packet_type = RTMP_TYPE_INVOKE;
    packet.header.stream_id = stream_id;
    packet.payload = body;
    packet.header.length = packet.payload.len();

    packet
}

/// Makes the connect invoke message
/// link - Link parameters of the session
pub fn rtmp_make_connect_message(link: &RtmpLink) -> RtmpPacket {
    let mut body = AMF0Value::String {
        value: "connect".to_string(),
    }
    .encode();

    body.extend(AMF0Value::Number { value: 1.0 }.encode());

    let mut cmd_obj: HashMap<String, AMF0Value> = HashMap::new();

    if !link.app.is_empty() {
        cmd_obj.insert(
            "app".to_string(),
            AMF0Value::String {
                value: link.app.clone(),
            },
        );
    }

    if !link.flash_ver.is_empty() {
        cmd_obj.insert(
            "flashVer".to_string(),
            AMF0Value::String {
                value: link.flash_ver.clone(),
            },
        );
    }

    if !link.swf_url.is_empty() {
        cmd_obj.insert(
            "swfUrl".to_string(),
            AMF0Value::String {
                value: link.swf_url.clone(),
            },
        );
    }

    if !link.tc_url.is_empty() {
        cmd_obj.insert(
            "tcUrl".to_string(),
            AMF0Value::String {
                value: link.tc_url.clone(),
            },
        );
    }

    cmd_obj.insert("fpad".to_string(), AMF0Value::Bool { value: false });
    cmd_obj.insert("capabilities".to_string(), AMF0Value::Number { value: 15.0 });
    cmd_obj.insert(
        "audioCodecs".to_string(),
        AMF0Value::Number {
            value: link.audio_codecs,
        },
    );
    cmd_obj.insert(
        "videoCodecs".to_string(),
        AMF0Value::Number {
            value: link.video_codecs,
        },
    );
    cmd_obj.insert(
        "videoFunction".to_string(),
        AMF0Value::Number { value: 1.0 },
    );

    if !link.page_url.is_empty() {
        cmd_obj.insert(
            "pageUrl".to_string(),
            AMF0Value::String {
                value: link.page_url.clone(),
            },
        );
    }

    // AMF0 only, AMF3 is not supported
    cmd_obj.insert(
        "objectEncoding".to_string(),
        AMF0Value::Number { value: 0.0 },
    );

    body.extend(
        AMF0Value::Object {
            properties: cmd_obj,
        }
        .encode(),
    );

    // Auth string, appended after the command object
    if !link.auth.is_empty() {
        body.push(0x01);
        body.push(0x01);

        body.extend(
            AMF0Value::String {
                value: link.auth.clone(),
            }
            .encode(),
        );
    }

    make_invoke_packet(RTMP_CHANNEL_INVOKE, 0, body)
}

/// Makes the createStream invoke message
/// txn - Transaction ID
pub fn rtmp_make_create_stream_message(txn: f64) -> RtmpPacket {
    let mut body = AMF0Value::String {
        value: "createStream".to_string(),
    }
    .encode();

    body.extend(AMF0Value::Number { value: txn }.encode());
    body.extend(AMF0Value::Null.encode());

    make_invoke_packet(RTMP_CHANNEL_INVOKE, 0, body)
}

/// Makes the play invoke message
/// link - Link parameters of the session
/// stream_id - Stream to play
pub fn rtmp_make_play_message(link: &RtmpLink, stream_id: u32) -> RtmpPacket {
    let mut body = AMF0Value::String {
        value: "play".to_string(),
    }
    .encode();

    body.extend(AMF0Value::Number { value: 0.0 }.encode());
    body.extend(AMF0Value::Null.encode());

    body.extend(
        AMF0Value::String {
            value: link.playpath.clone(),
        }
        .encode(),
    );

    // Start argument: -1000 requests a live stream, a non negative
    // value requests a recorded stream from that millisecond offset
    if link.live {
        body.extend(AMF0Value::Number { value: -1000.0 }.encode());
    } else if link.seek_time > 0.0 {
        body.extend(
            AMF0Value::Number {
                value: link.seek_time,
            }
            .encode(),
        );
    } else {
        body.extend(AMF0Value::Number { value: 0.0 }.encode());
    }

    // Length argument, only when a play duration was requested
    if link.length > 0 {
        body.extend(
            AMF0Value::Number {
                value: link.length as f64,
            }
            .encode(),
        );
    }

    make_invoke_packet(RTMP_CHANNEL_MEDIA, stream_id, body)
}

/// Makes the pause toggle invoke message
/// pause - True to pause, false to resume
/// time - Timestamp (milliseconds) the pause refers to
pub fn rtmp_make_pause_message(pause: bool, time: f64) -> RtmpPacket {
    let mut body = AMF0Value::String {
        value: "pause".to_string(),
    }
    .encode();

    body.extend(AMF0Value::Number { value: 0.0 }.encode());
    body.extend(AMF0Value::Null.encode());
    body.extend(AMF0Value::Bool { value: pause }.encode());
    body.extend(AMF0Value::Number { value: time }.encode());

    make_invoke_packet(RTMP_CHANNEL_MEDIA, 0, body)
}

/// Makes the deleteStream invoke message (no response expected)
/// stream_id - Stream to delete
pub fn rtmp_make_delete_stream_message(stream_id: f64) -> RtmpPacket {
    let mut body = AMF0Value::String {
        value: "deleteStream".to_string(),
    }
    .encode();

    body.extend(AMF0Value::Number { value: 0.0 }.encode());
    body.extend(AMF0Value::Null.encode());
    body.extend(AMF0Value::Number { value: stream_id }.encode());

    make_invoke_packet(RTMP_CHANNEL_INVOKE, 0, body)
}

/// Makes the FCSubscribe invoke message
/// subscribe_path - Path to subscribe to
pub fn rtmp_make_fc_subscribe_message(subscribe_path: &str) -> RtmpPacket {
    let mut body = AMF0Value::String {
        value: "FCSubscribe".to_string(),
    }
    .encode();

    body.extend(AMF0Value::Number { value: 4.0 }.encode());
    body.extend(AMF0Value::Null.encode());
    body.extend(
        AMF0Value::String {
            value: subscribe_path.to_string(),
        }
        .encode(),
    );

    make_invoke_packet(RTMP_CHANNEL_INVOKE, 0, body)
}

/// Makes the bgHasStream invoke message
/// id - Transaction ID
/// playpath - Path of the stream to check
pub fn rtmp_make_bg_has_stream_message(id: f64, playpath: &str) -> RtmpPacket {
    let mut body = AMF0Value::String {
        value: "bgHasStream".to_string(),
    }
    .encode();

    body.extend(AMF0Value::Number { value: id }.encode());
    body.extend(AMF0Value::Null.encode());
    body.extend(
        AMF0Value::String {
            value: playpath.to_string(),
        }
        .encode(),
    );

    make_invoke_packet(RTMP_CHANNEL_INVOKE, 0, body)
}

/// Makes the _checkbw invoke message
pub fn rtmp_make_check_bw_message() -> RtmpPacket {
    let mut body = AMF0Value::String {
        value: "_checkbw".to_string(),
    }
    .encode();

    body.extend(AMF0Value::Number { value: 0.0 }.encode());
    body.extend(AMF0Value::Null.encode());

    let mut packet = make_invoke_packet(RTMP_CHANNEL_INVOKE, 0, body);

    packet.header.timestamp = rtmp_get_time() as i64;

    packet
}

/// Makes the _result reply to a _onbwcheck probe
/// txn - Transaction ID the peer sent
/// counter - Probe counter value
pub fn rtmp_make_check_bw_result_message(txn: f64, counter: u32) -> RtmpPacket {
    let mut body = AMF0Value::String {
        value: "_result".to_string(),
    }
    .encode();

    body.extend(AMF0Value::Number { value: txn }.encode());
    body.extend(AMF0Value::Null.encode());
    body.extend(AMF0Value::Number {
        value: counter as f64,
    }
    .encode());

    let mut packet = make_invoke_packet(RTMP_CHANNEL_INVOKE, 0, body);

    packet.header.timestamp = (0x16 * counter) as i64;

    packet
}

/// Makes the server bandwidth (window acknowledgement size) message
/// bandwidth - Window size in bytes
pub fn rtmp_make_server_bw_message(bandwidth: u32) -> RtmpPacket {
    let mut packet = RtmpPacket::new_blank();

    packet.header.channel_id = RTMP_CHANNEL_PROTOCOL;
    packet.header.packet_type = RTMP_TYPE_WINDOW_ACKNOWLEDGEMENT_SIZE;

    let mut body = vec![0; 4];
    BigEndian::write_u32(&mut body, bandwidth);

    packet.payload = body;
    packet.header.length = 4;

    packet
}

/// Makes the bytes received acknowledgement message
/// bytes_in - Total bytes received so far
pub fn rtmp_make_bytes_received_message(bytes_in: u32) -> RtmpPacket {
    let mut packet = RtmpPacket::new_blank();

    packet.header.channel_id = RTMP_CHANNEL_PROTOCOL;
    packet.header.packet_type = RTMP_TYPE_ACKNOWLEDGEMENT;

    let mut body = vec![0; 4];
    BigEndian::write_u32(&mut body, bytes_in);

    packet.payload = body;
    packet.header.length = 4;

    packet
}

/// Makes a user control (ping) message
/// ctrl_type - Event type
/// object - Event target (stream ID, timestamp to echo...)
/// time - Extra time argument, only used by some event types
pub fn rtmp_make_ctrl_message(ctrl_type: u16, object: u32, time: u32) -> RtmpPacket {
    let mut packet = RtmpPacket::new_blank();

    packet.header.channel_id = RTMP_CHANNEL_PROTOCOL;
    packet.header.packet_type = RTMP_TYPE_EVENT;
    packet.header.timestamp = rtmp_get_time() as i64;

    // Type 3 (set buffer length) carries both the stream ID and the
    // buffer time, every other short event carries just the target
    let size: usize = if ctrl_type == 0x03 { 10 } else { 6 };

    let mut body = vec![0; size];

    BigEndian::write_u16(&mut body[0..2], ctrl_type);
    BigEndian::write_u32(&mut body[2..6], object);

    if size > 6 {
        BigEndian::write_u32(&mut body[6..10], time);
    }

    packet.payload = body;
    packet.header.length = size;

    packet
}

/// Makes the SWF verification response control message
/// response - The 42 byte verification response computed from the handshake
pub fn rtmp_make_swf_verify_message(
    response: &[u8; SWF_VERIFICATION_RESPONSE_SIZE],
) -> RtmpPacket {
    let mut packet = RtmpPacket::new_blank();

    packet.header.channel_id = RTMP_CHANNEL_PROTOCOL;
    packet.header.packet_type = RTMP_TYPE_EVENT;
    packet.header.timestamp = rtmp_get_time() as i64;

    let mut body = vec![0; 2 + SWF_VERIFICATION_RESPONSE_SIZE];

    BigEndian::write_u16(&mut body[0..2], CTRL_SWF_VERIFICATION_RESPONSE);
    body[2..].copy_from_slice(response);

    packet.payload = body;
    packet.header.length = 2 + SWF_VERIFICATION_RESPONSE_SIZE;

    packet
}

// Tests
