// Packet send logic

use byteorder::{BigEndian, ByteOrder};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::rtmp::{
    rtmp_make_bytes_received_message, rtmp_make_ctrl_message, RtmpPacket, RTMP_CHUNK_TYPE_0,
    RTMP_CHUNK_TYPE_1, RTMP_CHUNK_TYPE_2, RTMP_CHUNK_TYPE_3, RTMP_DEFAULT_CHUNK_SIZE,
    RTMP_TYPE_INVOKE,
};

use super::{session_write_bytes, RtmpSession};

impl<TR: AsyncRead + Unpin, TW: AsyncWrite + Unpin> RtmpSession<TR, TW> {
    /// Sends an RTMP packet, compressing the header against the
    /// previous packet sent on the same channel
    /// packet - The packet to send
    /// queue - True to remember the invoked method, for invokes that
    ///         expect a response
    pub async fn send_rtmp(&mut self, packet: &mut RtmpPacket, queue: bool) -> Result<(), ()> {
        // Pick the smallest header the previous packet on this
        // channel allows

        packet.header.format = match self.channels_out.get(&packet.header.channel_id) {
            None => RTMP_CHUNK_TYPE_0,
            Some(prev) => {
                if prev.length == packet.header.length {
                    if prev.stream_id == packet.header.stream_id {
                        RTMP_CHUNK_TYPE_3
                    } else {
                        RTMP_CHUNK_TYPE_2
                    }
                } else {
                    RTMP_CHUNK_TYPE_1
                }
            }
        };

        let bytes = packet.create_chunks(RTMP_DEFAULT_CHUNK_SIZE);

        if let Err(e) = session_write_bytes(&mut self.write_stream, &bytes).await {
            self.logger
                .log_error(&format!("RTMP send error: {} ({} bytes)", e, bytes.len()));
            self.alive = false;
            return Err(());
        }

        // Remember the method name so the response can be matched
        // once the server replies

        if queue && packet.header.packet_type == RTMP_TYPE_INVOKE {
            if let Some(method) = decode_invoke_method(&packet.payload) {
                self.logger.log_debug(&format!("Invoking {}", method));
                self.method_calls.push(method);
            }
        }

        self.channels_out
            .insert(packet.header.channel_id, packet.header.clone());

        Ok(())
    }

    /// Sends a user control (ping) message
    /// ctrl_type - Event type
    /// object - Event target (stream ID, echoed timestamp...)
    /// time - Extra time argument, only used by some event types
    pub async fn send_ctrl(&mut self, ctrl_type: u16, object: u32, time: u32) -> Result<(), ()> {
        self.logger
            .log_debug(&format!("Sending ctrl, type: 0x{:04x}", ctrl_type));

        let mut packet = rtmp_make_ctrl_message(ctrl_type, object, time);

        self.send_rtmp(&mut packet, false).await
    }

    /// Sends the bytes received acknowledgement when enough bytes
    /// arrived since the previous one
    pub async fn send_bytes_received_if_due(&mut self) -> Result<(), ()> {
        if !self.reader.ack_due(self.client_bw) {
            return Ok(());
        }

        let mut packet = rtmp_make_bytes_received_message(self.reader.bytes_in as u32);

        self.send_rtmp(&mut packet, false).await?;

        self.reader.mark_ack_sent();

        Ok(())
    }
}

/// Decodes the method name from the body of an invoke message
fn decode_invoke_method(body: &[u8]) -> Option<String> {
    if body.len() < 3 || body[0] != 0x02 {
        return None;
    }

    let len = BigEndian::read_u16(&body[1..3]) as usize;

    if body.len() < 3 + len {
        return None;
    }

    Some(String::from_utf8_lossy(&body[3..3 + len]).to_string())
}

// Tests

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::Logger;
    use crate::rtmp::{rtmp_make_check_bw_message, RTMP_TYPE_VIDEO};
    use crate::session::{RtmpLink, SessionReader};
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf};

    fn make_session_pair() -> (
        RtmpSession<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>,
        RtmpSession<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>,
    ) {
        let (near, far) = tokio::io::duplex(1 << 20);

        let (near_read, near_write) = tokio::io::split(near);
        let (far_read, far_write) = tokio::io::split(far);

        let sender = RtmpSession::new(
            RtmpLink::new_blank(),
            SessionReader::new(near_read, 5),
            near_write,
            Logger::new_disabled(),
        );

        let receiver = RtmpSession::new(
            RtmpLink::new_blank(),
            SessionReader::new(far_read, 5),
            far_write,
            Logger::new_disabled(),
        );

        (sender, receiver)
    }

    fn make_packet(channel: u32, msg_type: u32, stream_id: u32, ts: i64, body: Vec<u8>) -> RtmpPacket {
        let mut packet = RtmpPacket::new_blank();

        packet.header.channel_id = channel;
        packet.header.packet_type = msg_type;
        packet.header.stream_id = stream_id;
        packet.header.timestamp = ts;
        packet.header.length = body.len();
        packet.payload = body;

        packet
    }

    #[tokio::test]
    async fn test_send_rtmp_header_compression_round_trip() {
        let (mut sender, mut receiver) = make_session_pair();

        // First packet on the channel must use the full header
        let mut first = make_packet(8, RTMP_TYPE_VIDEO, 1, 100, vec![0x01; 10]);
        sender.send_rtmp(&mut first, false).await.unwrap();
        assert_eq!(first.header.format, RTMP_CHUNK_TYPE_0);

        // Different length: medium header, timestamp becomes a delta
        let mut second = make_packet(8, RTMP_TYPE_VIDEO, 1, 50, vec![0x02; 20]);
        sender.send_rtmp(&mut second, false).await.unwrap();
        assert_eq!(second.header.format, RTMP_CHUNK_TYPE_1);

        // Same length, same stream: minimum header
        let mut third = make_packet(8, RTMP_TYPE_VIDEO, 1, 0, vec![0x03; 20]);
        sender.send_rtmp(&mut third, false).await.unwrap();
        assert_eq!(third.header.format, RTMP_CHUNK_TYPE_3);

        // Same length, different stream: small header
        let mut fourth = make_packet(8, RTMP_TYPE_VIDEO, 2, 0, vec![0x04; 20]);
        sender.send_rtmp(&mut fourth, false).await.unwrap();
        assert_eq!(fourth.header.format, RTMP_CHUNK_TYPE_2);

        let decoded_first = receiver.read_packet().await.unwrap().expect("ready");
        assert_eq!(decoded_first.header.channel_id, 8);
        assert_eq!(decoded_first.header.packet_type, RTMP_TYPE_VIDEO);
        assert_eq!(decoded_first.header.stream_id, 1);
        assert_eq!(decoded_first.header.timestamp, 100);
        assert_eq!(decoded_first.payload, vec![0x01; 10]);

        let decoded_second = receiver.read_packet().await.unwrap().expect("ready");
        assert_eq!(decoded_second.header.timestamp, 150);
        assert_eq!(decoded_second.payload, vec![0x02; 20]);

        // The minimum header carries nothing: the stored 50 ms delta
        // and stream id are reused on the receiving side
        let decoded_third = receiver.read_packet().await.unwrap().expect("ready");
        assert_eq!(decoded_third.header.timestamp, 200);
        assert_eq!(decoded_third.header.stream_id, 1);
        assert_eq!(decoded_third.payload, vec![0x03; 20]);

        let decoded_fourth = receiver.read_packet().await.unwrap().expect("ready");
        assert_eq!(decoded_fourth.header.timestamp, 200);
        assert_eq!(decoded_fourth.payload, vec![0x04; 20]);
    }

    #[tokio::test]
    async fn test_send_rtmp_chunks_large_payload() {
        let (mut sender, mut receiver) = make_session_pair();

        let body: Vec<u8> = (0..1000).map(|i| (i % 251) as u8).collect();

        let mut packet = make_packet(3, RTMP_TYPE_INVOKE, 0, 0, body.clone());
        sender.send_rtmp(&mut packet, false).await.unwrap();

        loop {
            if let Some(decoded) = receiver.read_packet().await.unwrap() {
                assert_eq!(decoded.payload, body);
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_send_rtmp_queues_invoke_method() {
        let (mut sender, _receiver) = make_session_pair();

        let mut packet = rtmp_make_check_bw_message();
        sender.send_rtmp(&mut packet, true).await.unwrap();

        assert_eq!(sender.method_calls, vec!["_checkbw".to_string()]);

        // Unqueued invokes must not be remembered
        let mut packet2 = rtmp_make_check_bw_message();
        sender.send_rtmp(&mut packet2, false).await.unwrap();

        assert_eq!(sender.method_calls.len(), 1);
    }

    #[test]
    fn test_decode_invoke_method() {
        let body = vec![0x02, 0x00, 0x04, b'p', b'l', b'a', b'y', 0x00];

        assert_eq!(decode_invoke_method(&body), Some("play".to_string()));
        assert_eq!(decode_invoke_method(&[0x00, 0x01]), None);
        assert_eq!(decode_invoke_method(&[]), None);
    }
}
