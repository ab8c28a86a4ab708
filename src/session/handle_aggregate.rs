// Aggregate (FLV) packet handling logic

use byteorder::{BigEndian, ByteOrder};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::flv::{FLV_PREV_TAG_SIZE, FLV_TAG_HEADER_SIZE};
use crate::rtmp::RtmpPacket;

use super::{PauseState, RtmpSession};

impl<TR: AsyncRead + Unpin, TW: AsyncWrite + Unpin> RtmpSession<TR, TW> {
    /// Walks the FLV tags packed in an aggregate message
    ///
    /// Metadata tags are routed to the notify handler, audio and
    /// video tags advance the media timestamp used by pause and
    /// resume. A tag overrunning the message body aborts the walk.
    /// packet - The aggregate packet
    pub fn handle_aggregate(&mut self, packet: &RtmpPacket) {
        let body = &packet.payload;

        let mut pos: usize = 0;
        let mut timestamp = packet.header.timestamp;

        while pos + FLV_TAG_HEADER_SIZE < body.len() {
            let data_size = BigEndian::read_u24(&body[pos + 1..pos + 4]) as usize;

            if pos + FLV_TAG_HEADER_SIZE + data_size + FLV_PREV_TAG_SIZE > body.len() {
                self.logger.log_warning("Stream corrupt?");
                break;
            }

            match body[pos] {
                0x12 => {
                    self.handle_notify(
                        &body[pos + FLV_TAG_HEADER_SIZE..pos + FLV_TAG_HEADER_SIZE + data_size],
                    );
                }
                0x08 | 0x09 => {
                    // 24 bit timestamp plus the extension byte on top
                    timestamp = BigEndian::read_u24(&body[pos + 4..pos + 7]) as i64;
                    timestamp |= (body[pos + 7] as i64) << 24;
                }
                _ => {}
            }

            pos += FLV_TAG_HEADER_SIZE + data_size + FLV_PREV_TAG_SIZE;
        }

        if self.pausing == PauseState::Playing {
            self.media_stamp = timestamp;
        }
    }
}

// Tests

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amf::AMF0Value;
    use crate::flv::make_flv_tag;
    use crate::log::Logger;
    use crate::rtmp::RTMP_TYPE_AGGREGATE;
    use crate::session::{RtmpLink, SessionReader};
    use std::collections::HashMap;
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf};

    fn make_test_session() -> RtmpSession<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>> {
        let (_far, near) = tokio::io::duplex(64);

        let (near_read, near_write) = tokio::io::split(near);

        RtmpSession::new(
            RtmpLink::new_blank(),
            SessionReader::new(near_read, 5),
            near_write,
            Logger::new_disabled(),
        )
    }

    fn make_aggregate_packet(body: Vec<u8>) -> RtmpPacket {
        let mut packet = RtmpPacket::new_blank();

        packet.header.packet_type = RTMP_TYPE_AGGREGATE;
        packet.header.length = body.len();
        packet.payload = body;

        packet
    }

    fn encode_metadata_payload(duration: f64) -> Vec<u8> {
        let mut properties: HashMap<String, AMF0Value> = HashMap::new();
        properties.insert("duration".to_string(), AMF0Value::Number { value: duration });

        let mut payload = AMF0Value::String {
            value: "onMetaData".to_string(),
        }
        .encode();

        payload.extend(AMF0Value::Object { properties }.encode());

        payload
    }

    #[tokio::test]
    async fn test_aggregate_routes_metadata_and_timestamps() {
        let mut session = make_test_session();

        let mut body = make_flv_tag(0x12, 0, &encode_metadata_payload(77.0));
        body.extend(make_flv_tag(0x08, 0x01000500, &[0u8; 100]));

        let packet = make_aggregate_packet(body);

        session.handle_aggregate(&packet);

        assert_eq!(session.get_duration(), 77.0);

        // Timestamp is rebuilt from the 24 bit field plus extension
        assert_eq!(session.media_stamp, 0x01000500);
    }

    #[tokio::test]
    async fn test_aggregate_aborts_on_overrun() {
        let mut session = make_test_session();

        let mut body = make_flv_tag(0x08, 1000, &[0u8; 10]);

        // A tag whose declared size overruns the message
        let mut bad_tag = vec![0x08];
        let mut b4 = [0u8; 4];
        BigEndian::write_u32(&mut b4, 5000);
        bad_tag.extend(&b4[1..]);
        bad_tag.extend(&[0u8; 7]);
        bad_tag.extend(&[0u8; 4]);

        body.extend(bad_tag);

        let packet = make_aggregate_packet(body);

        session.handle_aggregate(&packet);

        // Only the first, valid tag advanced the media timestamp
        assert_eq!(session.media_stamp, 1000);
    }

    #[tokio::test]
    async fn test_aggregate_does_not_advance_stamp_while_pausing() {
        let mut session = make_test_session();

        session.pausing = PauseState::Resuming;
        session.media_stamp = 9999;

        let body = make_flv_tag(0x09, 500, &[0u8; 20]);
        let packet = make_aggregate_packet(body);

        session.handle_aggregate(&packet);

        assert_eq!(session.media_stamp, 9999);
    }
}
