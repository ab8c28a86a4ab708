// RTMP packet model

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use super::{RTMP_CHUNK_TYPE_0, RTMP_CHUNK_TYPE_1, RTMP_CHUNK_TYPE_2, RTMP_CHUNK_TYPE_3};

/// Header of an RTMP packet
#[derive(Clone)]
pub struct RtmpPacketHeader {
    /// Timestamp (absolute or delta, depending on the format)
    pub timestamp: i64,

    /// Packet format (chunk type 0-3)
    pub format: u32,

    /// Channel ID
    pub channel_id: u32,

    /// Packet type
    pub packet_type: u32,

    /// Message stream ID
    pub stream_id: u32,

    // Payload length
    pub length: usize,
}

impl RtmpPacketHeader {
    /// Creates a blank header
    pub fn new_blank() -> RtmpPacketHeader {
        RtmpPacketHeader {
            timestamp: 0,
            format: 0,
            channel_id: 0,
            packet_type: 0,
            stream_id: 0,
            length: 0,
        }
    }

    /// Resets the header
    pub fn reset(&mut self) {
        *self = RtmpPacketHeader::new_blank();
    }
}

/// RTMP packet
#[derive(Clone)]
pub struct RtmpPacket {
    /// Packet header
    pub header: RtmpPacketHeader,

    /// True if the timestamp of the header is absolute
    pub has_abs_timestamp: bool,

    /// Packet payload
    pub payload: Vec<u8>,
}

impl RtmpPacket {
    /// Creates new blank RTMP packet
    pub fn new_blank() -> RtmpPacket {
        RtmpPacket {
            header: RtmpPacketHeader::new_blank(),
            has_abs_timestamp: false,
            payload: Vec::new(),
        }
    }

    /// Serializes a basic header for a RTMP packet
    /// format - Packet format
    /// channel_id - Packet channel ID
    /// Returns the serialized bytes
    pub fn serialize_basic_header(format: u32, channel_id: u32) -> Vec<u8> {
        if channel_id >= 64 + 255 {
            vec![
                ((format << 6) as u8) | 1,
                ((channel_id - 64) as u8),
                (((channel_id - 64) >> 8) as u8),
            ]
        } else if channel_id >= 64 {
            vec![(format << 6) as u8, ((channel_id - 64) as u8)]
        } else {
            vec![((format << 6) as u8) | (channel_id as u8)]
        }
    }

    /// Serializes the message header of a RTMP packet
    /// The included fields depend on the format set in the header
    /// Returns the serialized bytes
    pub fn serialize_chunk_message_header(&self) -> Vec<u8> {
        let mut out: Vec<u8> = Vec::new();

        if self.header.format <= RTMP_CHUNK_TYPE_2 {
            let mut b: Vec<u8> = vec![0; 4];

            BigEndian::write_u32(&mut b, (self.header.timestamp as u32) & 0xffffff);

            out.extend(&b[1..]);
        }

        if self.header.format <= RTMP_CHUNK_TYPE_1 {
            let mut b: Vec<u8> = vec![0; 4];

            BigEndian::write_u32(&mut b, self.header.length as u32);

            out.extend(&b[1..]);
            out.push(self.header.packet_type as u8);
        }

        if self.header.format == RTMP_CHUNK_TYPE_0 {
            let mut b: Vec<u8> = vec![0; 4];

            LittleEndian::write_u32(&mut b, self.header.stream_id);

            out.extend(b);
        }

        out
    }

    /// Creates the chunks for an RTMP packet
    /// out_chunk_size - Size of the output chunks
    /// Returns the full serialized byte stream for the packet
    pub fn create_chunks(&self, out_chunk_size: usize) -> Vec<u8> {
        let chunk_basic_header =
            Self::serialize_basic_header(self.header.format, self.header.channel_id);

        let chunk_basic_header_3 =
            Self::serialize_basic_header(RTMP_CHUNK_TYPE_3, self.header.channel_id);

        let chunk_message_header = self.serialize_chunk_message_header();

        let mut payload_size = self.header.length;

        if payload_size > self.payload.len() {
            payload_size = self.payload.len();
        }

        let mut chunks: Vec<u8> =
            Vec::with_capacity(chunk_basic_header.len() + chunk_message_header.len() + payload_size);

        chunks.extend(&chunk_basic_header);
        chunks.extend(&chunk_message_header);

        let mut payload_offset: usize = 0;

        while payload_size > 0 {
            if payload_size > out_chunk_size {
                chunks.extend(&self.payload[payload_offset..payload_offset + out_chunk_size]);

                payload_size -= out_chunk_size;
                payload_offset += out_chunk_size;

                chunks.extend(&chunk_basic_header_3);
            } else {
                chunks.extend(&self.payload[payload_offset..payload_offset + payload_size]);

                payload_size = 0;
            }
        }

        chunks
    }
}

// Tests

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_basic_header() {
        assert_eq!(RtmpPacket::serialize_basic_header(0, 3), vec![0x03]);
        assert_eq!(RtmpPacket::serialize_basic_header(3, 8), vec![0xc8]);
        assert_eq!(RtmpPacket::serialize_basic_header(1, 70), vec![0x40, 6]);
        assert_eq!(
            RtmpPacket::serialize_basic_header(2, 64 + 255 + 1),
            vec![0x81, 0x00, 0x01]
        );
    }

    #[test]
    fn test_serialize_message_header_type_0() {
        let mut packet = RtmpPacket::new_blank();

        packet.header.format = RTMP_CHUNK_TYPE_0;
        packet.header.timestamp = 0x010203;
        packet.header.length = 0x0405;
        packet.header.packet_type = 20;
        packet.header.stream_id = 1;

        let header = packet.serialize_chunk_message_header();

        assert_eq!(
            header,
            vec![0x01, 0x02, 0x03, 0x00, 0x04, 0x05, 20, 0x01, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_serialize_message_header_type_2() {
        let mut packet = RtmpPacket::new_blank();

        packet.header.format = RTMP_CHUNK_TYPE_2;
        packet.header.timestamp = 0x20;

        let header = packet.serialize_chunk_message_header();

        assert_eq!(header, vec![0x00, 0x00, 0x20]);
    }

    #[test]
    fn test_create_chunks_splits_payload() {
        let mut packet = RtmpPacket::new_blank();

        packet.header.format = RTMP_CHUNK_TYPE_0;
        packet.header.channel_id = 3;
        packet.header.packet_type = 20;
        packet.payload = vec![0xaa; 300];
        packet.header.length = packet.payload.len();

        let chunks = packet.create_chunks(128);

        // 1 basic byte + 11 header bytes + 300 payload + 2 continuation bytes
        assert_eq!(chunks.len(), 1 + 11 + 300 + 2);

        // Continuation markers after each full chunk
        assert_eq!(chunks[12 + 128], 0xc3);
        assert_eq!(chunks[12 + 128 + 1 + 128], 0xc3);
    }

    #[test]
    fn test_create_chunks_exact_multiple() {
        let mut packet = RtmpPacket::new_blank();

        packet.header.format = RTMP_CHUNK_TYPE_0;
        packet.header.channel_id = 3;
        packet.header.packet_type = 20;
        packet.payload = vec![0xbb; 256];
        packet.header.length = packet.payload.len();

        let chunks = packet.create_chunks(128);

        // No trailing continuation byte after the last chunk
        assert_eq!(chunks.len(), 1 + 11 + 256 + 1);
        assert_eq!(*chunks.last().unwrap(), 0xbb);
    }
}
