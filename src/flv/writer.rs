// FLV writer

use std::io::Error;

use byteorder::{BigEndian, ByteOrder};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::rtmp::{
    RtmpPacket, RTMP_TYPE_AGGREGATE, RTMP_TYPE_AUDIO, RTMP_TYPE_DATA, RTMP_TYPE_VIDEO,
};

/// Size of the header of an FLV tag
pub const FLV_TAG_HEADER_SIZE: usize = 11;

/// Size of the previous tag size trailer of an FLV tag
pub const FLV_PREV_TAG_SIZE: usize = 4;

/// FLV file header flag: the file carries audio
const FLV_FLAG_AUDIO: u8 = 0x04;

/// FLV file header flag: the file carries video
const FLV_FLAG_VIDEO: u8 = 0x01;

/// Builds one FLV tag (header + payload + previous tag size)
/// tag_type - FLV tag type (8 audio, 9 video, 18 script data)
/// timestamp - Tag timestamp (milliseconds)
/// payload - Tag payload
pub fn make_flv_tag(tag_type: u8, timestamp: i64, payload: &[u8]) -> Vec<u8> {
    let mut tag: Vec<u8> =
        Vec::with_capacity(FLV_TAG_HEADER_SIZE + payload.len() + FLV_PREV_TAG_SIZE);

    tag.push(tag_type);

    let mut b4 = [0u8; 4];

    BigEndian::write_u32(&mut b4, payload.len() as u32);
    tag.extend(&b4[1..]);

    BigEndian::write_u32(&mut b4, (timestamp as u32) & 0xffffff);
    tag.extend(&b4[1..]);
    tag.push(((timestamp >> 24) as u8) & 0xff);

    // Stream ID, always 0
    tag.extend(&[0u8; 3]);

    tag.extend(payload);

    BigEndian::write_u32(&mut b4, (FLV_TAG_HEADER_SIZE + payload.len()) as u32);
    tag.extend(&b4);

    tag
}

/// Writes the media packets of a play session as an FLV file
pub struct FlvWriter<W: AsyncWrite + Unpin> {
    /// The output stream
    stream: W,
}

impl<W: AsyncWrite + Unpin> FlvWriter<W> {
    /// Creates a writer over an output stream
    pub fn new(stream: W) -> FlvWriter<W> {
        FlvWriter { stream }
    }

    /// Writes the FLV file header
    /// has_audio - Mark the file as carrying audio
    /// has_video - Mark the file as carrying video
    pub async fn write_header(&mut self, has_audio: bool, has_video: bool) -> Result<(), Error> {
        let mut flags: u8 = 0;

        if has_audio {
            flags |= FLV_FLAG_AUDIO;
        }

        if has_video {
            flags |= FLV_FLAG_VIDEO;
        }

        let header: [u8; 13] = [
            b'F', b'L', b'V', 0x01, flags, 0x00, 0x00, 0x00, 0x09, // header size
            0x00, 0x00, 0x00, 0x00, // first previous tag size
        ];

        self.stream.write_all(&header).await
    }

    /// Writes one delivered media packet
    ///
    /// Audio, video and notify packets become a single tag. Aggregate
    /// packets are copied tag by tag with their timestamps rebased to
    /// the absolute timestamp of the carrying message.
    /// packet - The media packet
    pub async fn write_packet(&mut self, packet: &RtmpPacket) -> Result<(), Error> {
        match packet.header.packet_type {
            RTMP_TYPE_AUDIO | RTMP_TYPE_VIDEO | RTMP_TYPE_DATA => {
                let tag = make_flv_tag(
                    packet.header.packet_type as u8,
                    packet.header.timestamp,
                    &packet.payload,
                );

                self.stream.write_all(&tag).await
            }
            RTMP_TYPE_AGGREGATE => self.write_aggregate(packet).await,
            _ => Ok(()),
        }
    }

    /// Copies the tags of an aggregate message, rebasing timestamps
    /// packet - The aggregate packet
    async fn write_aggregate(&mut self, packet: &RtmpPacket) -> Result<(), Error> {
        let body = &packet.payload;

        let mut pos: usize = 0;
        let mut delta: Option<i64> = None;

        while pos + FLV_TAG_HEADER_SIZE < body.len() {
            let data_size = BigEndian::read_u24(&body[pos + 1..pos + 4]) as usize;

            if pos + FLV_TAG_HEADER_SIZE + data_size + FLV_PREV_TAG_SIZE > body.len() {
                break;
            }

            let mut tag_timestamp = BigEndian::read_u24(&body[pos + 4..pos + 7]) as i64;
            tag_timestamp |= (body[pos + 7] as i64) << 24;

            // The first tag anchors the batch to the message timestamp
            let tag_delta = match delta {
                Some(d) => d,
                None => {
                    let d = packet.header.timestamp - tag_timestamp;
                    delta = Some(d);
                    d
                }
            };

            let tag = make_flv_tag(
                body[pos],
                tag_timestamp + tag_delta,
                &body[pos + FLV_TAG_HEADER_SIZE..pos + FLV_TAG_HEADER_SIZE + data_size],
            );

            self.stream.write_all(&tag).await?;

            pos += FLV_TAG_HEADER_SIZE + data_size + FLV_PREV_TAG_SIZE;
        }

        Ok(())
    }

    /// Flushes the output stream
    pub async fn flush(&mut self) -> Result<(), Error> {
        self.stream.flush().await
    }
}

// Tests

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_header() {
        let mut out: Vec<u8> = Vec::new();

        let mut writer = FlvWriter::new(&mut out);
        writer.write_header(true, true).await.unwrap();

        assert_eq!(&out[0..3], b"FLV");
        assert_eq!(out[3], 0x01);
        assert_eq!(out[4], 0x05);
        assert_eq!(&out[5..9], &[0, 0, 0, 9]);
        assert_eq!(&out[9..13], &[0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_write_video_packet() {
        let mut packet = RtmpPacket::new_blank();

        packet.header.packet_type = RTMP_TYPE_VIDEO;
        packet.header.timestamp = 0x01000203;
        packet.payload = vec![0x17, 0x00, 0x00];
        packet.header.length = 3;

        let mut out: Vec<u8> = Vec::new();

        let mut writer = FlvWriter::new(&mut out);
        writer.write_packet(&packet).await.unwrap();

        assert_eq!(out[0], 9); // video tag
        assert_eq!(BigEndian::read_u24(&out[1..4]), 3); // data size
        assert_eq!(BigEndian::read_u24(&out[4..7]), 0x000203);
        assert_eq!(out[7], 0x01); // timestamp extension
        assert_eq!(&out[11..14], &[0x17, 0x00, 0x00]);

        // Previous tag size trailer
        assert_eq!(BigEndian::read_u32(&out[14..18]), 14);
    }

    #[tokio::test]
    async fn test_write_aggregate_rebases_timestamps() {
        let mut body = make_flv_tag(8, 1000, &[0xaa; 5]);
        body.extend(make_flv_tag(9, 1020, &[0xbb; 5]));

        let mut packet = RtmpPacket::new_blank();

        packet.header.packet_type = RTMP_TYPE_AGGREGATE;
        packet.header.timestamp = 4000;
        packet.header.length = body.len();
        packet.payload = body;

        let mut out: Vec<u8> = Vec::new();

        let mut writer = FlvWriter::new(&mut out);
        writer.write_packet(&packet).await.unwrap();

        // First tag moved from 1000 to the message timestamp
        assert_eq!(out[0], 8);
        assert_eq!(BigEndian::read_u24(&out[4..7]), 4000);

        // Second tag keeps its 20 ms distance from the first
        let second = FLV_TAG_HEADER_SIZE + 5 + FLV_PREV_TAG_SIZE;
        assert_eq!(out[second], 9);
        assert_eq!(BigEndian::read_u24(&out[second + 4..second + 7]), 4020);
    }
}
