// Chunk read logic

use std::cmp;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::rtmp::{
    get_rtmp_header_size, RtmpPacket, RTMP_CHUNK_TYPE_0, RTMP_MAX_BODY_SIZE,
};

use super::{RtmpChannelState, RtmpSession};

/// Timestamp field value that marks an extended 32 bit timestamp
const EXTENDED_TIMESTAMP_MARK: u32 = 0xffffff;

impl<TR: AsyncRead + Unpin, TW: AsyncWrite + Unpin> RtmpSession<TR, TW> {
    /// Reads one chunk from the transport and updates the channel it
    /// belongs to
    ///
    /// Returns the reassembled packet once its last chunk arrives,
    /// None while the message is still incomplete. Errors are fatal
    /// for the transport, except when the receive timeout expired
    /// (checked via is_timedout).
    pub async fn read_packet(&mut self) -> Result<Option<RtmpPacket>, ()> {
        // Basic header: format and channel id, with the one and two
        // byte channel extensions

        let start_byte = self.reader.read_byte(&self.logger).await?;

        let format = (start_byte >> 6) as u32;
        let mut channel_id = (start_byte & 0x3f) as u32;

        if channel_id == 0 {
            let ext = self.reader.read_byte(&self.logger).await?;
            channel_id = (ext as u32) + 64;
        } else if channel_id == 1 {
            let mut ext = [0u8; 2];
            self.reader.read_n(&mut ext, &self.logger).await?;
            channel_id = (ext[0] as u32) + ((ext[1] as u32) << 8) + 64;
        }

        // Message header, its size is selected by the format

        let header_size = get_rtmp_header_size((start_byte >> 6) as u8);

        let mut header = vec![0u8; header_size];

        if header_size > 0 && self.reader.read_n(&mut header, &self.logger).await.is_err() {
            self.logger.log_error(&format!(
                "Failed to read RTMP packet header, type {:02x}",
                start_byte
            ));
            return Err(());
        }

        // Fields not present in a compressed header keep the values
        // stored from the previous message on this channel

        let state = self
            .channels_in
            .entry(channel_id)
            .or_insert_with(RtmpChannelState::new_blank);

        state.header.format = format;
        state.header.channel_id = channel_id;

        if format == RTMP_CHUNK_TYPE_0 {
            state.has_abs_timestamp = true;
        }

        if header_size >= 3 {
            let timestamp = BigEndian::read_u24(&header[0..3]);

            if timestamp == EXTENDED_TIMESTAMP_MARK {
                self.logger.log_error(
                    "Extended (32 bit) timestamps are not supported, rejecting the stream",
                );
                return Err(());
            }

            state.header.timestamp = timestamp as i64;
        }

        if header_size >= 6 {
            state.header.length = BigEndian::read_u24(&header[3..6]) as usize;
            state.bytes_read = 0;
            state.payload.clear();
        }

        if header_size >= 7 {
            state.header.packet_type = header[6] as u32;
        }

        if header_size == 11 {
            state.header.stream_id = LittleEndian::read_u32(&header[7..11]);
        }

        if state.header.length > RTMP_MAX_BODY_SIZE {
            self.logger.log_error(&format!(
                "Rejecting message of {} bytes on channel {}, too large",
                state.header.length, channel_id
            ));
            return Err(());
        }

        // Body: one chunk worth of bytes at most

        let to_read = cmp::min(self.in_chunk_size, state.header.length - state.bytes_read);

        let mut chunk = vec![0u8; to_read];

        if to_read > 0 && self.reader.read_n(&mut chunk, &self.logger).await.is_err() {
            self.logger.log_error(&format!(
                "Failed to read RTMP packet body, len: {}",
                self.channels_in
                    .get(&channel_id)
                    .map(|s| s.header.length)
                    .unwrap_or(0)
            ));
            return Err(());
        }

        let state = match self.channels_in.get_mut(&channel_id) {
            Some(s) => s,
            None => return Err(()),
        };

        state.payload.extend_from_slice(&chunk);
        state.bytes_read += to_read;

        if state.bytes_read < state.header.length {
            return Ok(None);
        }

        // Message complete: resolve the absolute timestamp and leave
        // the header stored for the next compressed header

        let absolute_timestamp = if state.has_abs_timestamp {
            state.header.timestamp
        } else {
            state.clock + state.header.timestamp
        };

        state.clock = absolute_timestamp;

        let mut packet = RtmpPacket::new_blank();

        packet.header = state.header.clone();
        packet.header.timestamp = absolute_timestamp;
        packet.has_abs_timestamp = true;
        packet.payload = std::mem::take(&mut state.payload);

        state.bytes_read = 0;
        state.has_abs_timestamp = false;

        Ok(Some(packet))
    }
}

// Tests
