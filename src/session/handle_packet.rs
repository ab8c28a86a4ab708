// Packet handling logic

use byteorder::{BigEndian, ByteOrder};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::rtmp::{
    RtmpPacket, RTMP_TYPE_ACKNOWLEDGEMENT, RTMP_TYPE_AGGREGATE, RTMP_TYPE_AUDIO, RTMP_TYPE_DATA,
    RTMP_TYPE_EVENT, RTMP_TYPE_FLEX_MESSAGE, RTMP_TYPE_FLEX_OBJECT, RTMP_TYPE_FLEX_STREAM,
    RTMP_TYPE_INVOKE, RTMP_TYPE_SET_CHUNK_SIZE, RTMP_TYPE_SET_PEER_BANDWIDTH,
    RTMP_TYPE_SHARED_OBJECT, RTMP_TYPE_VIDEO, RTMP_TYPE_WINDOW_ACKNOWLEDGEMENT_SIZE,
};

use super::{PauseState, RtmpSession};

/// Outcome of routing one inbound packet
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RtmpPacketAction {
    /// Consumed internally, nothing for the caller
    None,

    /// The packet carries media and must be delivered to the consumer
    Media,

    /// The server ended the session, the receive loop must stop
    Stop,
}

impl<TR: AsyncRead + Unpin, TW: AsyncWrite + Unpin> RtmpSession<TR, TW> {
    /// Routes a reassembled packet by its message type
    /// packet - The packet to handle
    pub async fn handle_packet(&mut self, packet: &RtmpPacket) -> RtmpPacketAction {
        match packet.header.packet_type {
            RTMP_TYPE_SET_CHUNK_SIZE => {
                if packet.payload.len() >= 4 {
                    self.in_chunk_size = BigEndian::read_u32(&packet.payload[0..4]) as usize;
                    self.logger.log_debug(&format!(
                        "Received: chunk size change to {}",
                        self.in_chunk_size
                    ));
                }

                RtmpPacketAction::None
            }
            RTMP_TYPE_ACKNOWLEDGEMENT => {
                self.logger.log_debug("Received: bytes read report");
                RtmpPacketAction::None
            }
            RTMP_TYPE_EVENT => {
                self.handle_ctrl(packet).await;
                RtmpPacketAction::None
            }
            RTMP_TYPE_WINDOW_ACKNOWLEDGEMENT_SIZE => {
                if packet.payload.len() >= 4 {
                    self.server_bw = BigEndian::read_u32(&packet.payload[0..4]);
                    self.logger
                        .log_debug(&format!("Server BW = {}", self.server_bw));
                }

                RtmpPacketAction::None
            }
            RTMP_TYPE_SET_PEER_BANDWIDTH => {
                if packet.payload.len() >= 4 {
                    self.client_bw = BigEndian::read_u32(&packet.payload[0..4]);

                    if packet.payload.len() > 4 {
                        self.client_bw2 = packet.payload[4];
                    }

                    self.logger.log_debug(&format!(
                        "Client BW = {} {}",
                        self.client_bw, self.client_bw2
                    ));
                }

                RtmpPacketAction::None
            }
            RTMP_TYPE_AUDIO | RTMP_TYPE_VIDEO => {
                if self.media_channel == 0 {
                    self.media_channel = packet.header.channel_id;
                }

                if self.pausing == PauseState::Playing {
                    self.media_stamp = packet.header.timestamp;
                }

                RtmpPacketAction::Media
            }
            RTMP_TYPE_FLEX_STREAM | RTMP_TYPE_FLEX_OBJECT | RTMP_TYPE_SHARED_OBJECT => {
                self.logger.log_warning(&format!(
                    "Received message of type {}, not supported, ignoring",
                    packet.header.packet_type
                ));

                RtmpPacketAction::None
            }
            RTMP_TYPE_FLEX_MESSAGE => {
                // Same as an invoke, with one leading byte to skip
                if packet.payload.is_empty() {
                    return RtmpPacketAction::None;
                }

                if self.handle_invoke(&packet.payload[1..]).await {
                    RtmpPacketAction::Stop
                } else {
                    RtmpPacketAction::None
                }
            }
            RTMP_TYPE_DATA => {
                self.logger
                    .log_debug(&format!("Received: notify {} bytes", packet.payload.len()));

                if self.handle_notify(&packet.payload) {
                    RtmpPacketAction::Media
                } else {
                    RtmpPacketAction::None
                }
            }
            RTMP_TYPE_INVOKE => {
                self.logger
                    .log_debug(&format!("Received: invoke {} bytes", packet.payload.len()));

                if self.handle_invoke(&packet.payload).await {
                    RtmpPacketAction::Stop
                } else {
                    RtmpPacketAction::None
                }
            }
            RTMP_TYPE_AGGREGATE => {
                self.logger
                    .log_debug(&format!("Received: FLV {} bytes", packet.payload.len()));

                self.handle_aggregate(packet);

                RtmpPacketAction::Media
            }
            _ => {
                self.logger.log_debug(&format!(
                    "Unknown packet type received: 0x{:02x}",
                    packet.header.packet_type
                ));
                self.logger.log_trace_hex("Unknown packet body", &packet.payload);

                RtmpPacketAction::None
            }
        }
    }
}
