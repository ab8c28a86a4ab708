// Control (ping) packet handling logic

use byteorder::{BigEndian, ByteOrder};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::rtmp::{
    rtmp_make_swf_verify_message, RtmpPacket, CTRL_PONG, STREAM_BEGIN, STREAM_BUFFER_EMPTY,
    STREAM_BUFFER_READY, STREAM_DRY, STREAM_EOF, STREAM_IS_RECORDED, STREAM_PING,
    SWF_VERIFICATION_REQUEST,
};

use super::{PauseState, RtmpSession};

impl<TR: AsyncRead + Unpin, TW: AsyncWrite + Unpin> RtmpSession<TR, TW> {
    /// Handles a user control (ping) packet
    ///
    /// Stream EOF and Buffer Empty events drive the pause state
    /// machine, server pings are answered with a pong carrying the
    /// same timestamp
    /// packet - The packet to handle
    pub async fn handle_ctrl(&mut self, packet: &RtmpPacket) {
        let body = &packet.payload;

        if body.len() < 2 {
            self.logger.log_debug("Received ctrl with no event type");
            return;
        }

        let ctrl_type = BigEndian::read_u16(&body[0..2]);

        self.logger.log_debug(&format!(
            "Received ctrl, type: {}, len: {}",
            ctrl_type,
            body.len()
        ));

        if body.len() >= 6 {
            let object = BigEndian::read_u32(&body[2..6]);

            match ctrl_type {
                STREAM_BEGIN => {
                    self.logger.log_debug(&format!("Stream Begin {}", object));
                }
                STREAM_EOF => {
                    self.logger.log_debug(&format!("Stream EOF {}", object));

                    if self.pausing == PauseState::PauseRequested {
                        self.pausing = PauseState::PauseAcked;
                    }
                }
                STREAM_DRY => {
                    self.logger.log_debug(&format!("Stream Dry {}", object));
                }
                STREAM_IS_RECORDED => {
                    self.logger
                        .log_debug(&format!("Stream IsRecorded {}", object));
                }
                STREAM_PING => {
                    self.logger.log_debug(&format!("Ping {}", object));

                    let _ = self.send_ctrl(CTRL_PONG, object, 0).await;
                }
                STREAM_BUFFER_EMPTY => {
                    self.logger
                        .log_debug(&format!("Stream BufferEmpty {}", object));

                    // The server ran out of buffered data: pause until
                    // it recovers, then resume from the pause point
                    if self.pausing == PauseState::Playing {
                        self.pause_stamp = self.get_channel_timestamp(self.media_channel);
                        let stamp = self.pause_stamp as f64;
                        let _ = self.send_pause(true, stamp).await;
                    } else if self.pausing == PauseState::PauseAcked {
                        let stamp = self.pause_stamp as f64;
                        let _ = self.send_pause(false, stamp).await;
                    }
                }
                STREAM_BUFFER_READY => {
                    self.logger
                        .log_debug(&format!("Stream BufferReady {}", object));
                }
                _ => {
                    self.logger
                        .log_debug(&format!("Stream event {} {}", ctrl_type, object));
                }
            }
        }

        if ctrl_type == SWF_VERIFICATION_REQUEST {
            self.logger.log_debug("SWF verification request received");

            match self.swf_verification_response {
                Some(response) => {
                    let mut reply = rtmp_make_swf_verify_message(&response);
                    let _ = self.send_rtmp(&mut reply, false).await;
                }
                None => {
                    self.logger.log_warning(
                        "Ignoring SWF verification request, set SWF_HASH and SWF_SIZE",
                    );
                }
            }
        }
    }
}

// Tests
