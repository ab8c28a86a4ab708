// Stream control logic (public play API)

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::rtmp::{
    rtmp_make_create_stream_message, rtmp_make_delete_stream_message, rtmp_make_pause_message,
    RtmpPacket, CTRL_SET_BUFFER_LENGTH, RTMP_TYPE_AUDIO, RTMP_TYPE_DATA, RTMP_TYPE_VIDEO,
};

use super::{PauseState, RtmpPacketAction, RtmpSession};

impl<TR: AsyncRead + Unpin, TW: AsyncWrite + Unpin> RtmpSession<TR, TW> {
    /// Drives the session until the server confirms play
    ///
    /// Packets are read and routed until the play invoke is
    /// acknowledged; media arriving before that point is a protocol
    /// violation and aborts the wait
    /// seek_time - Seek offset override (milliseconds), below -2 keeps the configured one
    /// length - Play duration override (milliseconds), 0 keeps the configured one
    /// Returns true once the session is playing
    pub async fn connect_stream(&mut self, seek_time: f64, length: u32) -> bool {
        if seek_time >= -2.0 {
            self.link.seek_time = seek_time;
        }

        if length > 0 {
            self.link.length = length;
        }

        self.media_channel = 0;

        while !self.playing && self.alive {
            let packet = match self.read_packet().await {
                Ok(Some(p)) => p,
                Ok(None) => {
                    let _ = self.send_bytes_received_if_due().await;
                    continue;
                }
                Err(_) => {
                    if !self.reader.timed_out {
                        self.close();
                    }
                    break;
                }
            };

            let _ = self.send_bytes_received_if_due().await;

            if packet.header.packet_type == RTMP_TYPE_AUDIO
                || packet.header.packet_type == RTMP_TYPE_VIDEO
                || packet.header.packet_type == RTMP_TYPE_DATA
            {
                self.logger.log_debug("Received FLV packet before play()!");
                break;
            }

            if self.handle_packet(&packet).await == RtmpPacketAction::Stop {
                break;
            }
        }

        self.playing
    }

    /// Reads and routes packets until the next media packet
    ///
    /// While resuming from a pause, packets at or before the pause
    /// timestamp are dropped; the first packet past it goes through
    /// and ends the resume state
    ///
    /// Returns None when the stream ended, the transport died, or
    /// the receive timeout expired (check is_timedout to tell)
    pub async fn next_media_packet(&mut self) -> Option<RtmpPacket> {
        while self.alive {
            let packet = match self.read_packet().await {
                Ok(Some(p)) => p,
                Ok(None) => {
                    let _ = self.send_bytes_received_if_due().await;
                    continue;
                }
                Err(_) => {
                    if self.reader.timed_out {
                        // Remember where playback stopped, a pause
                        // toggle from here resumes the stream
                        self.pause_stamp = self.get_channel_timestamp(self.media_channel);
                    } else {
                        self.close();
                    }
                    return None;
                }
            };

            let _ = self.send_bytes_received_if_due().await;

            match self.handle_packet(&packet).await {
                RtmpPacketAction::Media => {
                    if self.pausing == PauseState::Resuming {
                        if packet.header.timestamp <= self.media_stamp {
                            self.logger.log_debug(&format!(
                                "Skipped type {:02x}, size {}, TS {} ms, pause TS {} ms",
                                packet.header.packet_type,
                                packet.header.length,
                                packet.header.timestamp,
                                self.media_stamp
                            ));
                            continue;
                        }

                        self.pausing = PauseState::Playing;
                    }

                    self.playing = true;

                    return Some(packet);
                }
                RtmpPacketAction::Stop => {
                    return None;
                }
                RtmpPacketAction::None => {}
            }
        }

        None
    }

    /// Sends the pause toggle invoke on the media channel and moves
    /// the pause state accordingly
    /// pause - True to pause, false to resume
    /// time - Timestamp (milliseconds) the pause refers to
    pub async fn send_pause(&mut self, pause: bool, time: f64) -> Result<(), ()> {
        self.logger
            .log_debug(&format!("Sending pause: {}, time: {}", pause, time));

        let mut packet = rtmp_make_pause_message(pause, time);

        self.send_rtmp(&mut packet, true).await?;

        self.pausing = if pause {
            PauseState::PauseRequested
        } else {
            PauseState::Resuming
        };

        Ok(())
    }

    /// Pauses and immediately resumes the stream
    ///
    /// Used to nudge the server into replaying from the last known
    /// timestamp after a receive timeout
    pub async fn toggle_stream(&mut self) -> Result<(), ()> {
        self.send_pause(true, self.pause_stamp as f64).await?;

        tokio::time::sleep(Duration::from_secs(1)).await;

        self.send_pause(false, self.pause_stamp as f64).await
    }

    /// Deletes the current stream, if one exists
    /// No response is expected for the delete invoke
    pub async fn delete_stream(&mut self) {
        if self.stream_id < 0 {
            return;
        }

        self.playing = false;

        let mut packet = rtmp_make_delete_stream_message(self.stream_id as f64);

        let _ = self.send_rtmp(&mut packet, false).await;
    }

    /// Tears down the current stream and negotiates a new one
    /// buffer_ms - Client buffer length for the new stream
    /// seek_time - Seek offset (milliseconds)
    /// length - Play duration (milliseconds), 0 to play to the end
    /// Returns true once the new stream is playing
    pub async fn reconnect_stream(&mut self, buffer_ms: u32, seek_time: f64, length: u32) -> bool {
        self.delete_stream().await;

        let mut packet = rtmp_make_create_stream_message(2.0);

        if self.send_rtmp(&mut packet, true).await.is_err() {
            return false;
        }

        self.set_buffer_ms(buffer_ms);

        self.connect_stream(seek_time, length).await
    }

    /// Reports the configured buffer length to the server for the
    /// current stream
    pub async fn update_buffer_ms(&mut self) -> Result<(), ()> {
        self.send_ctrl(
            CTRL_SET_BUFFER_LENGTH,
            self.stream_id as u32,
            self.buffer_ms,
        )
        .await
    }
}

// Tests

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amf::AMF0Value;
    use crate::log::Logger;
    use crate::rtmp::{
        rtmp_make_server_bw_message, RtmpCommand, RTMP_CHANNEL_MEDIA, RTMP_TYPE_EVENT,
        RTMP_TYPE_INVOKE, RTMP_TYPE_SET_CHUNK_SIZE, RTMP_TYPE_VIDEO,
    };
    use crate::session::{RtmpLink, SessionReader};
    use byteorder::{BigEndian, ByteOrder};
    use std::collections::HashMap;
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf};

    type TestSession = RtmpSession<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

    fn make_session_pair() -> (TestSession, TestSession) {
        let (near, far) = tokio::io::duplex(1 << 20);

        let (near_read, near_write) = tokio::io::split(near);
        let (far_read, far_write) = tokio::io::split(far);

        (
            RtmpSession::new(
                RtmpLink::new_blank(),
                SessionReader::new(near_read, 5),
                near_write,
                Logger::new_disabled(),
            ),
            RtmpSession::new(
                RtmpLink::new_blank(),
                SessionReader::new(far_read, 5),
                far_write,
                Logger::new_disabled(),
            ),
        )
    }

    fn make_invoke_packet(channel: u32, body: Vec<u8>) -> RtmpPacket {
        let mut packet = RtmpPacket::new_blank();

        packet.header.channel_id = channel;
        packet.header.packet_type = RTMP_TYPE_INVOKE;
        packet.header.length = body.len();
        packet.payload = body;

        packet
    }

    fn encode_result(txn: f64, last_arg: Option<AMF0Value>) -> Vec<u8> {
        let mut body = AMF0Value::String {
            value: "_result".to_string(),
        }
        .encode();

        body.extend(AMF0Value::Number { value: txn }.encode());
        body.extend(AMF0Value::Null.encode());

        if let Some(arg) = last_arg {
            body.extend(arg.encode());
        }

        body
    }

    fn encode_on_status(code: &str) -> Vec<u8> {
        let mut info: HashMap<String, AMF0Value> = HashMap::new();

        info.insert(
            "code".to_string(),
            AMF0Value::String {
                value: code.to_string(),
            },
        );
        info.insert(
            "level".to_string(),
            AMF0Value::String {
                value: "status".to_string(),
            },
        );

        let mut body = AMF0Value::String {
            value: "onStatus".to_string(),
        }
        .encode();

        body.extend(AMF0Value::Number { value: 0.0 }.encode());
        body.extend(AMF0Value::Null.encode());
        body.extend(AMF0Value::Object { properties: info }.encode());

        body
    }

    /// Reads packets on the scripted server until an invoke with the
    /// wanted method arrives
    async fn server_wait_for_invoke(server: &mut TestSession, method: &str) -> RtmpCommand {
        loop {
            let packet = match server.read_packet().await.unwrap() {
                Some(p) => p,
                None => continue,
            };

            if packet.header.packet_type != RTMP_TYPE_INVOKE {
                continue;
            }

            let cmd = RtmpCommand::decode(&packet.payload).unwrap();

            if cmd.cmd == method {
                return cmd;
            }
        }
    }

    #[tokio::test]
    async fn test_happy_play_scenario() {
        let (mut client, mut server) = make_session_pair();

        client.link.playpath = "file".to_string();
        client.method_calls.push("connect".to_string());

        let server_task = tokio::spawn(async move {
            // Connect response
            server_wait_for_invoke(&mut server, "connect").await;

            let mut result = make_invoke_packet(3, encode_result(1.0, Some(AMF0Value::Null)));
            server.send_rtmp(&mut result, false).await.unwrap();

            // Raise the chunk size before answering createStream
            server_wait_for_invoke(&mut server, "createStream").await;

            let mut chunk_size = RtmpPacket::new_blank();
            chunk_size.header.channel_id = 2;
            chunk_size.header.packet_type = RTMP_TYPE_SET_CHUNK_SIZE;
            chunk_size.payload = vec![0x00, 0x01, 0x00, 0x00];
            chunk_size.header.length = 4;
            server.send_rtmp(&mut chunk_size, false).await.unwrap();

            let mut result =
                make_invoke_packet(3, encode_result(2.0, Some(AMF0Value::Number { value: 1.0 })));
            server.send_rtmp(&mut result, false).await.unwrap();

            // Confirm play via onStatus
            let play = server_wait_for_invoke(&mut server, "play").await;
            assert_eq!(play.get_argument(3).unwrap().get_string(), "file");
            assert_eq!(play.get_argument(4).unwrap().get_float(), 0.0);

            let mut status = make_invoke_packet(5, encode_on_status("NetStream.Play.Start"));
            server.send_rtmp(&mut status, false).await.unwrap();

            server
        });

        // Send the connect invoke like the connect step would
        let mut connect = crate::rtmp::rtmp_make_connect_message(&client.link);
        client.send_rtmp(&mut connect, false).await.unwrap();

        let playing = client.connect_stream(0.0, 0).await;

        assert!(playing);
        assert!(client.is_playing());
        assert_eq!(client.stream_id, 1);
        assert_eq!(client.in_chunk_size, 65536);
        assert!(client.method_calls.is_empty());

        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_stream_not_found_scenario() {
        let (mut client, mut server) = make_session_pair();

        client.link.playpath = "missing".to_string();
        client.method_calls.push("connect".to_string());

        let server_task = tokio::spawn(async move {
            server_wait_for_invoke(&mut server, "connect").await;

            let mut result = make_invoke_packet(3, encode_result(1.0, Some(AMF0Value::Null)));
            server.send_rtmp(&mut result, false).await.unwrap();

            server_wait_for_invoke(&mut server, "createStream").await;

            let mut result =
                make_invoke_packet(3, encode_result(2.0, Some(AMF0Value::Number { value: 1.0 })));
            server.send_rtmp(&mut result, false).await.unwrap();

            server_wait_for_invoke(&mut server, "play").await;

            let mut status =
                make_invoke_packet(5, encode_on_status("NetStream.Play.StreamNotFound"));
            server.send_rtmp(&mut status, false).await.unwrap();
        });

        let mut connect = crate::rtmp::rtmp_make_connect_message(&client.link);
        client.send_rtmp(&mut connect, false).await.unwrap();

        let playing = client.connect_stream(0.0, 0).await;

        assert!(!playing);
        assert_eq!(client.stream_id, -1);
        assert!(!client.is_connected());

        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_next_media_packet_delivers_media() {
        let (mut client, mut server) = make_session_pair();

        let server_task = tokio::spawn(async move {
            // Some protocol noise first, then actual media
            let mut bw = rtmp_make_server_bw_message(1000000);
            server.send_rtmp(&mut bw, false).await.unwrap();

            let mut video = RtmpPacket::new_blank();
            video.header.channel_id = RTMP_CHANNEL_MEDIA;
            video.header.packet_type = RTMP_TYPE_VIDEO;
            video.header.stream_id = 1;
            video.header.timestamp = 40;
            video.payload = vec![0x17, 0x01, 0x00];
            video.header.length = 3;
            server.send_rtmp(&mut video, false).await.unwrap();
        });

        let packet = client.next_media_packet().await.expect("media expected");

        assert_eq!(packet.header.packet_type, RTMP_TYPE_VIDEO);
        assert_eq!(packet.header.timestamp, 40);
        assert_eq!(client.media_channel, RTMP_CHANNEL_MEDIA);
        assert_eq!(client.media_stamp, 40);
        assert!(client.is_playing());

        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_next_media_packet_resume_filter() {
        let (mut client, mut server) = make_session_pair();

        client.pausing = PauseState::Resuming;
        client.media_stamp = 5000;

        let server_task = tokio::spawn(async move {
            for (ts, marker) in [(4000i64, 1u8), (5000, 2), (6000, 3)] {
                let mut video = RtmpPacket::new_blank();
                video.header.channel_id = RTMP_CHANNEL_MEDIA;
                video.header.packet_type = RTMP_TYPE_VIDEO;
                video.header.stream_id = 1;
                video.header.timestamp = ts;
                video.payload = vec![marker];
                video.header.length = 1;
                server.send_rtmp(&mut video, false).await.unwrap();
            }
        });

        let packet = client.next_media_packet().await.expect("media expected");

        // Packets at or before the pause mark were dropped
        assert_eq!(packet.payload, vec![3]);
        assert_eq!(packet.header.timestamp, 6000);
        assert_eq!(client.pausing, PauseState::Playing);

        server_task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_media_packet_timeout_records_pause_stamp() {
        let (mut client, _server) = make_session_pair();

        client.media_channel = 8;

        let mut channel_state = crate::session::RtmpChannelState::new_blank();
        channel_state.clock = 7000;
        client.channels_in.insert(8, channel_state);

        let packet = client.next_media_packet().await;

        assert!(packet.is_none());
        assert!(client.is_timedout());
        assert!(client.is_connected());
        assert_eq!(client.pause_stamp, 7000);
    }

    #[tokio::test]
    async fn test_delete_stream_without_stream_is_noop() {
        let (mut client, _server) = make_session_pair();

        client.playing = true;
        client.stream_id = -1;

        client.delete_stream().await;

        // Nothing was sent and the playing flag is untouched
        assert!(client.playing);
        assert!(client.channels_out.is_empty());
    }

    #[tokio::test]
    async fn test_delete_stream_sends_invoke() {
        let (mut client, mut server) = make_session_pair();

        client.playing = true;
        client.stream_id = 1;

        client.delete_stream().await;

        assert!(!client.playing);

        let packet = server.read_packet().await.unwrap().expect("ready");
        let cmd = RtmpCommand::decode(&packet.payload).unwrap();

        assert_eq!(cmd.cmd, "deleteStream");
        assert_eq!(cmd.get_argument(3).unwrap().get_integer(), 1);
    }

    #[tokio::test]
    async fn test_media_before_play_aborts_connect_stream() {
        let (mut client, mut server) = make_session_pair();

        let server_task = tokio::spawn(async move {
            let mut video = RtmpPacket::new_blank();
            video.header.channel_id = RTMP_CHANNEL_MEDIA;
            video.header.packet_type = RTMP_TYPE_VIDEO;
            video.header.timestamp = 0;
            video.payload = vec![0x00];
            video.header.length = 1;
            server.send_rtmp(&mut video, false).await.unwrap();
        });

        let playing = client.connect_stream(0.0, 0).await;

        assert!(!playing);

        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_reconnect_stream_negotiates_new_stream() {
        let (mut client, mut server) = make_session_pair();

        client.link.playpath = "file".to_string();
        client.playing = true;
        client.stream_id = 1;

        let server_task = tokio::spawn(async move {
            // The old stream is torn down first
            let delete = server_wait_for_invoke(&mut server, "deleteStream").await;
            assert_eq!(delete.get_argument(3).unwrap().get_integer(), 1);

            // A new stream is requested with the fixed transaction id
            let create = server_wait_for_invoke(&mut server, "createStream").await;
            assert_eq!(create.get_transaction_id(), 2.0);

            let mut result =
                make_invoke_packet(3, encode_result(2.0, Some(AMF0Value::Number { value: 2.0 })));
            server.send_rtmp(&mut result, false).await.unwrap();

            let play = server_wait_for_invoke(&mut server, "play").await;
            assert_eq!(play.get_argument(3).unwrap().get_string(), "file");

            // The new buffer length is applied to the new stream
            let ctrl = server.read_packet().await.unwrap().expect("ctrl expected");
            assert_eq!(ctrl.header.packet_type, RTMP_TYPE_EVENT);
            assert_eq!(ctrl.payload[0..2], [0x00, 0x03]);
            assert_eq!(BigEndian::read_u32(&ctrl.payload[2..6]), 2);
            assert_eq!(BigEndian::read_u32(&ctrl.payload[6..10]), 500);

            let mut status = make_invoke_packet(5, encode_on_status("NetStream.Play.Start"));
            server.send_rtmp(&mut status, false).await.unwrap();
        });

        let playing = client.reconnect_stream(500, 0.0, 0).await;

        assert!(playing);
        assert_eq!(client.stream_id, 2);
        assert_eq!(client.buffer_ms, 500);
        assert!(client.method_calls.is_empty());

        server_task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_stream_sends_pause_cycle() {
        let (mut client, mut server) = make_session_pair();

        client.pause_stamp = 3000;

        assert_eq!(client.pausing, PauseState::Playing);

        client.toggle_stream().await.unwrap();

        assert_eq!(client.pausing, PauseState::Resuming);
        assert_eq!(
            client.method_calls,
            vec!["pause".to_string(), "pause".to_string()]
        );

        // Pause at the recorded stamp, then resume from the same point
        let first = server.read_packet().await.unwrap().expect("pause expected");
        let cmd = RtmpCommand::decode(&first.payload).unwrap();
        assert_eq!(cmd.cmd, "pause");
        assert!(cmd.get_argument(3).unwrap().get_bool());
        assert_eq!(cmd.get_argument(4).unwrap().get_float(), 3000.0);

        let second = server.read_packet().await.unwrap().expect("unpause expected");
        let cmd = RtmpCommand::decode(&second.payload).unwrap();
        assert_eq!(cmd.cmd, "pause");
        assert!(!cmd.get_argument(3).unwrap().get_bool());
        assert_eq!(cmd.get_argument(4).unwrap().get_float(), 3000.0);
    }

    #[tokio::test]
    async fn test_update_buffer_ms_sends_control() {
        let (mut client, mut server) = make_session_pair();

        client.stream_id = 1;
        client.set_buffer_ms(750);

        client.update_buffer_ms().await.unwrap();

        let ctrl = server.read_packet().await.unwrap().expect("ctrl expected");

        assert_eq!(ctrl.header.packet_type, RTMP_TYPE_EVENT);
        assert_eq!(ctrl.payload.len(), 10);
        assert_eq!(ctrl.payload[0..2], [0x00, 0x03]);
        assert_eq!(BigEndian::read_u32(&ctrl.payload[2..6]), 1);
        assert_eq!(BigEndian::read_u32(&ctrl.payload[6..10]), 750);
    }

    #[tokio::test]
    async fn test_send_pause_moves_state() {
        let (mut client, mut server) = make_session_pair();

        client.send_pause(true, 1000.0).await.unwrap();
        assert_eq!(client.pausing, PauseState::PauseRequested);
        assert_eq!(client.method_calls, vec!["pause".to_string()]);

        client.send_pause(false, 1000.0).await.unwrap();
        assert_eq!(client.pausing, PauseState::Resuming);

        // Both invokes went out on the media channel
        let first = server.read_packet().await.unwrap().expect("ready");
        assert_eq!(first.header.channel_id, RTMP_CHANNEL_MEDIA);

        let second = server.read_packet().await.unwrap().expect("ready");
        assert_eq!(second.header.channel_id, RTMP_CHANNEL_MEDIA);

        let cmd = RtmpCommand::decode(&second.payload).unwrap();
        assert!(!cmd.get_argument(3).unwrap().get_bool());
    }
}
