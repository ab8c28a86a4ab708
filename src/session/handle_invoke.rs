// Invoke packet handling logic

use tokio::io::{AsyncRead, AsyncWrite};

use crate::rtmp::{
    rtmp_make_check_bw_message, rtmp_make_check_bw_result_message, rtmp_make_create_stream_message,
    rtmp_make_fc_subscribe_message, rtmp_make_play_message, rtmp_make_server_bw_message,
    RtmpCommand, CTRL_SET_BUFFER_LENGTH,
};

use super::RtmpSession;

// Status codes that kill the stream
const NETSTREAM_FAILED: &str = "NetStream.Failed";
const NETSTREAM_PLAY_FAILED: &str = "NetStream.Play.Failed";
const NETSTREAM_PLAY_STREAM_NOT_FOUND: &str = "NetStream.Play.StreamNotFound";
const NETCONNECTION_CONNECT_INVALID_APP: &str = "NetConnection.Connect.InvalidApp";

const NETSTREAM_PLAY_START: &str = "NetStream.Play.Start";
const NETSTREAM_PLAY_COMPLETE: &str = "NetStream.Play.Complete";
const NETSTREAM_PLAY_STOP: &str = "NetStream.Play.Stop";

impl<TR: AsyncRead + Unpin, TW: AsyncWrite + Unpin> RtmpSession<TR, TW> {
    /// Handles the body of an invoke message from the server
    /// body - Message body (AMF0 sequence)
    /// Returns true when the session is over (play complete or the
    /// server requested termination)
    pub async fn handle_invoke(&mut self, body: &[u8]) -> bool {
        let cmd = match RtmpCommand::decode(body) {
            Ok(c) => c,
            Err(_) => {
                self.logger
                    .log_warning("Sanity failed: no string method in invoke packet");
                return false;
            }
        };

        if self.logger.config.trace_enabled {
            self.logger
                .log_trace(&format!("SERVER INVOKE: {}", cmd.to_debug_string()));
        }

        self.logger
            .log_debug(&format!("Server invoking <{}>", cmd.cmd));

        match cmd.cmd.as_str() {
            "_result" => self.handle_invoke_result(&cmd).await,
            "onBWDone" => {
                // Start the bandwidth probe the server asked for
                let mut packet = rtmp_make_check_bw_message();
                let _ = self.send_rtmp(&mut packet, true).await;

                false
            }
            "_onbwcheck" => {
                let mut packet =
                    rtmp_make_check_bw_result_message(cmd.get_transaction_id(), self.bw_check_counter);

                self.bw_check_counter = self.bw_check_counter.wrapping_add(1);

                let _ = self.send_rtmp(&mut packet, false).await;

                false
            }
            "_onbwdone" => {
                // The probe completes out of order, the pending
                // _checkbw may not be at the head of the queue
                if let Some(index) = self.method_calls.iter().position(|m| m == "_checkbw") {
                    self.method_calls.remove(index);
                }

                false
            }
            "onFCSubscribe" => {
                if let Some(info) = cmd.get_argument(3) {
                    self.logger.log_debug(&format!(
                        "onFCSubscribe: {}",
                        info.to_debug_string("")
                    ));
                }

                false
            }
            "onFCUnsubscribe" => {
                self.close();
                true
            }
            "_error" => {
                self.logger.log_error("rtmp server sent error");
                false
            }
            "close" => {
                self.logger.log_error("rtmp server requested close");
                self.close();
                true
            }
            "onStatus" => self.handle_invoke_on_status(&cmd),
            _ => {
                self.logger
                    .log_debug(&format!("Unknown method: {}", cmd.cmd));
                false
            }
        }
    }

    /// Handles a _result response, matched to the oldest invoke still
    /// awaiting one
    /// cmd - The decoded response
    async fn handle_invoke_result(&mut self, cmd: &RtmpCommand) -> bool {
        if self.method_calls.is_empty() {
            self.logger
                .log_warning("Received a result with no pending method call");
            return false;
        }

        let method_invoked = self.method_calls.remove(0);

        self.logger.log_debug(&format!(
            "Received result for method call <{}>",
            method_invoked
        ));

        match method_invoked.as_str() {
            "connect" => {
                let mut server_bw_packet = rtmp_make_server_bw_message(self.server_bw);

                if self.send_rtmp(&mut server_bw_packet, false).await.is_err() {
                    return false;
                }

                if self
                    .send_ctrl(CTRL_SET_BUFFER_LENGTH, 0, self.buffer_ms)
                    .await
                    .is_err()
                {
                    return false;
                }

                let mut create_stream_packet = rtmp_make_create_stream_message(2.0);

                if self.send_rtmp(&mut create_stream_packet, true).await.is_err() {
                    return false;
                }

                // Subscribe when a subscribe path was given, or for
                // live streams using the playpath
                if !self.link.subscribepath.is_empty() {
                    let path = self.link.subscribepath.clone();
                    let _ = self.send_fc_subscribe(&path).await;
                } else if self.link.live {
                    let path = self.link.playpath.clone();
                    let _ = self.send_fc_subscribe(&path).await;
                }

                false
            }
            "createStream" => {
                self.stream_id = match cmd.get_argument(3) {
                    Some(v) => v.get_integer(),
                    None => {
                        self.logger
                            .log_error("createStream result carries no stream id");
                        return false;
                    }
                };

                self.logger
                    .log_debug(&format!("Created stream, id: {}", self.stream_id));

                let mut play_packet = rtmp_make_play_message(&self.link, self.stream_id as u32);

                self.logger.log_debug(&format!(
                    "Sending play, seekTime={:.2}, length={}, path: {}",
                    self.link.seek_time, self.link.length, self.link.playpath
                ));

                if self.send_rtmp(&mut play_packet, true).await.is_err() {
                    return false;
                }

                let _ = self
                    .send_ctrl(
                        CTRL_SET_BUFFER_LENGTH,
                        self.stream_id as u32,
                        self.buffer_ms,
                    )
                    .await;

                false
            }
            "play" => {
                self.playing = true;
                false
            }
            _ => false,
        }
    }

    /// Handles an onStatus invoke
    /// cmd - The decoded invoke
    /// Returns true when the status ends the session
    fn handle_invoke_on_status(&mut self, cmd: &RtmpCommand) -> bool {
        let info = match cmd.get_argument(3) {
            Some(v) => v,
            None => {
                self.logger.log_debug("onStatus with no info object");
                return false;
            }
        };

        let code = match info.get_object_property("code") {
            Some(v) => v.get_string().to_string(),
            None => "".to_string(),
        };

        let level = match info.get_object_property("level") {
            Some(v) => v.get_string().to_string(),
            None => "".to_string(),
        };

        self.logger
            .log_debug(&format!("onStatus: {} ({})", code, level));

        if code == NETSTREAM_FAILED
            || code == NETSTREAM_PLAY_FAILED
            || code == NETSTREAM_PLAY_STREAM_NOT_FOUND
            || code == NETCONNECTION_CONNECT_INVALID_APP
        {
            self.stream_id = -1;
            self.close();
            return false;
        }

        if code == NETSTREAM_PLAY_START {
            self.playing = true;

            // The play call is confirmed by status, not by _result
            if let Some(index) = self.method_calls.iter().position(|m| m == "play") {
                self.method_calls.remove(index);
            }
        }

        if code == NETSTREAM_PLAY_COMPLETE || code == NETSTREAM_PLAY_STOP {
            self.close();
            return true;
        }

        false
    }

    /// Sends the FCSubscribe invoke for a path
    /// subscribe_path - Path to subscribe to
    pub async fn send_fc_subscribe(&mut self, subscribe_path: &str) -> Result<(), ()> {
        self.logger
            .log_debug(&format!("FCSubscribe: {}", subscribe_path));

        let mut packet = rtmp_make_fc_subscribe_message(subscribe_path);

        self.send_rtmp(&mut packet, true).await
    }
}

// Tests
