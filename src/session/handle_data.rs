// Data (notify) packet handling logic

use tokio::io::{AsyncRead, AsyncWrite};

use crate::amf::{AMF0Value, AMFDecodingCursor};

use super::RtmpSession;

impl<TR: AsyncRead + Unpin, TW: AsyncWrite + Unpin> RtmpSession<TR, TW> {
    /// Handles a notify message body
    ///
    /// When the notification is onMetaData, the metadata is printed
    /// and the stream duration is captured for progress reporting
    /// body - Message body (AMF0 sequence)
    /// Returns true if the notification was stream metadata
    pub fn handle_notify(&mut self, body: &[u8]) -> bool {
        let mut cursor = AMFDecodingCursor::new(body);

        let name = match AMF0Value::read(&mut cursor, body) {
            Ok(v) => v,
            Err(_) => {
                self.logger.log_error("Error decoding meta data packet");
                return false;
            }
        };

        if name.get_string() != "onMetaData" {
            return false;
        }

        self.logger.log_info("Metadata:");

        while !cursor.ended() {
            let value = match AMF0Value::read(&mut cursor, body) {
                Ok(v) => v,
                Err(_) => {
                    self.logger.log_error("Error decoding meta data packet");
                    return false;
                }
            };

            self.logger.log_info(&value.to_debug_string(""));

            if let Some(duration) = value.find_property("duration") {
                self.duration = duration.get_float();
                self.logger
                    .log_debug(&format!("Set duration: {:.2}", self.duration));
            }
        }

        true
    }
}

// Tests

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::Logger;
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

    fn encode_on_metadata(duration: f64) -> Vec<u8> {
        let mut properties: HashMap<String, AMF0Value> = HashMap::new();

        properties.insert("duration".to_string(), AMF0Value::Number { value: duration });
        properties.insert("framerate".to_string(), AMF0Value::Number { value: 25.0 });

        let mut body = AMF0Value::String {
            value: "onMetaData".to_string(),
        }
        .encode();

        body.extend(AMF0Value::Object { properties }.encode());

        body
    }

    #[tokio::test]
    async fn test_on_metadata_captures_duration() {
        let mut session = make_test_session();

        let handled = session.handle_notify(&encode_on_metadata(359.2));

        assert!(handled);
        assert_eq!(session.get_duration(), 359.2);
    }

    #[tokio::test]
    async fn test_other_notifications_are_not_media() {
        let mut session = make_test_session();

        let body = AMF0Value::String {
            value: "|RtmpSampleAccess".to_string(),
        }
        .encode();

        assert!(!session.handle_notify(&body));
        assert_eq!(session.get_duration(), 0.0);
    }

    #[tokio::test]
    async fn test_truncated_metadata_is_rejected() {
        let mut session = make_test_session();

        let mut body = encode_on_metadata(100.0);
        body.truncate(body.len() - 4);

        assert!(!session.handle_notify(&body));
    }
}
