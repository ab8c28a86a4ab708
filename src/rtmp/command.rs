// RTMP command (inbound invoke)

use crate::amf::{AMF0Value, AMFDecodingCursor};

/// AMF0 string type marker, every invoke must start with it
const AMF0_STRING_MARKER: u8 = 0x02;

/// Remote command decoded from an invoke message body
///
/// The arguments keep the wire order, including the method name
/// itself at index 0 and the transaction ID at index 1
pub struct RtmpCommand {
    /// Method name
    pub cmd: String,

    /// Every AMF0 value of the body, in order
    pub arguments: Vec<AMF0Value>,
}

impl RtmpCommand {
    /// Decodes command from the body of an invoke message
    /// data - The message body
    pub fn decode(data: &[u8]) -> Result<RtmpCommand, ()> {
        if data.is_empty() || data[0] != AMF0_STRING_MARKER {
            // Invokes always start with a string method name
            return Err(());
        }

        let mut cursor = AMFDecodingCursor::new(data);

        let cmd_amf = AMF0Value::read(&mut cursor, data)?;
        let cmd = cmd_amf.get_string().to_string();

        let mut arguments: Vec<AMF0Value> = vec![cmd_amf];

        while !cursor.ended() {
            let val = AMF0Value::read(&mut cursor, data)?;

            arguments.push(val);
        }

        Ok(RtmpCommand { cmd, arguments })
    }

    /// Gets argument by its position in the body
    /// The method name is index 0, the transaction ID is index 1
    pub fn get_argument(&self, index: usize) -> Option<&AMF0Value> {
        self.arguments.get(index)
    }

    /// Gets the transaction ID of the command
    pub fn get_transaction_id(&self) -> f64 {
        match self.arguments.get(1) {
            Some(v) => v.get_float(),
            None => 0.0,
        }
    }

    /// Gets string representation of the command for debug logging
    pub fn to_debug_string(&self) -> String {
        let mut s = format!("{} {}\n", self.cmd, "{");

        for (index, arg_val) in self.arguments.iter().enumerate() {
            s.push_str(&format!(
                "    [{}] = {}\n",
                index,
                arg_val.to_debug_string("    ")
            ));
        }

        s.push('}');

        s
    }
}

// Tests
