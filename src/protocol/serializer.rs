//! RESP protocol serializer implementation
//!
//! Encodes reply frames as RESP2, the shell's `--resp` output mode.

use std::io::Write;

use super::resp::RespFrame;
use crate::error::Result;

/// Serialize a RESP frame to a writer
pub fn serialize_resp_frame<W: Write>(frame: &RespFrame, writer: &mut W) -> Result<()> {
    match frame {
        RespFrame::SimpleString(bytes) => {
            writer.write_all(b"+")?;
            writer.write_all(bytes)?;
            writer.write_all(b"\r\n")?;
        }

        RespFrame::Error(bytes) => {
            writer.write_all(b"-")?;
            writer.write_all(bytes)?;
            writer.write_all(b"\r\n")?;
        }

        RespFrame::Integer(n) => {
            write!(writer, ":{}\r\n", n)?;
        }

        RespFrame::BulkString(Some(bytes)) => {
            write!(writer, "${}\r\n", bytes.len())?;
            writer.write_all(bytes)?;
            writer.write_all(b"\r\n")?;
        }

        RespFrame::BulkString(None) => {
            writer.write_all(b"$-1\r\n")?;
        }

        RespFrame::Array(Some(frames)) => {
            write!(writer, "*{}\r\n", frames.len())?;
            for frame in frames {
                serialize_resp_frame(frame, writer)?;
            }
        }

        RespFrame::Array(None) => {
            writer.write_all(b"*-1\r\n")?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(frame: &RespFrame) -> Vec<u8> {
        let mut buf = Vec::new();
        serialize_resp_frame(frame, &mut buf).unwrap();
        buf
    }

    #[test]
    fn test_serialize_simple_string() {
        let frame = RespFrame::ok();
        let result = encode(&frame);
        assert_eq!(result, b"+OK\r\n");
    }

    #[test]
    fn test_serialize_error() {
        let frame = RespFrame::error("ERR test");
        let result = encode(&frame);
        assert_eq!(result, b"-ERR test\r\n");
    }

    #[test]
    fn test_serialize_integer() {
        let result = encode(&RespFrame::Integer(-100));
        assert_eq!(result, b":-100\r\n");
    }

    #[test]
    fn test_serialize_bulk_string() {
        let result = encode(&RespFrame::bulk_string("hello"));
        assert_eq!(result, b"$5\r\nhello\r\n");

        let result = encode(&RespFrame::null_bulk());
        assert_eq!(result, b"$-1\r\n");
    }

    #[test]
    fn test_serialize_array() {
        let frame = RespFrame::bulk_array(["foo", "bar"]);
        let result = encode(&frame);
        assert_eq!(result, b"*2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n");

        let result = encode(&RespFrame::null_array());
        assert_eq!(result, b"*-1\r\n");
    }
}
