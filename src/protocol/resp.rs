//! RESP data types and frame definitions

use std::fmt;

/// RESP2 reply frame
#[derive(Debug, Clone, PartialEq)]
pub enum RespFrame {
    /// Simple string: +OK\r\n
    SimpleString(Vec<u8>),

    /// Error: -Error message\r\n
    Error(Vec<u8>),

    /// Integer: :1000\r\n
    Integer(i64),

    /// Bulk string: $6\r\nfoobar\r\n or $-1\r\n (null)
    BulkString(Option<Vec<u8>>),

    /// Array: *2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n or *-1\r\n (null)
    Array(Option<Vec<RespFrame>>),
}

impl RespFrame {
    /// Create an OK status response
    pub fn ok() -> Self {
        RespFrame::SimpleString(b"OK".to_vec())
    }

    /// Create the QUEUED status returned inside MULTI
    pub fn queued() -> Self {
        RespFrame::SimpleString(b"QUEUED".to_vec())
    }

    /// Create a simple string response
    pub fn simple_string(s: impl Into<Vec<u8>>) -> Self {
        RespFrame::SimpleString(s.into())
    }

    /// Check if this frame is an error
    pub fn is_error(&self) -> bool {
        matches!(self, RespFrame::Error(_))
    }

    /// Create an error response
    pub fn error(msg: impl Into<Vec<u8>>) -> Self {
        RespFrame::Error(msg.into())
    }

    /// Create a null bulk string
    pub fn null_bulk() -> Self {
        RespFrame::BulkString(None)
    }

    /// Create a null array
    pub fn null_array() -> Self {
        RespFrame::Array(None)
    }

    /// Create a bulk string from bytes
    pub fn bulk_string(bytes: impl AsRef<[u8]>) -> Self {
        RespFrame::BulkString(Some(bytes.as_ref().to_vec()))
    }

    /// Bulk string for an optional value, null when absent
    pub fn optional_bulk(bytes: Option<Vec<u8>>) -> Self {
        RespFrame::BulkString(bytes)
    }

    /// Create an array of frames
    pub fn array(frames: Vec<RespFrame>) -> Self {
        RespFrame::Array(Some(frames))
    }

    /// Array of bulk strings
    pub fn bulk_array<I, B>(items: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        RespFrame::Array(Some(items.into_iter().map(RespFrame::bulk_string).collect()))
    }

    /// Integer reply for a boolean (1/0)
    pub fn boolean(b: bool) -> Self {
        RespFrame::Integer(b as i64)
    }

    /// Bulk string holding a float formatted the way Redis formats scores
    pub fn double(f: f64) -> Self {
        RespFrame::BulkString(Some(format_double(f).into_bytes()))
    }

    /// Check if this frame represents a null/nil value
    pub fn is_null(&self) -> bool {
        matches!(self, RespFrame::BulkString(None) | RespFrame::Array(None))
    }

    /// Borrow the payload of a bulk or simple string
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            RespFrame::BulkString(Some(b)) | RespFrame::SimpleString(b) => Some(b),
            _ => None,
        }
    }

    /// Borrow the elements of a non-null array
    pub fn as_array(&self) -> Option<&[RespFrame]> {
        match self {
            RespFrame::Array(Some(items)) => Some(items),
            _ => None,
        }
    }

    /// Integer payload, if any
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            RespFrame::Integer(n) => Some(*n),
            _ => None,
        }
    }
}

/// Format a float like Redis does in replies: integral values without a
/// fractional part, infinities as `inf`/`-inf`.
pub fn format_double(f: f64) -> String {
    if f.is_infinite() {
        if f > 0.0 { "inf".to_string() } else { "-inf".to_string() }
    } else if f.fract() == 0.0 && f.abs() < 1e17 {
        format!("{}", f as i64)
    } else {
        format!("{}", f)
    }
}

impl From<String> for RespFrame {
    fn from(s: String) -> Self {
        RespFrame::BulkString(Some(s.into_bytes()))
    }
}

impl From<&str> for RespFrame {
    fn from(s: &str) -> Self {
        RespFrame::bulk_string(s)
    }
}

impl From<i64> for RespFrame {
    fn from(n: i64) -> Self {
        RespFrame::Integer(n)
    }
}

impl From<usize> for RespFrame {
    fn from(n: usize) -> Self {
        RespFrame::Integer(n as i64)
    }
}

impl From<Vec<RespFrame>> for RespFrame {
    fn from(frames: Vec<RespFrame>) -> Self {
        RespFrame::Array(Some(frames))
    }
}

/// redis-cli style rendering, used by the command-line shell
impl fmt::Display for RespFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn render(frame: &RespFrame, indent: usize, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match frame {
                RespFrame::SimpleString(s) => write!(f, "{}", String::from_utf8_lossy(s)),
                RespFrame::Error(e) => write!(f, "(error) {}", String::from_utf8_lossy(e)),
                RespFrame::Integer(n) => write!(f, "(integer) {}", n),
                RespFrame::BulkString(None) => write!(f, "(nil)"),
                RespFrame::BulkString(Some(b)) => write!(f, "\"{}\"", String::from_utf8_lossy(b).escape_debug()),
                RespFrame::Array(None) => write!(f, "(nil)"),
                RespFrame::Array(Some(items)) if items.is_empty() => write!(f, "(empty array)"),
                RespFrame::Array(Some(items)) => {
                    for (i, item) in items.iter().enumerate() {
                        if i > 0 {
                            writeln!(f)?;
                            write!(f, "{:indent$}", "", indent = indent)?;
                        }
                        let label = format!("{}) ", i + 1);
                        write!(f, "{}", label)?;
                        render(item, indent + label.len(), f)?;
                    }
                    Ok(())
                }
            }
        }
        render(self, 0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resp_frame_creation() {
        let ok = RespFrame::ok();
        assert!(matches!(ok, RespFrame::SimpleString(_)));

        let err = RespFrame::error("ERR test");
        assert!(err.is_error());

        let null = RespFrame::null_bulk();
        assert!(null.is_null());
    }

    #[test]
    fn test_resp_frame_conversions() {
        let frame: RespFrame = "hello".into();
        assert_eq!(frame.as_bytes(), Some(&b"hello"[..]));

        let frame: RespFrame = 42i64.into();
        assert_eq!(frame.as_integer(), Some(42));
    }

    #[test]
    fn test_format_double() {
        assert_eq!(format_double(3.0), "3");
        assert_eq!(format_double(-2.5), "-2.5");
        assert_eq!(format_double(f64::INFINITY), "inf");
        assert_eq!(format_double(f64::NEG_INFINITY), "-inf");
    }

    #[test]
    fn test_display_nested_array() {
        let frame = RespFrame::array(vec![
            RespFrame::bulk_string("a"),
            RespFrame::array(vec![RespFrame::Integer(1), RespFrame::null_bulk()]),
        ]);
        assert_eq!(frame.to_string(), "1) \"a\"\n2) 1) (integer) 1\n   2) (nil)");
    }
}
