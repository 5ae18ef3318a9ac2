//! Proxy method frames sent over the out-of-band plugin channel.
//!
//! Layout, all integers big-endian:
//!
//! ```text
//! +-----+------------+-----+--------------+-------+-----+------------+ ...
//! | u16 | unit name  | u16 | method name  | u16   | u16 | arg 0      |
//! | len | (mutf-8)   | len | (mutf-8)     | count | len | (mutf-8)   |
//! +-----+------------+-----+--------------+-------+-----+------------+ ...
//! ```
//!
//! Strings use the modified UTF-8 encoding of `java.io.DataOutput::writeUTF`:
//! NUL is written as two bytes and supplementary characters as two 3-byte
//! surrogate halves.

use crate::error::CoreError;

/// Default channel proxy frames are delivered on.
pub const DEFAULT_PROXY_CHANNEL: &str = "essentials:methods";

/// A decoded proxy method call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyCall {
    pub unit: String,
    pub method: String,
    pub args: Vec<String>,
}

/// Encodes a proxy method call into a frame.
pub fn encode_proxy_frame(unit: &str, method: &str, args: &[&str]) -> Result<Vec<u8>, CoreError> {
    let count = u16::try_from(args.len())
        .map_err(|_| CoreError::Frame(format!("too many arguments: {}", args.len())))?;

    let mut buffer = Vec::new();
    write_utf(&mut buffer, unit)?;
    write_utf(&mut buffer, method)?;
    buffer.extend_from_slice(&count.to_be_bytes());
    for arg in args {
        write_utf(&mut buffer, arg)?;
    }
    Ok(buffer)
}

/// Decodes a frame produced by [`encode_proxy_frame`].
pub fn decode_proxy_frame(data: &[u8]) -> Result<ProxyCall, CoreError> {
    let mut reader = FrameReader { data, position: 0 };

    let unit = reader.read_utf()?;
    let method = reader.read_utf()?;
    let count = reader.read_u16()?;
    let args = (0..count)
        .map(|_| reader.read_utf())
        .collect::<Result<Vec<_>, _>>()?;

    if reader.position != data.len() {
        return Err(CoreError::Frame(format!(
            "{} trailing bytes after frame",
            data.len() - reader.position
        )));
    }

    Ok(ProxyCall { unit, method, args })
}

fn write_utf(buffer: &mut Vec<u8>, value: &str) -> Result<(), CoreError> {
    let mut encoded = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007F => encoded.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                encoded.push(0xC0 | (unit >> 6) as u8);
                encoded.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                encoded.push(0xE0 | (unit >> 12) as u8);
                encoded.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                encoded.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }

    let length = u16::try_from(encoded.len())
        .map_err(|_| CoreError::Frame(format!("encoded string too long: {} bytes", encoded.len())))?;
    buffer.extend_from_slice(&length.to_be_bytes());
    buffer.extend_from_slice(&encoded);
    Ok(())
}

struct FrameReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> FrameReader<'a> {
    fn take(&mut self, count: usize) -> Result<&'a [u8], CoreError> {
        let end = self.position + count;
        if end > self.data.len() {
            return Err(CoreError::Frame("frame truncated".to_string()));
        }
        let slice = &self.data[self.position..end];
        self.position = end;
        Ok(slice)
    }

    fn read_u16(&mut self) -> Result<u16, CoreError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_utf(&mut self) -> Result<String, CoreError> {
        let length = self.read_u16()? as usize;
        let bytes = self.take(length)?;

        let mut units = Vec::with_capacity(length);
        let mut i = 0;
        while i < bytes.len() {
            let b = bytes[i];
            let (unit, width) = match b >> 4 {
                0x0..=0x7 => (b as u16, 1),
                0xC | 0xD => {
                    let b2 = continuation(bytes, i + 1)?;
                    ((((b & 0x1F) as u16) << 6) | b2, 2)
                }
                0xE => {
                    let b2 = continuation(bytes, i + 1)?;
                    let b3 = continuation(bytes, i + 2)?;
                    ((((b & 0x0F) as u16) << 12) | (b2 << 6) | b3, 3)
                }
                _ => return Err(CoreError::Frame(format!("malformed byte 0x{:02x}", b))),
            };
            units.push(unit);
            i += width;
        }

        String::from_utf16(&units).map_err(|e| CoreError::Frame(e.to_string()))
    }
}

fn continuation(bytes: &[u8], index: usize) -> Result<u16, CoreError> {
    match bytes.get(index) {
        Some(&b) if b & 0xC0 == 0x80 => Ok((b & 0x3F) as u16),
        _ => Err(CoreError::Frame("malformed continuation byte".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_frame_layout() {
        let frame = encode_proxy_frame("Auth", "login", &["Steve"]).unwrap();
        let mut expected: Vec<u8> = vec![0x00, 0x04];
        expected.extend_from_slice(b"Auth");
        expected.extend_from_slice(&[0x00, 0x05]);
        expected.extend_from_slice(b"login");
        expected.extend_from_slice(&[0x00, 0x01, 0x00, 0x05]);
        expected.extend_from_slice(b"Steve");
        assert_eq!(frame, expected);
    }

    #[test]
    fn test_nul_and_supplementary_use_modified_utf8() {
        let frame = encode_proxy_frame("\0", "\u{1F600}", &[]).unwrap();
        // NUL becomes C0 80; the emoji becomes two 3-byte surrogate halves.
        assert_eq!(&frame[..4], &[0x00, 0x02, 0xC0, 0x80]);
        assert_eq!(
            &frame[4..12],
            &[0x00, 0x06, 0xED, 0xA0, 0xBD, 0xED, 0xB8, 0x80]
        );
        assert_eq!(&frame[12..], &[0x00, 0x00]);
    }

    #[test]
    fn test_decode_recovers_call() {
        let frame = encode_proxy_frame("Messages", "broadcast", &["héllo", "", "wörld"]).unwrap();
        let call = decode_proxy_frame(&frame).unwrap();
        assert_eq!(call.unit, "Messages");
        assert_eq!(call.method, "broadcast");
        assert_eq!(call.args, vec!["héllo", "", "wörld"]);
    }

    #[test]
    fn test_oversized_string_is_rejected() {
        let long = "x".repeat(u16::MAX as usize + 1);
        assert!(matches!(
            encode_proxy_frame("Unit", &long, &[]),
            Err(CoreError::Frame(_))
        ));
    }

    #[test]
    fn test_truncated_frame_is_rejected() {
        let frame = encode_proxy_frame("Unit", "method", &["arg"]).unwrap();
        assert!(decode_proxy_frame(&frame[..frame.len() - 1]).is_err());
    }
}
