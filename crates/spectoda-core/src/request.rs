//! Request/response envelope
//!
//! ```text
//! request:  [flag, uuid u32, body...]
//! response: [flag, uuid u32, error_code u8, body...]
//! ```
//!
//! A response is valid only when its flag is the response flag paired with
//! the request flag, the uuid is echoed and the error code is zero.

use bytes::Bytes;

use crate::codec::{Reader, Writer};
use crate::constants::command;
use crate::{Error, Result};

/// Request header size: flag + uuid
pub const REQUEST_HEADER_SIZE: usize = 1 + 4;

/// Response header size: flag + uuid + error code
pub const RESPONSE_HEADER_SIZE: usize = 1 + 4 + 1;

/// Firmware version field of a version response
pub const FW_VERSION_SIZE: usize = 32;

/// TNGL fingerprint field of a fingerprint response
pub const TNGL_FINGERPRINT_SIZE: usize = 32;

/// Controller name field used by adoption
pub const DEVICE_NAME_SIZE: usize = 16;

pub const OWNER_SIGNATURE_SIZE: usize = 16;
pub const OWNER_KEY_SIZE: usize = 16;

/// Build a request frame
pub fn encode_request(flag: u8, uuid: u32, body: &[u8]) -> Result<Bytes> {
    let mut writer = Writer::new(REQUEST_HEADER_SIZE + body.len());
    writer.write_flag(flag)?;
    writer.write_u32(uuid)?;
    writer.write_bytes(body, body.len())?;
    Ok(writer.into_bytes())
}

/// Split a request frame into `(flag, uuid, body)`
pub fn decode_request(bytes: &[u8]) -> Result<(u8, u32, &[u8])> {
    let mut reader = Reader::new(bytes);
    let flag = reader.read_u8()?;
    let uuid = reader.read_u32()?;
    Ok((flag, uuid, reader.remaining()))
}

/// Build a response frame
pub fn encode_response(flag: u8, uuid: u32, error_code: u8, body: &[u8]) -> Result<Bytes> {
    let mut writer = Writer::new(RESPONSE_HEADER_SIZE + body.len());
    writer.write_flag(flag)?;
    writer.write_u32(uuid)?;
    writer.write_u8(error_code)?;
    writer.write_bytes(body, body.len())?;
    Ok(writer.into_bytes())
}

/// Validate a response to `request_flag`/`uuid`, returning a reader over its body
pub fn parse_response(bytes: &[u8], request_flag: u8, uuid: u32) -> Result<Reader<'_>> {
    let expected = command::response_flag(request_flag)
        .ok_or_else(|| Error::InvalidValue(format!("flag {request_flag} expects no response")))?;

    let mut reader = Reader::new(bytes);
    let flag = reader.read_u8()?;
    if flag != expected {
        return Err(Error::InvalidResponseFlag {
            expected,
            actual: flag,
        });
    }

    let echoed = reader.read_u32()?;
    if echoed != uuid {
        return Err(Error::InvalidResponseUuid {
            expected: uuid,
            actual: echoed,
        });
    }

    match reader.read_u8()? {
        0 => Ok(reader),
        code => Err(Error::ResponseError(code)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_validation() {
        let response = encode_response(command::FW_VERSION_RESPONSE, 7, 0, b"abc").unwrap();
        let mut body = parse_response(&response, command::FW_VERSION_REQUEST, 7).unwrap();
        assert_eq!(body.read_string(3).unwrap(), "abc");

        assert_eq!(
            parse_response(&response, command::FW_VERSION_REQUEST, 8).err(),
            Some(Error::InvalidResponseUuid { expected: 8, actual: 7 })
        );
        assert_eq!(
            parse_response(&response, command::ADOPT_REQUEST, 7).err(),
            Some(Error::InvalidResponseFlag {
                expected: command::ADOPT_RESPONSE,
                actual: command::FW_VERSION_RESPONSE
            })
        );
    }

    #[test]
    fn test_device_error_code() {
        let response = encode_response(command::ADOPT_RESPONSE, 1, 3, &[]).unwrap();
        assert_eq!(
            parse_response(&response, command::ADOPT_REQUEST, 1).err(),
            Some(Error::ResponseError(3))
        );
    }
}
