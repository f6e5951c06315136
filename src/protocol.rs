//! Wire codec and framing.
//!
//! Protocol:
//!   Request:  [4-byte length BE] [MessagePack payload]
//!   Response: [4-byte length BE] [MessagePack payload]
//!
//! Payloads are encoded with named fields (`rmp_serde::to_vec_named`) so the
//! full object graph round-trips, including the command-dependent payload.
//! `read_frame` always consumes exactly one message, no matter how the
//! transport splits or coalesces the bytes.

use std::io::{ErrorKind, Read, Write};

use crate::error::{PhonebookError, Result};
use crate::model::{Request, Response};

/// Default TCP port for the phonebook service.
pub const DEFAULT_PORT: u16 = 12333;

/// Upper bound on a single frame's payload.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const LENGTH_PREFIX_SIZE: usize = 4;

pub fn encode_request(request: &Request) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(request)?)
}

pub fn decode_request(bytes: &[u8]) -> Result<Request> {
    Ok(rmp_serde::from_slice(bytes)?)
}

pub fn encode_response(response: &Response) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(response)?)
}

pub fn decode_response(bytes: &[u8]) -> Result<Response> {
    Ok(rmp_serde::from_slice(bytes)?)
}

/// Read one frame.
///
/// Returns `Ok(None)` when the peer closed the connection at a message
/// boundary. An EOF anywhere inside a frame is an `UnexpectedEof` IO error.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; LENGTH_PREFIX_SIZE];
    let mut filled = 0;
    while filled < LENGTH_PREFIX_SIZE {
        match reader.read(&mut len_buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(PhonebookError::Io(std::io::Error::new(
                    ErrorKind::UnexpectedEof,
                    format!("connection closed inside length prefix ({} of 4 bytes)", filled),
                )))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(PhonebookError::FrameTooLarge(len));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;

    Ok(Some(buf))
}

pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<()> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(PhonebookError::FrameTooLarge(payload.len()));
    }
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

pub fn write_request<W: Write>(writer: &mut W, request: &Request) -> Result<()> {
    write_frame(writer, &encode_request(request)?)
}

pub fn write_response<W: Write>(writer: &mut W, response: &Response) -> Result<()> {
    write_frame(writer, &encode_response(response)?)
}

/// Read and decode one request; `Ok(None)` on a clean close.
pub fn read_request<R: Read>(reader: &mut R) -> Result<Option<Request>> {
    match read_frame(reader)? {
        Some(bytes) => decode_request(&bytes).map(Some),
        None => Ok(None),
    }
}

/// Read and decode one response. A clean close here is an error: a
/// response was expected.
pub fn read_response<R: Read>(reader: &mut R) -> Result<Response> {
    match read_frame(reader)? {
        Some(bytes) => decode_response(&bytes),
        None => Err(PhonebookError::ConnectionClosed),
    }
}
