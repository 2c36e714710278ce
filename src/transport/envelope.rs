//! Wire payload: `width:u16be ‖ height:u16be ‖ pixels`
//!
//! The sender side reuses one scratch allocation of `frame_len + 4` bytes
//! for every frame. Sealing hands out a frozen [`Bytes`] view of the
//! scratch; once the upload drops it, the next seal reclaims the same
//! allocation instead of growing a new one.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::EnvelopeError;

/// Width and height prefix length.
pub const HEADER_LEN: usize = 4;

pub const CONTENT_TYPE: &str = "application/octet-stream";

/// Bytes per pixel the collector expects after the header.
const WIRE_BYTES_PER_PIXEL: usize = 2;

#[derive(Debug)]
pub struct TransferEnvelope {
    scratch: BytesMut,
}

impl TransferEnvelope {
    pub fn new(frame_len: usize) -> Self {
        Self {
            scratch: BytesMut::with_capacity(frame_len + HEADER_LEN),
        }
    }

    /// Write header and pixels into the scratch buffer and return the payload.
    pub fn seal(&mut self, width: u16, height: u16, pixels: &[u8]) -> Bytes {
        self.scratch.clear();
        self.scratch.reserve(HEADER_LEN + pixels.len());
        self.scratch.put_u16(width);
        self.scratch.put_u16(height);
        self.scratch.extend_from_slice(pixels);
        self.scratch.split().freeze()
    }
}

/// A payload split back into its parts on the receiving side.
#[derive(Debug, PartialEq, Eq)]
pub struct DecodedFrame<'a> {
    pub width: u16,
    pub height: u16,
    pub pixels: &'a [u8],
}

/// Validate a payload the way the collector does.
pub fn decode_envelope(payload: &[u8]) -> Result<DecodedFrame<'_>, EnvelopeError> {
    if payload.len() < HEADER_LEN {
        return Err(EnvelopeError::TooShort(payload.len()));
    }

    let width = u16::from_be_bytes([payload[0], payload[1]]);
    let height = u16::from_be_bytes([payload[2], payload[3]]);
    let pixels = &payload[HEADER_LEN..];

    let expected = width as usize * height as usize * WIRE_BYTES_PER_PIXEL;
    if pixels.len() != expected {
        return Err(EnvelopeError::LengthMismatch {
            got: pixels.len(),
            expected,
        });
    }

    Ok(DecodedFrame {
        width,
        height,
        pixels,
    })
}
