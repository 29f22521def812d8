use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::AppError::Incomplete;
use crate::{AppError, AppResult};

/// Size of the big-endian length header in front of every frame body.
pub const FRAME_HEADER_LEN: usize = 4;

/// A length-prefixed message: `[i32 body length][body]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoFrame {
    pub body: Bytes,
}

impl EchoFrame {
    pub fn new(body: impl Into<Bytes>) -> Self {
        EchoFrame { body: body.into() }
    }

    /// Checks whether `buffer` holds one complete frame.
    ///
    /// Returns `Err(Incomplete)` when more bytes must be read first, and a
    /// protocol error when the header is negative or larger than
    /// `max_package_size`; the connection should be closed in that case.
    pub fn check(buffer: &mut BytesMut, max_package_size: usize) -> AppResult<()> {
        if buffer.remaining() < FRAME_HEADER_LEN {
            return Err(Incomplete);
        }
        let mut header = [0u8; FRAME_HEADER_LEN];
        header.copy_from_slice(&buffer[..FRAME_HEADER_LEN]);
        let body_size = i32::from_be_bytes(header);
        if body_size < 0 {
            return Err(AppError::MalformedProtocol(format!(
                "frame size {} less than 0",
                body_size
            )));
        }
        let body_size = body_size as usize;
        if body_size > max_package_size {
            return Err(AppError::MessageTooLarge(format!(
                "Frame of length {} is too large.",
                body_size
            )));
        }
        if buffer.remaining() < body_size + FRAME_HEADER_LEN {
            buffer.reserve(body_size + FRAME_HEADER_LEN - buffer.remaining());
            return Err(Incomplete);
        }
        Ok(())
    }

    /// Splits one frame off the front of `buffer`, if a whole one is there.
    pub fn parse(buffer: &mut BytesMut, max_package_size: usize) -> AppResult<Option<EchoFrame>> {
        // perform a check to ensure we have enough data
        match EchoFrame::check(buffer, max_package_size) {
            Ok(_) => {
                let body_length = buffer.get_i32() as usize;
                let body = buffer.split_to(body_length).freeze();
                Ok(Some(EchoFrame { body }))
            }
            Err(AppError::Incomplete) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Header plus body, ready to write.
    pub fn encode(&self) -> BytesMut {
        let mut out = BytesMut::with_capacity(FRAME_HEADER_LEN + self.body.len());
        out.put_i32(self.body.len() as i32);
        out.put_slice(&self.body);
        out
    }
}
