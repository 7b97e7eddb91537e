//! Wire format for frame serialization.
//!
//! Frame format: `[length:4][checksum:4][kind:1][payload:N]`
//!
//! - **length**: Total frame size including header (little-endian u32)
//! - **checksum**: CRC32C of (kind + payload) for integrity verification
//! - **kind**: [`FrameKind`] discriminant
//! - **payload**: Opaque bytes, possibly empty

/// Header size: 4 (length) + 4 (checksum) + 1 (kind) = 9 bytes.
pub const HEADER_SIZE: usize = 9;

/// Maximum payload size (16MB).
///
/// Frames larger than this are rejected to prevent memory exhaustion.
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Wire format error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    /// Not enough data to parse the frame.
    #[error("insufficient data: need {needed} bytes, have {have}")]
    InsufficientData {
        /// Minimum bytes required to parse.
        needed: usize,
        /// Actual bytes available.
        have: usize,
    },

    /// Checksum verification failed - data was corrupted.
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Expected checksum from header.
        expected: u32,
        /// Computed checksum from data.
        actual: u32,
    },

    /// Payload exceeds maximum allowed size.
    #[error("frame too large: {size} bytes (max {MAX_PAYLOAD_SIZE})")]
    FrameTooLarge {
        /// Payload size in bytes.
        size: usize,
    },

    /// Length field has an invalid value.
    #[error("invalid frame length: {length}")]
    InvalidLength {
        /// The invalid length value from the header.
        length: u32,
    },

    /// Kind byte does not name a known frame kind.
    #[error("unknown frame kind: {kind:#04x}")]
    UnknownKind {
        /// The unrecognized kind byte.
        kind: u8,
    },

    /// Hello frame payload is not a UTF-8 address.
    #[error("hello frame does not carry a UTF-8 address")]
    InvalidHello,
}

impl WireError {
    /// Whether the byte stream can no longer be parsed after this error.
    ///
    /// A bad length field leaves no way to find the next frame boundary.
    /// Checksum and kind errors consume exactly one frame.
    pub fn desynchronizes(&self) -> bool {
        matches!(
            self,
            WireError::FrameTooLarge { .. } | WireError::InvalidLength { .. }
        )
    }
}

/// What a frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    /// Application payload, delivered to the consumer.
    Data = 0,
    /// Dialer announcement: payload is the dialer's listening address.
    Hello = 1,
}

impl TryFrom<u8> for FrameKind {
    type Error = WireError;

    fn try_from(kind: u8) -> Result<Self, Self::Error> {
        match kind {
            0 => Ok(FrameKind::Data),
            1 => Ok(FrameKind::Hello),
            other => Err(WireError::UnknownKind { kind: other }),
        }
    }
}

/// Fixed-size header preceding every payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Total frame size including header.
    pub length: u32,
    /// CRC32C checksum of (kind + payload).
    pub checksum: u32,
    /// Raw kind byte, validated after the checksum.
    pub kind: u8,
}

impl FrameHeader {
    /// Serialize header into buffer (must be at least HEADER_SIZE bytes).
    pub fn serialize_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0..4].copy_from_slice(&self.length.to_le_bytes());
        buf[4..8].copy_from_slice(&self.checksum.to_le_bytes());
        buf[8] = self.kind;
    }

    /// Deserialize header from buffer.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientData` if buffer is smaller than HEADER_SIZE.
    pub fn deserialize(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < HEADER_SIZE {
            return Err(WireError::InsufficientData {
                needed: HEADER_SIZE,
                have: buf.len(),
            });
        }

        Ok(Self {
            length: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            checksum: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            kind: buf[8],
        })
    }

    /// Reject length fields that cannot describe a valid frame.
    fn validate_length(&self) -> Result<usize, WireError> {
        if self.length < HEADER_SIZE as u32 {
            return Err(WireError::InvalidLength {
                length: self.length,
            });
        }
        let payload_len = self.length as usize - HEADER_SIZE;
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(WireError::FrameTooLarge { size: payload_len });
        }
        Ok(self.length as usize)
    }
}

/// Compute CRC32C checksum over kind + payload.
fn compute_checksum(kind: u8, payload: &[u8]) -> u32 {
    crc32c::crc32c_append(crc32c::crc32c(&[kind]), payload)
}

/// Serialize one frame.
///
/// Returns: `[length:4][checksum:4][kind:1][payload:N]`
///
/// # Errors
///
/// Returns `FrameTooLarge` if payload exceeds MAX_PAYLOAD_SIZE.
///
/// # Examples
///
/// ```
/// use courier_transport::wire::{FrameKind, deserialize_frame, serialize_frame};
///
/// let frame = serialize_frame(FrameKind::Data, b"hello").expect("serialize");
/// let (kind, payload) = deserialize_frame(&frame).expect("deserialize");
///
/// assert_eq!(kind, FrameKind::Data);
/// assert_eq!(payload, b"hello");
/// ```
pub fn serialize_frame(kind: FrameKind, payload: &[u8]) -> Result<Vec<u8>, WireError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(WireError::FrameTooLarge {
            size: payload.len(),
        });
    }

    let total_length = HEADER_SIZE + payload.len();
    let mut data = vec![0u8; total_length];

    let header = FrameHeader {
        length: total_length as u32,
        checksum: compute_checksum(kind as u8, payload),
        kind: kind as u8,
    };

    header.serialize_into(&mut data[..HEADER_SIZE]);
    data[HEADER_SIZE..].copy_from_slice(payload);

    Ok(data)
}

/// Deserialize exactly one complete frame, validating checksum.
///
/// # Errors
///
/// - `InsufficientData`: Not enough bytes to parse header or full frame
/// - `ChecksumMismatch`: Data was corrupted
/// - `InvalidLength` / `FrameTooLarge`: Length field is malformed
/// - `UnknownKind`: Kind byte not recognized
pub fn deserialize_frame(data: &[u8]) -> Result<(FrameKind, Vec<u8>), WireError> {
    match try_deserialize_frame(data)? {
        Some((kind, payload, _consumed)) => Ok((kind, payload)),
        None => {
            let needed = FrameHeader::deserialize(data)?.length as usize;
            Err(WireError::InsufficientData {
                needed,
                have: data.len(),
            })
        }
    }
}

/// Try to deserialize from a buffer that may contain partial data.
///
/// # Returns
///
/// - `Ok(Some((kind, payload, consumed)))` if a complete frame was parsed
/// - `Ok(None)` if more data is needed (not an error condition)
/// - `Err` if data is malformed
///
/// A checksum or kind error still describes a whole frame; callers that want
/// to skip it can use [`frame_length`] to find where the next frame starts.
///
/// # Examples
///
/// ```
/// use courier_transport::wire::{FrameKind, serialize_frame, try_deserialize_frame};
///
/// let frame = serialize_frame(FrameKind::Data, b"test").expect("serialize");
///
/// // Partial data returns None
/// assert!(try_deserialize_frame(&frame[..5]).expect("partial").is_none());
///
/// // Complete frame returns Some
/// let result = try_deserialize_frame(&frame).expect("complete");
/// assert!(result.is_some());
/// ```
pub fn try_deserialize_frame(
    data: &[u8],
) -> Result<Option<(FrameKind, Vec<u8>, usize)>, WireError> {
    if data.len() < HEADER_SIZE {
        return Ok(None); // Need more data for header
    }

    let header = FrameHeader::deserialize(data)?;
    let expected_len = header.validate_length()?;
    if data.len() < expected_len {
        return Ok(None); // Need more data for payload
    }

    let payload = &data[HEADER_SIZE..expected_len];

    let computed = compute_checksum(header.kind, payload);
    if computed != header.checksum {
        return Err(WireError::ChecksumMismatch {
            expected: header.checksum,
            actual: computed,
        });
    }

    let kind = FrameKind::try_from(header.kind)?;
    Ok(Some((kind, payload.to_vec(), expected_len)))
}

/// Total length of the frame at the start of `data`, if its header is
/// complete and its length field is sane.
pub fn frame_length(data: &[u8]) -> Option<usize> {
    FrameHeader::deserialize(data)
        .ok()
        .and_then(|header| header.validate_length().ok())
}
