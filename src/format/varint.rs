use crate::error::FormatError;

/// Maximum number of bytes a u64 varint may occupy.
pub const MAX_VARINT_LEN: usize = 10;

/// Cursor over a buffer of LEB128-style varints.
///
/// Each byte carries 7 bits of payload, least significant group first; the
/// high bit marks that another byte follows.
pub struct VarintReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> VarintReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Read the next varint.
    ///
    /// # Errors
    ///
    /// - [`FormatError::MalformedDirectory`] if the buffer ends mid-value
    /// - [`FormatError::VarintTooLong`] if the value spans more than 10 bytes
    pub fn read_varint(&mut self) -> Result<u64, FormatError> {
        let mut value = 0u64;

        for i in 0..MAX_VARINT_LEN {
            let byte = *self.buf.get(self.pos).ok_or_else(|| {
                FormatError::MalformedDirectory(format!(
                    "unexpected end of data at byte {}",
                    self.pos
                ))
            })?;
            self.pos += 1;

            value |= u64::from(byte & 0x7F) << (7 * i);
            if byte < 0x80 {
                return Ok(value);
            }
        }

        Err(FormatError::VarintTooLong)
    }
}
