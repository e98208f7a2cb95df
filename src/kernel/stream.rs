//! Binary stream codec used to ship aggregation state between nodes.
//!
//! Hosts usually bring their own transport. The [`StreamOutput`] and
//! [`StreamInput`] traits are the only surface the aggregation types depend
//! on; [`BytesOutput`] and [`BytesInput`] are a little-endian in-memory
//! implementation for tests, benches and simple embedders.
//!
//! # Example
//!
//! ```rust
//! use pca_stats::kernel::{BytesInput, BytesOutput, StreamInput, StreamOutput};
//!
//! let mut out = BytesOutput::new();
//! out.write_u64(35);
//! out.write_optional_bool(Some(true));
//!
//! let bytes = out.into_bytes();
//! let mut input = BytesInput::new(&bytes);
//! assert_eq!(input.read_u64().unwrap(), 35);
//! assert_eq!(input.read_optional_bool().unwrap(), Some(true));
//! ```

use crate::error::{Result, SerializationError};

/// Primitive write operations.
pub trait StreamOutput {
    fn write_u8(&mut self, v: u8);
    fn write_u64(&mut self, v: u64);
    fn write_f64(&mut self, v: f64);

    fn write_bool(&mut self, v: bool) {
        self.write_u8(u8::from(v));
    }

    /// Length-prefixed UTF-8.
    fn write_string(&mut self, v: &str) {
        self.write_u64(v.len() as u64);
        for &b in v.as_bytes() {
            self.write_u8(b);
        }
    }

    /// 0 = absent, 1 = false, 2 = true.
    fn write_optional_bool(&mut self, v: Option<bool>) {
        self.write_u8(match v {
            None => 0,
            Some(false) => 1,
            Some(true) => 2,
        });
    }

    fn write_optional_string(&mut self, v: Option<&str>) {
        match v {
            Some(s) => {
                self.write_bool(true);
                self.write_string(s);
            }
            None => self.write_bool(false),
        }
    }

    fn write_f64_slice(&mut self, v: &[f64]) {
        self.write_u64(v.len() as u64);
        for &x in v {
            self.write_f64(x);
        }
    }

    fn write_string_slice(&mut self, v: &[String]) {
        self.write_u64(v.len() as u64);
        for s in v {
            self.write_string(s);
        }
    }
}

/// Primitive read operations. Every read fails with
/// [`SerializationError`] on truncated or malformed input.
pub trait StreamInput {
    fn read_u8(&mut self) -> Result<u8>;
    fn read_u64(&mut self) -> Result<u64>;
    fn read_f64(&mut self) -> Result<f64>;

    fn read_bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            tag => Err(SerializationError::InvalidTag { what: "bool", tag }.into()),
        }
    }

    /// Reads a length prefix and checks it fits in `usize`.
    fn read_len(&mut self) -> Result<usize> {
        let len = self.read_u64()?;
        usize::try_from(len).map_err(|_| SerializationError::LengthOverflow(len).into())
    }

    fn read_string(&mut self) -> Result<String> {
        let len = self.read_len()?;
        let mut bytes = Vec::with_capacity(len.min(4096));
        for _ in 0..len {
            bytes.push(self.read_u8()?);
        }
        String::from_utf8(bytes).map_err(|_| SerializationError::InvalidUtf8.into())
    }

    fn read_optional_bool(&mut self) -> Result<Option<bool>> {
        match self.read_u8()? {
            0 => Ok(None),
            1 => Ok(Some(false)),
            2 => Ok(Some(true)),
            tag => Err(SerializationError::InvalidTag {
                what: "optional bool",
                tag,
            }
            .into()),
        }
    }

    fn read_optional_string(&mut self) -> Result<Option<String>> {
        if self.read_bool()? {
            Ok(Some(self.read_string()?))
        } else {
            Ok(None)
        }
    }

    fn read_f64_vec(&mut self) -> Result<Vec<f64>> {
        let len = self.read_len()?;
        let mut out = Vec::with_capacity(len.min(4096));
        for _ in 0..len {
            out.push(self.read_f64()?);
        }
        Ok(out)
    }

    fn read_string_vec(&mut self) -> Result<Vec<String>> {
        let len = self.read_len()?;
        let mut out = Vec::with_capacity(len.min(4096));
        for _ in 0..len {
            out.push(self.read_string()?);
        }
        Ok(out)
    }
}

/// Types that can write themselves to a [`StreamOutput`].
pub trait Writeable {
    fn write_to<W: StreamOutput + ?Sized>(&self, out: &mut W);
}

/// Types that can be read back from a [`StreamInput`].
pub trait Readable: Sized {
    fn read_from<R: StreamInput + ?Sized>(input: &mut R) -> Result<Self>;
}

/// Write `value` into a fresh byte buffer.
pub fn to_bytes<T: Writeable>(value: &T) -> Vec<u8> {
    let mut out = BytesOutput::new();
    value.write_to(&mut out);
    out.into_bytes()
}

/// Read a `T` that must consume all of `bytes`.
pub fn from_bytes<T: Readable>(bytes: &[u8]) -> Result<T> {
    let mut input = BytesInput::new(bytes);
    let value = T::read_from(&mut input)?;
    if input.remaining() > 0 {
        return Err(SerializationError::TrailingBytes(input.remaining()).into());
    }
    Ok(value)
}

// =============================================================================
// In-memory implementation
// =============================================================================

/// Growable little-endian output buffer.
#[derive(Clone, Debug, Default)]
pub struct BytesOutput {
    buf: Vec<u8>,
}

impl BytesOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

impl StreamOutput for BytesOutput {
    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_bits().to_le_bytes());
    }

    fn write_string(&mut self, v: &str) {
        self.write_u64(v.len() as u64);
        self.buf.extend_from_slice(v.as_bytes());
    }
}

/// Cursor over a borrowed byte slice.
#[derive(Clone, Debug)]
pub struct BytesInput<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BytesInput<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(SerializationError::Truncated {
                needed: n,
                remaining: self.remaining(),
            }
            .into());
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut arr = [0u8; N];
        arr.copy_from_slice(self.take(N)?);
        Ok(arr)
    }
}

impl StreamInput for BytesInput<'_> {
    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(u64::from_le_bytes(self.take_array()?)))
    }

    fn read_string(&mut self) -> Result<String> {
        let len = self.read_len()?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| SerializationError::InvalidUtf8.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PcaError;

    #[test]
    fn test_primitives_round_trip() {
        let mut out = BytesOutput::new();
        out.write_u64(u64::MAX);
        out.write_f64(-0.125);
        out.write_bool(true);
        out.write_string("field.a");
        out.write_optional_bool(None);
        out.write_optional_string(Some("meta"));
        out.write_f64_slice(&[1.0, f64::MIN_POSITIVE]);

        let bytes = out.into_bytes();
        let mut input = BytesInput::new(&bytes);
        assert_eq!(input.read_u64().unwrap(), u64::MAX);
        assert_eq!(input.read_f64().unwrap(), -0.125);
        assert!(input.read_bool().unwrap());
        assert_eq!(input.read_string().unwrap(), "field.a");
        assert_eq!(input.read_optional_bool().unwrap(), None);
        assert_eq!(input.read_optional_string().unwrap().as_deref(), Some("meta"));
        assert_eq!(input.read_f64_vec().unwrap(), vec![1.0, f64::MIN_POSITIVE]);
        assert_eq!(input.remaining(), 0);
    }

    #[test]
    fn test_truncated_input() {
        let bytes = [1u8, 2, 3];
        let mut input = BytesInput::new(&bytes);
        let err = input.read_u64().unwrap_err();
        assert!(matches!(
            err,
            PcaError::Serialization(SerializationError::Truncated {
                needed: 8,
                remaining: 3
            })
        ));
    }

    #[test]
    fn test_invalid_bool_tag() {
        let bytes = [7u8];
        let mut input = BytesInput::new(&bytes);
        assert!(matches!(
            input.read_bool(),
            Err(PcaError::Serialization(SerializationError::InvalidTag { tag: 7, .. }))
        ));
    }

    #[test]
    fn test_invalid_utf8() {
        let mut out = BytesOutput::new();
        out.write_u64(2);
        out.write_u8(0xff);
        out.write_u8(0xfe);
        let bytes = out.into_bytes();
        let mut input = BytesInput::new(&bytes);
        assert!(matches!(
            input.read_string(),
            Err(PcaError::Serialization(SerializationError::InvalidUtf8))
        ));
    }

    #[test]
    fn test_string_length_past_end() {
        let mut out = BytesOutput::new();
        out.write_u64(1_000);
        out.write_u8(b'x');
        let bytes = out.into_bytes();
        let mut input = BytesInput::new(&bytes);
        assert!(matches!(
            input.read_string(),
            Err(PcaError::Serialization(SerializationError::Truncated { .. }))
        ));
    }
}
