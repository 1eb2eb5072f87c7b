//! The wire codec: how individual values become bytes.
//!
//! Every value on the wire is self-delimiting, so a reader can find where
//! one value ends and the next begins without any outside framing:
//!
//! | shape             | encoding                                   |
//! |-------------------|--------------------------------------------|
//! | `u16`/`u32`/`i32` | fixed width, big endian                    |
//! | `String`          | `u32` byte length, then the UTF-8 bytes    |
//! | `IpAddr`          | `u32` byte length (4 or 16), then octets   |
//! | tuples            | member encodings back to back, in order    |
//!
//! Decoding goes through a [`WireReader`], a cursor over a byte slice that
//! refuses to hand out more bytes than are present. Running short is
//! reported as [`ProtocolError::EndOfStream`] so stream readers can tell
//! "incomplete" apart from "invalid".

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::{BufMut, Bytes, BytesMut};

use crate::ProtocolError;

/// Upper bound for any length prefix. A reader treats anything larger as
/// corruption instead of buffering the stream indefinitely, and a writer
/// refuses to produce it.
pub const MAX_FIELD_LEN: usize = 1024 * 1024;

/// A value with a binary wire encoding.
pub trait Wire: Sized {
    /// Appends the encoding of `self` to `buf`.
    ///
    /// # Errors
    /// Returns [`ProtocolError::FieldTooLong`] if a length-prefixed field
    /// exceeds [`MAX_FIELD_LEN`]. Fields before the failing one may already
    /// be in `buf`.
    fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError>;

    /// Reads one value from `reader`, consuming exactly the bytes
    /// [`encode`](Self::encode) produced.
    ///
    /// # Errors
    /// - [`ProtocolError::EndOfStream`] if the input runs out
    /// - [`ProtocolError::Corrupt`] if the bytes are present but invalid
    fn decode(reader: &mut WireReader<'_>) -> Result<Self, ProtocolError>;
}

/// Encodes a single value into a fresh buffer.
pub fn encode_to_bytes<T: Wire>(value: &T) -> Result<Bytes, ProtocolError> {
    let mut buf = BytesMut::new();
    value.encode(&mut buf)?;
    Ok(buf.freeze())
}

/// Writes the `u32` length prefix of a field that is `len` bytes long.
fn write_len(len: usize, buf: &mut BytesMut) -> Result<(), ProtocolError> {
    if len > MAX_FIELD_LEN {
        return Err(ProtocolError::FieldTooLong {
            len,
            max: MAX_FIELD_LEN,
        });
    }
    buf.put_u32(len as u32);
    Ok(())
}

// ---------------------------------------------------------------------------
// WireReader
// ---------------------------------------------------------------------------

/// A read cursor over a borrowed byte slice.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    /// Creates a reader positioned at the start of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Returns `true` when every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Consumes exactly `n` bytes.
    ///
    /// # Errors
    /// Returns [`ProtocolError::EndOfStream`] without consuming anything if
    /// fewer than `n` bytes remain.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        let remaining = self.remaining();
        if n > remaining {
            return Err(ProtocolError::EndOfStream {
                needed: n,
                remaining,
            });
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    /// Decodes one value of type `T`.
    pub fn read<T: Wire>(&mut self) -> Result<T, ProtocolError> {
        T::decode(self)
    }

    /// Decodes one record of a record sequence.
    ///
    /// Returns `Ok(None)` if the reader sits exactly at the end of the
    /// input. A record that starts but is cut short is
    /// [`ProtocolError::TruncatedFrame`], never `EndOfStream`, since the
    /// input is complete and will not grow.
    pub fn read_record<T: Wire>(&mut self) -> Result<Option<T>, ProtocolError> {
        if self.is_empty() {
            return Ok(None);
        }
        let start = self.pos;
        match T::decode(self) {
            Ok(value) => Ok(Some(value)),
            Err(ProtocolError::EndOfStream { .. }) => {
                Err(ProtocolError::TruncatedFrame {
                    remaining: self.buf.len() - start,
                })
            }
            Err(e) => Err(e),
        }
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Reads a `u32` length prefix and checks it against [`MAX_FIELD_LEN`].
    fn read_len(&mut self) -> Result<usize, ProtocolError> {
        let len = u32::decode(self)? as usize;
        if len > MAX_FIELD_LEN {
            return Err(ProtocolError::Corrupt(format!(
                "length prefix {len} exceeds maximum of {MAX_FIELD_LEN}"
            )));
        }
        Ok(len)
    }
}

// ---------------------------------------------------------------------------
// Integers
// ---------------------------------------------------------------------------

macro_rules! impl_wire_int {
    ($($ty:ty),*) => {$(
        impl Wire for $ty {
            fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
                buf.put_slice(&self.to_be_bytes());
                Ok(())
            }

            fn decode(reader: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
                reader.take_array().map(<$ty>::from_be_bytes)
            }
        }
    )*};
}

impl_wire_int!(u16, u32, i32);

// ---------------------------------------------------------------------------
// Text
// ---------------------------------------------------------------------------

impl Wire for String {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        write_len(self.len(), buf)?;
        buf.put_slice(self.as_bytes());
        Ok(())
    }

    fn decode(reader: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        let len = reader.read_len()?;
        let bytes = reader.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| ProtocolError::Corrupt(format!("invalid UTF-8: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Addresses
// ---------------------------------------------------------------------------

impl Wire for IpAddr {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        match self {
            IpAddr::V4(v4) => {
                write_len(4, buf)?;
                buf.put_slice(&v4.octets());
            }
            IpAddr::V6(v6) => {
                write_len(16, buf)?;
                buf.put_slice(&v6.octets());
            }
        }
        Ok(())
    }

    fn decode(reader: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        match reader.read_len()? {
            4 => Ok(IpAddr::V4(Ipv4Addr::from(reader.take_array::<4>()?))),
            16 => Ok(IpAddr::V6(Ipv6Addr::from(reader.take_array::<16>()?))),
            n => Err(ProtocolError::Corrupt(format!(
                "address length must be 4 or 16, got {n}"
            ))),
        }
    }
}

impl Wire for SocketAddr {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        self.ip().encode(buf)?;
        self.port().encode(buf)
    }

    fn decode(reader: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        let ip = IpAddr::decode(reader)?;
        let port = u16::decode(reader)?;
        Ok(SocketAddr::new(ip, port))
    }
}

// ---------------------------------------------------------------------------
// Tuples
// ---------------------------------------------------------------------------

impl<A: Wire, B: Wire> Wire for (A, B) {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        self.0.encode(buf)?;
        self.1.encode(buf)
    }

    fn decode(reader: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        Ok((A::decode(reader)?, B::decode(reader)?))
    }
}

impl<A: Wire, B: Wire, C: Wire> Wire for (A, B, C) {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        self.0.encode(buf)?;
        self.1.encode(buf)?;
        self.2.encode(buf)
    }

    fn decode(reader: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        Ok((A::decode(reader)?, B::decode(reader)?, C::decode(reader)?))
    }
}
