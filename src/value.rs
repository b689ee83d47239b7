//! Typed values of entries.
use std::fmt;

use crate::tags::{ByteOrder, Type};

/// The value of an entry: a sequence of elements of one [`Type`].
///
/// The bytes are kept in the byte order they were read in, or were constructed with, and
/// converted whenever they are copied out. This mirrors how values are found in a file, where
/// makernotes may use a different byte order than the surrounding image.
#[derive(Clone, Debug, PartialEq)]
pub struct Value {
    bytes: Vec<u8>,
    ty: Type,
    count: usize,
    byte_order: ByteOrder,
    data_area: Vec<u8>,
}

impl Value {
    /// Read a value of the given type from raw bytes.
    ///
    /// Trailing bytes that do not form a whole element are dropped, except for `ASCII`,
    /// `UNDEFINED` and unknown types where every byte is an element.
    pub fn read(ty: Type, data: &[u8], byte_order: ByteOrder) -> Self {
        let count = data.len() / ty.byte_len();
        let len = count * ty.byte_len();

        Value {
            bytes: data[..len].to_vec(),
            ty,
            count,
            byte_order,
            data_area: Vec::new(),
        }
    }

    pub fn from_ascii(text: &str) -> Self {
        let mut bytes = text.as_bytes().to_vec();
        if bytes.last() != Some(&0) {
            bytes.push(0);
        }

        Value::read(Type::ASCII, &bytes, ByteOrder::native())
    }

    pub fn from_bytes(ty: Type, bytes: &[u8]) -> Self {
        Value::read(ty, bytes, ByteOrder::native())
    }

    pub fn from_u16s(values: &[u16]) -> Self {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
        Value::read(Type::SHORT, &bytes, ByteOrder::native())
    }

    pub fn from_i16s(values: &[i16]) -> Self {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
        Value::read(Type::SSHORT, &bytes, ByteOrder::native())
    }

    pub fn from_u32s(values: &[u32]) -> Self {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
        Value::read(Type::LONG, &bytes, ByteOrder::native())
    }

    pub fn from_u32(value: u32) -> Self {
        Value::from_u32s(&[value])
    }

    pub fn data_type(&self) -> Type {
        self.ty
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// The count of elements.
    pub fn count(&self) -> usize {
        self.count
    }

    /// The number of bytes the value occupies when written.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Copy the value out, converted to the given byte order.
    pub fn to_bytes(&self, byte_order: ByteOrder) -> Vec<u8> {
        let mut out = self.bytes.clone();
        self.byte_order.convert(self.ty, &mut out, byte_order);
        out
    }

    /// Bytes outside of the value proper, e.g. the thumbnail an offset entry points to.
    pub fn data_area(&self) -> &[u8] {
        &self.data_area
    }

    pub fn set_data_area(&mut self, data: &[u8]) {
        self.data_area = data.to_vec();
    }

    fn element(&self, n: usize) -> Option<[u8; 8]> {
        let len = self.ty.byte_len();
        let start = n.checked_mul(len)?;
        let raw = self.bytes.get(start..start.checked_add(len)?)?;

        let mut buf = [0u8; 8];
        buf[..len].copy_from_slice(raw);
        self.byte_order
            .convert(self.ty, &mut buf[..len], ByteOrder::native());
        Some(buf)
    }

    /// The `n`th element as an integer, if it is representable as one.
    ///
    /// Rationals are truncated towards zero; a zero denominator yields `None`.
    pub fn to_i64(&self, n: usize) -> Option<i64> {
        let e = self.element(n)?;
        let word = |at: usize| [e[at], e[at + 1], e[at + 2], e[at + 3]];

        Some(match self.ty {
            Type::BYTE | Type::UNDEFINED | Type::ASCII | Type::Unknown(_) => i64::from(e[0]),
            Type::SBYTE => i64::from(e[0] as i8),
            Type::SHORT => i64::from(u16::from_ne_bytes([e[0], e[1]])),
            Type::SSHORT => i64::from(i16::from_ne_bytes([e[0], e[1]])),
            Type::LONG | Type::IFD => i64::from(u32::from_ne_bytes(word(0))),
            Type::SLONG => i64::from(i32::from_ne_bytes(word(0))),
            Type::RATIONAL => {
                let num = i64::from(u32::from_ne_bytes(word(0)));
                let den = i64::from(u32::from_ne_bytes(word(4)));
                num.checked_div(den)?
            }
            Type::SRATIONAL => {
                let num = i64::from(i32::from_ne_bytes(word(0)));
                let den = i64::from(i32::from_ne_bytes(word(4)));
                num.checked_div(den)?
            }
            Type::FLOAT => f32::from_ne_bytes(word(0)) as i64,
            Type::DOUBLE => f64::from_ne_bytes(e) as i64,
        })
    }

    /// The `n`th element as an unsigned 32-bit integer.
    pub fn to_u32(&self, n: usize) -> Option<u32> {
        self.to_i64(n).and_then(|v| u32::try_from(v).ok())
    }

    fn fmt_element(&self, n: usize, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(e) = self.element(n) else {
            return Ok(());
        };
        let word = |at: usize| [e[at], e[at + 1], e[at + 2], e[at + 3]];

        match self.ty {
            Type::RATIONAL => write!(
                f,
                "{}/{}",
                u32::from_ne_bytes(word(0)),
                u32::from_ne_bytes(word(4))
            ),
            Type::SRATIONAL => write!(
                f,
                "{}/{}",
                i32::from_ne_bytes(word(0)),
                i32::from_ne_bytes(word(4))
            ),
            Type::FLOAT => write!(f, "{}", f32::from_ne_bytes(word(0))),
            Type::DOUBLE => write!(f, "{}", f64::from_ne_bytes(e)),
            _ => match self.to_i64(n) {
                Some(v) => write!(f, "{}", v),
                None => Ok(()),
            },
        }
    }
}

impl fmt::Display for Value {
    /// Text up to the first NUL for `ASCII`, space separated elements otherwise.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ty == Type::ASCII {
            let end = self
                .bytes
                .iter()
                .position(|&b| b == 0)
                .unwrap_or(self.bytes.len());
            return f.write_str(&String::from_utf8_lossy(&self.bytes[..end]));
        }

        for n in 0..self.count {
            if n > 0 {
                f.write_str(" ")?;
            }
            self.fmt_element(n, f)?;
        }

        Ok(())
    }
}
