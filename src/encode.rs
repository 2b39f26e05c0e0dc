//! Serialize metadata records and batch framing into bytes.
use bytes::{BufMut, Bytes};

use crate::error::Result;

pub trait ToByte {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()>;
}

impl<'a, T: ToByte + 'a + ?Sized> ToByte for &'a T {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        (*self).encode(buffer)
    }
}

impl ToByte for bool {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        buffer.put_i8(*self as i8);
        Ok(())
    }
}

impl ToByte for i8 {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        buffer.put_i8(*self);
        Ok(())
    }
}

impl ToByte for i16 {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        buffer.put_i16(*self);
        Ok(())
    }
}

impl ToByte for i32 {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        buffer.put_i32(*self);
        Ok(())
    }
}

impl ToByte for u32 {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        buffer.put_u32(*self);
        Ok(())
    }
}

impl ToByte for i64 {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        buffer.put_i64(*self);
        Ok(())
    }
}

impl ToByte for u64 {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        buffer.put_u64(*self);
        Ok(())
    }
}

impl ToByte for str {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        buffer.put_i16(self.len() as i16);
        buffer.put(self.as_bytes());
        Ok(())
    }
}

impl ToByte for String {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.as_str().encode(buffer)
    }
}

impl ToByte for Bytes {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        buffer.put_i32(self.len() as i32);
        buffer.put(self.clone());
        Ok(())
    }
}

/// Encode an optional string as a nullable string: a length of -1 marks the
/// absent case.
pub fn encode_nullable_string<T: BufMut>(buffer: &mut T, value: Option<&str>) -> Result<()> {
    match value {
        Some(s) => s.encode(buffer),
        None => {
            buffer.put_i16(-1);
            Ok(())
        }
    }
}

/// Renders the length of `xs` to `buffer` as the start of an encoded array
/// and then for each element of `xs` invokes `f` assuming that function will
/// render the element to the buffer.
pub fn encode_as_array<T, F, W>(buffer: &mut W, xs: &[T], mut f: F) -> Result<()>
where
    F: FnMut(&mut W, &T) -> Result<()>,
    W: BufMut,
{
    buffer.put_i32(xs.len() as i32);
    for x in xs {
        f(buffer, x)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_primitives() {
        let mut buf = Vec::new();
        42i8.encode(&mut buf).unwrap();
        0x0102i16.encode(&mut buf).unwrap();
        0x01020304i32.encode(&mut buf).unwrap();
        assert_eq!(buf, vec![42, 0x01, 0x02, 0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_encode_str_prefixes_length() {
        let mut buf = Vec::new();
        "abc".encode(&mut buf).unwrap();
        assert_eq!(buf, vec![0x00, 0x03, b'a', b'b', b'c']);
    }

    #[test]
    fn test_encode_bytes_prefixes_length() {
        let mut buf = Vec::new();
        Bytes::from_static(&[9, 8]).encode(&mut buf).unwrap();
        assert_eq!(buf, vec![0x00, 0x00, 0x00, 0x02, 9, 8]);
    }

    #[test]
    fn test_encode_nullable_string() {
        let mut buf = Vec::new();
        encode_nullable_string(&mut buf, None).unwrap();
        assert_eq!(buf, vec![0xFF, 0xFF]);

        let mut buf = Vec::new();
        encode_nullable_string(&mut buf, Some("x")).unwrap();
        assert_eq!(buf, vec![0x00, 0x01, b'x']);
    }

    #[test]
    fn test_encode_as_array() {
        let mut buf = Vec::new();
        encode_as_array(&mut buf, &[1i32, 2i32], |b, x| x.encode(b)).unwrap();
        assert_eq!(
            buf,
            vec![0x00, 0x00, 0x00, 0x02, 0, 0, 0, 1, 0, 0, 0, 2]
        );
    }
}
