//! Deserialize metadata record payloads from bytes.
use bytes::Bytes;
use nom::{IResult, bytes::complete::take, number::complete::be_i16};
use nombytes::NomBytes;

/// Convert bytes to a validated UTF-8 string.
/// Returns an error if the bytes are not valid UTF-8.
pub fn bytes_to_string(bytes: &Bytes) -> Result<String, nom::Err<nom::error::Error<NomBytes>>> {
    std::str::from_utf8(bytes)
        .map(|s| s.to_string())
        .map_err(|_| {
            nom::Err::Failure(nom::error::Error::new(
                NomBytes::from(bytes.as_ref()),
                nom::error::ErrorKind::Verify,
            ))
        })
}

pub fn parse_string(s: NomBytes) -> IResult<NomBytes, Bytes> {
    let (s, length) = be_i16(s)?;
    if length < 0 {
        return Err(nom::Err::Failure(nom::error::Error::new(
            s,
            nom::error::ErrorKind::Verify,
        )));
    }
    let (s, string) = take(length as u16)(s)?;
    Ok((s, string.into_bytes()))
}

pub fn parse_nullable_string(s: NomBytes) -> IResult<NomBytes, Option<Bytes>> {
    let (s, length) = be_i16(s)?;

    // Null string
    if length == -1 {
        return Ok((s, None));
    }

    if length < 0 {
        return Err(nom::Err::Failure(nom::error::Error::new(
            s,
            nom::error::ErrorKind::TooLarge,
        )));
    }

    let (s, string) = take(length as u16)(s)?;
    Ok((s, Some(string.into_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(bytes: &[u8]) -> NomBytes {
        NomBytes::new(Bytes::copy_from_slice(bytes))
    }

    #[test]
    fn test_parse_string() {
        let (rest, s) = parse_string(input(&[0x00, 0x02, b'h', b'i', 0xAA])).unwrap();
        assert_eq!(s.as_ref(), b"hi");
        assert_eq!(rest.into_bytes().as_ref(), &[0xAA]);
    }

    #[test]
    fn test_parse_string_rejects_negative_length() {
        assert!(parse_string(input(&[0xFF, 0xFE])).is_err());
    }

    #[test]
    fn test_parse_nullable_string_null() {
        let (_, s) = parse_nullable_string(input(&[0xFF, 0xFF])).unwrap();
        assert!(s.is_none());
    }

    #[test]
    fn test_parse_nullable_string_present() {
        let (_, s) = parse_nullable_string(input(&[0x00, 0x01, b'x'])).unwrap();
        assert_eq!(s.unwrap().as_ref(), b"x");
    }

    #[test]
    fn test_bytes_to_string_rejects_invalid_utf8() {
        assert!(bytes_to_string(&Bytes::from_static(&[0xC0, 0x80])).is_err());
    }
}
