//! Deserialize responses from the bytecode protocol.
use bytes::Bytes;
use nom::{
    bytes::complete::take,
    combinator::map,
    multi::many_m_n,
    number::complete::{be_i16, be_i32, be_u16},
    IResult,
};
use nombytes::NomBytes;
use num_traits::FromPrimitive;

use crate::error::{Error, KafkaCode, Result};

pub fn parse_kafka_code(s: NomBytes) -> IResult<NomBytes, KafkaCode> {
    map(be_i16, |n| {
        FromPrimitive::from_i16(n).unwrap_or(KafkaCode::Unknown)
    })(s)
}

pub fn parse_string(s: NomBytes) -> IResult<NomBytes, Bytes> {
    let (s, length) = be_u16(s)?;
    let (s, string) = take(length)(s)?;
    Ok((s, string.into_bytes()))
}

pub fn parse_array<O, E, F>(f: F) -> impl FnMut(NomBytes) -> IResult<NomBytes, Vec<O>, E>
where
    F: nom::Parser<NomBytes, O, E> + Copy,
    E: nom::error::ParseError<NomBytes>,
{
    move |input: NomBytes| {
        let (i, length) = be_i32(input)?;
        if length <= 0 {
            return Ok((i, vec![]));
        }
        many_m_n(length as usize, length as usize, f)(i)
    }
}

/// Interpret protocol string bytes as UTF-8.
pub fn to_str(bytes: &Bytes) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|err| {
        tracing::error!("Error converting from UTF8 {:?}", err);
        Error::DecodingUtf8Error
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_string() {
        let buf = NomBytes::from(b"\x00\x04\x72\x75\x73\x74" as &[u8]);

        assert_eq!(parse_string(buf).unwrap().1, Bytes::from_static(b"rust"));
    }

    #[test]
    fn test_parse_array() {
        let buf = NomBytes::from(
            [
                0, 0, 0, 2, // array size
                0, 4, 114, 117, 115, 116, // string
                0, 4, 114, 117, 115, 116, // string
                0, 0, 0, // leftover input
            ]
            .as_slice(),
        );

        assert_eq!(
            parse_array(parse_string)(buf).unwrap().1,
            vec![Bytes::from_static(b"rust"), Bytes::from_static(b"rust")]
        );
    }

    #[test]
    fn test_null_array() {
        let buf = NomBytes::from([255, 255, 255, 255].as_slice());
        let (_, parsed) =
            parse_array(be_i32::<NomBytes, nom::error::Error<NomBytes>>)(buf).unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_unknown_kafka_code() {
        let buf = NomBytes::from([0x7f, 0x00].as_slice());
        assert_eq!(parse_kafka_code(buf).unwrap().1, KafkaCode::Unknown);
    }

    #[test]
    fn test_to_str() {
        assert_eq!(to_str(&Bytes::from_static(b"localhost")), Ok("localhost"));
        assert_eq!(
            to_str(&Bytes::from_static(&[0xff, 0xfe])),
            Err(Error::DecodingUtf8Error)
        );
    }
}
