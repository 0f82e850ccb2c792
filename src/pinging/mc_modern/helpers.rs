use std::{
    io::{self, Read},
    ops::Deref,
};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

/// A value with a fixed encoding in the modern (1.7+) protocol.
pub trait McModernValue: Sized {
    fn read_from(data: &mut impl ReadBytesExt) -> Result<Self, ProtocolError>;

    fn write_to(&self, target: &mut impl WriteBytesExt) -> Result<(), ProtocolError>;
}

/// Minecraft's variable-length integer: 7 data bits per byte, high bit set on
/// every byte but the last, at most 5 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarInt(pub u32);

impl VarInt {
    const SEGMENT_BITS: u32 = 0x7F;
    const CONTINUE_BIT: u8 = 0x80;
    pub const MAX_LEN: usize = 5;

    pub fn encode(value: u32) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::MAX_LEN);
        Self::encode_into(value, &mut out);
        out
    }

    pub fn encode_into(mut value: u32, out: &mut Vec<u8>) {
        loop {
            if (value & !Self::SEGMENT_BITS) == 0 {
                out.push(value as u8);
                return;
            }
            out.push((value & Self::SEGMENT_BITS) as u8 | Self::CONTINUE_BIT);
            value >>= 7;
        }
    }

    /// Decodes the VarInt starting at `offset`, returning the value and the
    /// number of bytes it took up.
    ///
    /// Running out of input before the terminating byte is
    /// [`ProtocolError::Incomplete`], so callers reading off a socket know to
    /// wait for more. Five bytes without a terminator is
    /// [`ProtocolError::VarIntTooLarge`] no matter how much input follows.
    pub fn decode(bytes: &[u8], offset: usize) -> Result<(u32, usize), ProtocolError> {
        let input = bytes.get(offset..).unwrap_or_default();
        let mut value = 0u32;
        for (position, byte) in input.iter().take(Self::MAX_LEN).enumerate() {
            value |= (u32::from(*byte) & Self::SEGMENT_BITS) << (7 * position);
            if byte & Self::CONTINUE_BIT == 0 {
                return Ok((value, position + 1));
            }
        }
        if input.len() >= Self::MAX_LEN {
            Err(ProtocolError::VarIntTooLarge)
        } else {
            Err(ProtocolError::Incomplete)
        }
    }
}

impl Deref for VarInt {
    type Target = u32;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl McModernValue for VarInt {
    fn read_from(data: &mut impl ReadBytesExt) -> Result<Self, ProtocolError> {
        let mut value = 0;
        for position in 0..Self::MAX_LEN {
            let current_byte = data.read_u8()?;
            value |= (u32::from(current_byte) & Self::SEGMENT_BITS) << (7 * position);
            if current_byte & Self::CONTINUE_BIT == 0 {
                return Ok(Self(value));
            }
        }
        Err(ProtocolError::VarIntTooLarge)
    }

    fn write_to(&self, target: &mut impl WriteBytesExt) -> Result<(), ProtocolError> {
        target.write_all(&Self::encode(self.0))?;
        Ok(())
    }
}

impl McModernValue for String {
    fn read_from(data: &mut impl ReadBytesExt) -> Result<Self, ProtocolError> {
        let len = VarInt::read_from(data)?;
        // the declared length is untrusted, so only read what is really there
        let mut string_data = vec![];
        data.by_ref()
            .take(u64::from(len.0))
            .read_to_end(&mut string_data)?;
        if string_data.len() != len.0 as usize {
            return Err(ProtocolError::Incomplete);
        }

        Ok(String::from_utf8_lossy(&string_data).into_owned())
    }

    fn write_to(&self, target: &mut impl WriteBytesExt) -> Result<(), ProtocolError> {
        let string_data = self.as_bytes();

        VarInt(string_data.len() as u32).write_to(target)?;
        target.write_all(string_data)?;
        Ok(())
    }
}

impl McModernValue for u16 {
    fn read_from(data: &mut impl ReadBytesExt) -> Result<Self, ProtocolError> {
        Ok(data.read_u16::<BigEndian>()?)
    }

    fn write_to(&self, target: &mut impl WriteBytesExt) -> Result<(), ProtocolError> {
        target.write_u16::<BigEndian>(*self)?;
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("VarInt too large!")]
    VarIntTooLarge,
    #[error("not enough data")]
    Incomplete,
    #[error("IO error")]
    IoError(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn encodes_300_as_two_bytes() {
        assert_eq!(VarInt::encode(300), vec![0xAC, 0x02]);
        assert_eq!(VarInt::decode(&[0xAC, 0x02], 0).unwrap(), (300, 2));
    }

    #[test]
    fn boundary_values_survive_a_round_trip() {
        for (value, len) in [
            (0u32, 1usize),
            (127, 1),
            (128, 2),
            (16_383, 2),
            (16_384, 3),
            (2_097_151, 3),
            (2_097_152, 4),
            (i32::MAX as u32, 5),
            (u32::MAX, 5),
        ] {
            let encoded = VarInt::encode(value);
            assert_eq!(encoded.len(), len, "length of {value}");
            assert_eq!(VarInt::decode(&encoded, 0).unwrap(), (value, len));
        }
    }

    #[test]
    fn decodes_at_an_offset() {
        let bytes = [0xFF, 0xFF, 0xAC, 0x02, 0x07];
        assert_eq!(VarInt::decode(&bytes, 2).unwrap(), (300, 2));
        assert_eq!(VarInt::decode(&bytes, 4).unwrap(), (7, 1));
    }

    #[test]
    fn five_continuation_bytes_are_rejected() {
        let bytes = [0x80, 0x80, 0x80, 0x80, 0x80, 0x01];
        assert!(matches!(
            VarInt::decode(&bytes, 0),
            Err(ProtocolError::VarIntTooLarge)
        ));
        assert!(matches!(
            VarInt::read_from(&mut Cursor::new(&bytes[..])),
            Err(ProtocolError::VarIntTooLarge)
        ));
    }

    #[test]
    fn short_input_is_incomplete() {
        assert!(matches!(
            VarInt::decode(&[0x80, 0x80], 0),
            Err(ProtocolError::Incomplete)
        ));
        assert!(matches!(VarInt::decode(&[], 0), Err(ProtocolError::Incomplete)));
        assert!(matches!(VarInt::decode(&[0x01], 3), Err(ProtocolError::Incomplete)));
    }

    #[test]
    fn strings_are_length_prefixed() {
        let mut buf = vec![];
        "localhost".to_owned().write_to(&mut buf).unwrap();
        assert_eq!(buf[0], 9);
        assert_eq!(&buf[1..], b"localhost");

        let read = String::read_from(&mut Cursor::new(buf)).unwrap();
        assert_eq!(read, "localhost");
    }

    #[test]
    fn string_longer_than_its_input_is_incomplete() {
        let bytes = [0xFF, 0xFF, 0xFF, 0xFF, 0x0F, b'{', b'}', b' ', b' '];
        assert!(matches!(
            String::read_from(&mut Cursor::new(&bytes[..])),
            Err(ProtocolError::Incomplete)
        ));
    }
}
