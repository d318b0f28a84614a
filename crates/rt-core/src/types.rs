//! Basic scalar type catalog.
//!
//! Every leaf signal ends up as one of these types. Sizes and alignment are
//! the natural ones; multi-byte values are encoded little-endian.

use core::fmt;
use core::str::FromStr;

use crate::error::{RtError, RtResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BasicType {
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Char8,
}

impl BasicType {
    pub const ALL: [BasicType; 11] = [
        BasicType::UInt8,
        BasicType::UInt16,
        BasicType::UInt32,
        BasicType::UInt64,
        BasicType::Int8,
        BasicType::Int16,
        BasicType::Int32,
        BasicType::Int64,
        BasicType::Float32,
        BasicType::Float64,
        BasicType::Char8,
    ];

    /// Look a type up by its configuration name. `string` is accepted as char8.
    pub fn parse(name: &str) -> Option<Self> {
        let ty = match name {
            "uint8" => BasicType::UInt8,
            "uint16" => BasicType::UInt16,
            "uint32" => BasicType::UInt32,
            "uint64" => BasicType::UInt64,
            "int8" => BasicType::Int8,
            "int16" => BasicType::Int16,
            "int32" => BasicType::Int32,
            "int64" => BasicType::Int64,
            "float32" => BasicType::Float32,
            "float64" => BasicType::Float64,
            "char8" | "string" => BasicType::Char8,
            _ => return None,
        };
        Some(ty)
    }

    pub fn name(self) -> &'static str {
        match self {
            BasicType::UInt8 => "uint8",
            BasicType::UInt16 => "uint16",
            BasicType::UInt32 => "uint32",
            BasicType::UInt64 => "uint64",
            BasicType::Int8 => "int8",
            BasicType::Int16 => "int16",
            BasicType::Int32 => "int32",
            BasicType::Int64 => "int64",
            BasicType::Float32 => "float32",
            BasicType::Float64 => "float64",
            BasicType::Char8 => "char8",
        }
    }

    pub fn byte_size(self) -> u32 {
        match self {
            BasicType::UInt8 | BasicType::Int8 | BasicType::Char8 => 1,
            BasicType::UInt16 | BasicType::Int16 => 2,
            BasicType::UInt32 | BasicType::Int32 | BasicType::Float32 => 4,
            BasicType::UInt64 | BasicType::Int64 | BasicType::Float64 => 8,
        }
    }

    /// Natural alignment (equal to the size for every basic type).
    pub fn alignment(self) -> u32 {
        self.byte_size()
    }

    pub fn is_float(self) -> bool {
        matches!(self, BasicType::Float32 | BasicType::Float64)
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            BasicType::Int8 | BasicType::Int16 | BasicType::Int32 | BasicType::Int64
        ) || self.is_float()
    }

    fn int_bounds(self) -> (i128, i128) {
        match self {
            BasicType::UInt8 | BasicType::Char8 => (0, u8::MAX as i128),
            BasicType::UInt16 => (0, u16::MAX as i128),
            BasicType::UInt32 => (0, u32::MAX as i128),
            BasicType::UInt64 => (0, u64::MAX as i128),
            BasicType::Int8 => (i8::MIN as i128, i8::MAX as i128),
            BasicType::Int16 => (i16::MIN as i128, i16::MAX as i128),
            BasicType::Int32 => (i32::MIN as i128, i32::MAX as i128),
            BasicType::Int64 => (i64::MIN as i128, i64::MAX as i128),
            BasicType::Float32 | BasicType::Float64 => (i128::MIN, i128::MAX),
        }
    }

    /// Encode an integer into `out`, which must be exactly `byte_size()` long.
    pub fn encode_int(self, value: i128, out: &mut [u8]) -> RtResult<()> {
        self.check_len(out)?;
        if self.is_float() {
            return self.encode_float(value as f64, out);
        }
        let (min, max) = self.int_bounds();
        if value < min || value > max {
            return Err(RtError::OutOfRange {
                type_name: self.name(),
                value: value as f64,
            });
        }
        let bytes = value.to_le_bytes();
        out.copy_from_slice(&bytes[..out.len()]);
        Ok(())
    }

    /// Encode a float. Integer types accept only integral values.
    pub fn encode_float(self, value: f64, out: &mut [u8]) -> RtResult<()> {
        self.check_len(out)?;
        match self {
            BasicType::Float32 => {
                out.copy_from_slice(&(value as f32).to_le_bytes());
                Ok(())
            }
            BasicType::Float64 => {
                out.copy_from_slice(&value.to_le_bytes());
                Ok(())
            }
            _ => {
                if !value.is_finite() || value.fract() != 0.0 {
                    return Err(RtError::OutOfRange {
                        type_name: self.name(),
                        value,
                    });
                }
                self.encode_int(value as i128, out)
            }
        }
    }

    /// Decode one element as `f64`, whatever its storage type.
    pub fn decode_f64(self, bytes: &[u8]) -> RtResult<f64> {
        self.check_len(bytes)?;
        let v = match self {
            BasicType::Float32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64,
            BasicType::Float64 => {
                let mut b = [0_u8; 8];
                b.copy_from_slice(bytes);
                f64::from_le_bytes(b)
            }
            _ => self.decode_int(bytes)? as f64,
        };
        Ok(v)
    }

    /// Decode one integer element, sign-extending signed types.
    pub fn decode_int(self, bytes: &[u8]) -> RtResult<i128> {
        self.check_len(bytes)?;
        if self.is_float() {
            return Err(RtError::InvalidArg {
                what: "integer decode of a float type",
            });
        }
        let mut buf = [0_u8; 16];
        buf[..bytes.len()].copy_from_slice(bytes);
        let negative = self.is_signed() && bytes[bytes.len() - 1] & 0x80 != 0;
        if negative {
            for b in buf.iter_mut().skip(bytes.len()) {
                *b = 0xff;
            }
        }
        Ok(i128::from_le_bytes(buf))
    }

    fn check_len(self, bytes: &[u8]) -> RtResult<()> {
        if bytes.len() != self.byte_size() as usize {
            return Err(RtError::IndexOob {
                what: "element buffer length",
                index: bytes.len(),
                len: self.byte_size() as usize,
            });
        }
        Ok(())
    }
}

impl fmt::Display for BasicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BasicType {
    type Err = RtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BasicType::parse(s).ok_or(RtError::InvalidArg {
            what: "unknown basic type name",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for ty in BasicType::ALL {
            assert_eq!(BasicType::parse(ty.name()), Some(ty));
        }
        assert_eq!(BasicType::parse("string"), Some(BasicType::Char8));
        assert_eq!(BasicType::parse("A"), None);
    }

    #[test]
    fn sizes() {
        assert_eq!(BasicType::UInt8.byte_size(), 1);
        assert_eq!(BasicType::Int16.byte_size(), 2);
        assert_eq!(BasicType::Float32.byte_size(), 4);
        assert_eq!(BasicType::UInt64.alignment(), 8);
    }

    #[test]
    fn encode_rejects_out_of_range() {
        let mut out = [0_u8; 1];
        assert!(BasicType::UInt8.encode_int(256, &mut out).is_err());
        assert!(BasicType::Int8.encode_int(-129, &mut out).is_err());
        BasicType::Int8.encode_int(-1, &mut out).unwrap();
        assert_eq!(out, [0xff]);
    }

    #[test]
    fn encode_float_into_integer_needs_integral_value() {
        let mut out = [0_u8; 4];
        BasicType::UInt32.encode_float(7.0, &mut out).unwrap();
        assert_eq!(BasicType::UInt32.decode_int(&out).unwrap(), 7);
        assert!(BasicType::UInt32.encode_float(7.5, &mut out).is_err());
    }

    #[test]
    fn signed_decode_sign_extends() {
        let mut out = [0_u8; 2];
        BasicType::Int16.encode_int(-300, &mut out).unwrap();
        assert_eq!(BasicType::Int16.decode_int(&out).unwrap(), -300);
        assert_eq!(BasicType::Int16.decode_f64(&out).unwrap(), -300.0);
    }

    #[test]
    fn wrong_buffer_length_is_rejected() {
        let mut out = [0_u8; 3];
        assert!(BasicType::Float32.encode_float(1.0, &mut out).is_err());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn int32_round_trips(v in any::<i32>()) {
            let mut out = [0_u8; 4];
            BasicType::Int32.encode_int(v as i128, &mut out).unwrap();
            prop_assert_eq!(BasicType::Int32.decode_int(&out).unwrap(), v as i128);
        }

        #[test]
        fn float64_round_trips(v in -1.0e12_f64..1.0e12_f64) {
            let mut out = [0_u8; 8];
            BasicType::Float64.encode_float(v, &mut out).unwrap();
            prop_assert_eq!(BasicType::Float64.decode_f64(&out).unwrap(), v);
        }
    }
}
