//! Primitive field encoding shared by every payload.

use stream::{ByteReader, ByteWriter};

use crate::error::FieldError;

/// A fixed-width value that can appear in an event payload.
///
/// Payload layouts are the concatenation of their fields in declaration
/// order, so every implementor must have a statically known width.
pub trait WireField: Sized + Copy {
    /// Encoded width in bytes.
    const WIDTH: usize;

    /// Appends the encoded value to `writer`.
    fn write(self, writer: &mut ByteWriter);

    /// Reads one value from `reader`.
    fn read(reader: &mut ByteReader<'_>) -> Result<Self, FieldError>;
}

impl WireField for u8 {
    const WIDTH: usize = 1;

    fn write(self, writer: &mut ByteWriter) {
        writer.write_u8(self);
    }

    fn read(reader: &mut ByteReader<'_>) -> Result<Self, FieldError> {
        Ok(reader.read_u8()?)
    }
}

impl WireField for bool {
    const WIDTH: usize = 1;

    fn write(self, writer: &mut ByteWriter) {
        writer.write_bool(self);
    }

    fn read(reader: &mut ByteReader<'_>) -> Result<Self, FieldError> {
        Ok(reader.read_bool()?)
    }
}

impl WireField for u32 {
    const WIDTH: usize = 4;

    fn write(self, writer: &mut ByteWriter) {
        writer.write_u32(self);
    }

    fn read(reader: &mut ByteReader<'_>) -> Result<Self, FieldError> {
        Ok(reader.read_u32()?)
    }
}

impl WireField for i32 {
    const WIDTH: usize = 4;

    fn write(self, writer: &mut ByteWriter) {
        writer.write_i32(self);
    }

    fn read(reader: &mut ByteReader<'_>) -> Result<Self, FieldError> {
        Ok(reader.read_i32()?)
    }
}

impl WireField for f32 {
    const WIDTH: usize = 4;

    fn write(self, writer: &mut ByteWriter) {
        writer.write_f32(self);
    }

    fn read(reader: &mut ByteReader<'_>) -> Result<Self, FieldError> {
        Ok(reader.read_f32()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: WireField + PartialEq + std::fmt::Debug>(value: T) {
        let mut writer = ByteWriter::new();
        value.write(&mut writer);
        let bytes = writer.finish();
        assert_eq!(bytes.len(), T::WIDTH);
        let mut reader = ByteReader::new(&bytes);
        assert_eq!(T::read(&mut reader).unwrap(), value);
    }

    #[test]
    fn primitive_widths_match_encoding() {
        roundtrip(0xABu8);
        roundtrip(true);
        roundtrip(u32::MAX);
        roundtrip(-7i32);
        roundtrip(3.25f32);
    }

    #[test]
    fn bool_field_rejects_garbage() {
        let mut reader = ByteReader::new(&[0xFF]);
        assert!(matches!(
            bool::read(&mut reader),
            Err(FieldError::Stream(_))
        ));
    }
}
