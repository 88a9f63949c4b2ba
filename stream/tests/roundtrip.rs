use stream::{ByteReader, ByteWriter, StreamError};

#[test]
fn writer_roundtrip_mixed() {
    let mut writer = ByteWriter::new();
    writer.write_u8(3);
    writer.write_bool(true);
    writer.write_u32(65_537);
    writer.write_i32(-300);
    writer.write_f32(12.75);
    let bytes = writer.finish();

    let mut reader = ByteReader::new(&bytes);
    assert_eq!(reader.read_u8().unwrap(), 3);
    assert!(reader.read_bool().unwrap());
    assert_eq!(reader.read_u32().unwrap(), 65_537);
    assert_eq!(reader.read_i32().unwrap(), -300);
    assert_eq!(reader.read_f32().unwrap().to_bits(), 12.75f32.to_bits());
    assert!(reader.is_empty());
}

#[test]
fn truncated_field_reports_available_bytes() {
    let mut writer = ByteWriter::new();
    writer.write_i32(7);
    let mut bytes = writer.finish();
    bytes.pop();

    let mut reader = ByteReader::new(&bytes);
    let err = reader.read_i32().unwrap_err();
    assert_eq!(
        err,
        StreamError::UnexpectedEof {
            requested: 4,
            available: 3
        }
    );
}
