//! Tests for CRC module

use super::*;

#[test]
fn test_crc16_check_value() {
    assert_eq!(CRC16.checksum(b"123456789"), 0x31C3);
}

#[test]
fn test_crc16_empty_data() {
    assert_eq!(CRC16.checksum(b""), 0);
}

#[test]
fn test_crc16_different_data() {
    assert_ne!(CRC16.checksum(b"data1"), CRC16.checksum(b"data2"));
}

#[test]
fn test_crc32c_check_value() {
    assert_eq!(CRC32C.checksum(b"123456789"), 0xE3069283);
}

#[test]
fn test_crc32c_order_matters() {
    assert_ne!(CRC32C.checksum(&[1, 2, 3]), CRC32C.checksum(&[3, 2, 1]));
}

#[test]
fn test_crc32c_digest_update() {
    let data = b"b5ee9c72 split across updates";

    let mut digest = CRC32C.digest();
    digest.update(&data[..8]);
    digest.update(&data[8..]);

    assert_eq!(digest.finalize(), CRC32C.checksum(data));
}

#[test]
fn test_crc16_digest_update() {
    let mut digest = CRC16.digest();
    digest.update(b"hello ");
    digest.update(b"world");

    assert_eq!(digest.finalize(), CRC16.checksum(b"hello world"));
}
