//! Byte stream transports (TCP) delimit frames with a 3-byte big-endian length prefix.

use anyhow::bail;
use bytes::BufMut;

pub const LENGTH_PREFIX_SIZE: usize = 3;
pub const MAX_FRAME_LENGTH: usize = 0xFF_FFFF;

pub fn put_frame_length(buf: &mut impl BufMut, frame_length: usize) -> anyhow::Result<()> {
    if frame_length > MAX_FRAME_LENGTH {
        bail!("frame length {} exceeds the maximum of {}", frame_length, MAX_FRAME_LENGTH);
    }
    buf.put_uint(frame_length as u64, LENGTH_PREFIX_SIZE);
    Ok(())
}

pub fn get_frame_length(prefix: [u8; LENGTH_PREFIX_SIZE]) -> usize {
    ((prefix[0] as usize) << 16) | ((prefix[1] as usize) << 8) | prefix[2] as usize
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use super::*;

    #[rstest]
    #[case::zero(0, [0, 0, 0])]
    #[case::small(6, [0, 0, 6])]
    #[case::medium(1024, [0, 4, 0])]
    #[case::max(MAX_FRAME_LENGTH, [0xFF, 0xFF, 0xFF])]
    fn test_frame_length(#[case] len: usize, #[case] encoded: [u8; 3]) {
        let mut buf = Vec::new();
        put_frame_length(&mut buf, len).unwrap();
        assert_eq!(buf, encoded.to_vec());
        assert_eq!(get_frame_length(encoded), len);
    }

    #[test]
    fn test_frame_too_long() {
        assert!(put_frame_length(&mut Vec::new(), MAX_FRAME_LENGTH + 1).is_err());
    }
}
