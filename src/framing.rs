//! The first payload chunk carries a fixed 32-byte null-padded filename
//! ahead of the file bytes; every later chunk is plain file data. See
//! spec.md §4.5.

use crate::error::Error;

pub const FILENAME_FRAME_LEN: usize = 32;

/// Builds the first chunk: the 32-byte filename frame followed by as much
/// file data as fits in `budget` bytes.
pub fn frame_first_chunk(filename: &str, file_data: &[u8]) -> Result<Vec<u8>, Error> {
    let name_bytes = filename.as_bytes();
    if name_bytes.len() > FILENAME_FRAME_LEN {
        return Err(Error::FilenameTooLong(filename.to_string(), FILENAME_FRAME_LEN));
    }

    let mut chunk = Vec::with_capacity(FILENAME_FRAME_LEN + file_data.len());
    chunk.extend_from_slice(name_bytes);
    chunk.resize(FILENAME_FRAME_LEN, 0);
    chunk.extend_from_slice(file_data);
    Ok(chunk)
}

/// Splits a reassembled byte stream back into `(filename, file_bytes)`.
pub fn unframe(mut reassembled: Vec<u8>) -> (String, Vec<u8>) {
    let tail = reassembled.split_off(FILENAME_FRAME_LEN.min(reassembled.len()));
    let filename = String::from_utf8_lossy(&reassembled)
        .trim_end_matches('\0')
        .to_string();
    (filename, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_then_unframe_round_trips() {
        let framed = frame_first_chunk("report.txt", b"hello").unwrap();
        assert_eq!(framed.len(), FILENAME_FRAME_LEN + 5);
        let (name, data) = unframe(framed);
        assert_eq!(name, "report.txt");
        assert_eq!(data, b"hello");
    }

    #[test]
    fn empty_file_yields_empty_data_after_unframe() {
        let framed = frame_first_chunk("empty.bin", b"").unwrap();
        let (name, data) = unframe(framed);
        assert_eq!(name, "empty.bin");
        assert!(data.is_empty());
    }

    #[test]
    fn filename_over_32_bytes_is_rejected() {
        let long_name = "a".repeat(33);
        let err = frame_first_chunk(&long_name, b"x").unwrap_err();
        assert!(matches!(err, Error::FilenameTooLong(_, 32)));
    }

    #[test]
    fn filename_exactly_32_bytes_is_accepted_with_no_padding() {
        let name = "a".repeat(32);
        let framed = frame_first_chunk(&name, b"tail").unwrap();
        let (decoded_name, data) = unframe(framed);
        assert_eq!(decoded_name, name);
        assert_eq!(data, b"tail");
    }
}
