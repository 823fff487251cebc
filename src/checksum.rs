//! The checksum stored in CFDATA headers.  Cabinets may leave it zero, in
//! which case it is not meant to be checked.

use byteorder::{ByteOrder, LittleEndian};

/// Folds `bytes` into `seed` the way CFDATA checksums are computed: every
/// complete four-byte group is XORed in as a little-endian word, then the
/// one to three trailing bytes are XORed in with the first of them in the
/// most significant position.
pub fn compute(seed: u32, bytes: &[u8]) -> u32 {
    let mut groups = bytes.chunks_exact(4);
    let folded = groups
        .by_ref()
        .fold(seed, |value, group| value ^ LittleEndian::read_u32(group));
    let tail = groups
        .remainder()
        .iter()
        .fold(0u32, |tail, &byte| (tail << 8) | byte as u32);
    folded ^ tail
}

/// Computes the checksum stored in a CFDATA header.  The two size fields
/// that follow the checksum on disk form the first four-byte group; the
/// reserve bytes and the payload are folded separately.
pub fn data_block(
    compressed_size: u16,
    uncompressed_size: u16,
    reserve: &[u8],
    payload: &[u8],
) -> u32 {
    let sizes = (compressed_size as u32) | ((uncompressed_size as u32) << 16);
    if reserve.len() % 4 == 0 {
        compute(compute(sizes, reserve), payload)
    } else {
        // MS-CAB sums the CFDATA bytes "from cbData through ab" as one run,
        // so the reserve and the payload share their four-byte groups.
        let mut joined = Vec::with_capacity(reserve.len() + payload.len());
        joined.extend_from_slice(reserve);
        joined.extend_from_slice(payload);
        compute(sizes, &joined)
    }
}
