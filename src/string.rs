use std::io::{self, Read};

use byteorder::ReadBytesExt;

use crate::consts;

/// Reads a NUL-terminated string of at most `MAX_STRING_SIZE` bytes.  Names
/// flagged as UTF are decoded as UTF-8; everything else is treated as
/// Latin-1 so that no byte is ever lost.
pub(crate) fn read_null_terminated_string<R: Read>(
    reader: &mut R,
    is_utf8: bool,
) -> io::Result<String> {
    let mut bytes = Vec::<u8>::with_capacity(consts::MAX_STRING_SIZE);
    loop {
        let byte = reader.read_u8()?;
        if byte == 0 {
            break;
        } else if bytes.len() == consts::MAX_STRING_SIZE {
            invalid_data!(
                "String longer than maximum of {} bytes",
                consts::MAX_STRING_SIZE
            );
        }
        bytes.push(byte);
    }
    if is_utf8 {
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    } else {
        Ok(bytes.iter().map(|&byte| byte as char).collect())
    }
}
