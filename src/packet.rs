//! IPTC and XMP packets embedded in the tree, and the Photoshop resource blocks that can hold
//! IPTC data.
use log::warn;

use crate::error::TreeResult;

/// Parses and serializes IPTC data. Implemented outside of this crate.
pub trait IptcParser {
    /// Replace the held IPTC data with the data parsed from `data`.
    fn decode(&mut self, data: &[u8]) -> TreeResult<()>;
    /// Serialize the held IPTC data, empty if there is none.
    fn encode(&self) -> Vec<u8>;
}

/// Parses and serializes XMP packets. Implemented outside of this crate.
pub trait XmpParser {
    fn decode(&mut self, packet: &str) -> TreeResult<()>;
    /// Serialize the held XMP data, empty if there is none.
    fn encode(&self) -> TreeResult<String>;
}

const IRB_SIGNATURES: [&[u8; 4]; 4] = [b"8BIM", b"AgHg", b"DCSR", b"PHUT"];
const IRB_IPTC: u16 = 0x0404;

/// Where a resource block was found.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IrbLocation {
    /// Offset of the block.
    pub offset: usize,
    /// Size of the block header: signature, id, name and size field.
    pub header_size: usize,
    pub data_size: usize,
}

impl IrbLocation {
    pub fn payload(&self) -> std::ops::Range<usize> {
        let start = self.offset + self.header_size;
        start..start + self.data_size
    }

    fn end(&self) -> usize {
        self.payload().end + (self.data_size & 1)
    }
}

/// Walk the resource blocks in `data`, stopping at the first malformed one.
fn blocks(data: &[u8]) -> impl Iterator<Item = (u16, IrbLocation)> + '_ {
    let mut position = 0usize;

    std::iter::from_fn(move || {
        let start = position;
        let header = data.get(start..start.checked_add(12)?)?;
        if !IRB_SIGNATURES.iter().any(|sig| header.starts_with(&sig[..])) {
            return None;
        }
        let id = u16::from_be_bytes([header[4], header[5]]);

        // Pascal string name, padded to an even length including its length byte.
        let name_len = usize::from(header[6]) + 1;
        let name_len = name_len + (name_len & 1);
        let size_at = start + 6 + name_len;
        let size_field = data.get(size_at..size_at.checked_add(4)?)?;
        let data_size = u32::from_be_bytes([size_field[0], size_field[1], size_field[2], size_field[3]]) as usize;

        let header_size = size_at + 4 - start;
        if data_size > data.len() - (start + header_size) {
            warn!("Photoshop resource block {:#06x} exceeds its buffer", id);
            return None;
        }

        let location = IrbLocation {
            offset: start,
            header_size,
            data_size,
        };
        position = location.end();
        Some((id, location))
    })
}

/// Find the first IPTC resource block.
pub fn locate_iptc_irb(data: &[u8]) -> Option<IrbLocation> {
    blocks(data)
        .find(|(id, _)| *id == IRB_IPTC)
        .map(|(_, location)| location)
}

/// Replace the IPTC resource blocks in `data` with one holding `iptc`.
///
/// The new block takes the place of the first old one, or goes to the end. An empty `iptc`
/// removes all IPTC blocks. Bytes after the last well-formed block are kept.
pub fn set_iptc_irb(data: &[u8], iptc: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + iptc.len() + 12);
    let mut placed = iptc.is_empty();
    let mut end = 0;

    for (id, location) in blocks(data) {
        end = location.end().min(data.len());
        if id == IRB_IPTC {
            if !placed {
                write_iptc_block(&mut out, iptc);
                placed = true;
            }
        } else {
            out.extend_from_slice(&data[location.offset..end]);
        }
    }

    if !placed {
        write_iptc_block(&mut out, iptc);
    }
    out.extend_from_slice(&data[end..]);
    out
}

fn write_iptc_block(out: &mut Vec<u8>, iptc: &[u8]) {
    out.extend_from_slice(b"8BIM");
    out.extend_from_slice(&IRB_IPTC.to_be_bytes());
    out.extend_from_slice(&[0, 0]);
    out.extend_from_slice(&(iptc.len() as u32).to_be_bytes());
    out.extend_from_slice(iptc);
    if iptc.len() & 1 == 1 {
        out.push(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(id: u16, payload: &[u8]) -> Vec<u8> {
        let mut out = b"8BIM".to_vec();
        out.extend_from_slice(&id.to_be_bytes());
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(payload);
        if payload.len() % 2 == 1 {
            out.push(0);
        }
        out
    }

    #[test]
    fn locates_iptc_after_other_blocks() {
        let mut data = block(0x03ed, &[1, 2, 3]);
        data.extend(block(IRB_IPTC, b"\x1c\x02\x00"));

        let location = locate_iptc_irb(&data).expect("IPTC block");
        assert_eq!(location.offset, 16);
        assert_eq!(location.header_size, 12);
        assert_eq!(&data[location.payload()], b"\x1c\x02\x00");
    }

    #[test]
    fn oversized_block_is_not_found() {
        let mut data = block(IRB_IPTC, &[1, 2]);
        data[11] = 0x40;
        assert_eq!(locate_iptc_irb(&data), None);
    }

    #[test]
    fn replaces_iptc_in_place() {
        let mut data = block(0x03ed, &[1, 2, 3]);
        data.extend(block(IRB_IPTC, &[9; 5]));
        data.extend(block(0x040c, &[7]));

        let out = set_iptc_irb(&data, &[4, 4]);
        let mut expected = block(0x03ed, &[1, 2, 3]);
        expected.extend(block(IRB_IPTC, &[4, 4]));
        expected.extend(block(0x040c, &[7]));
        assert_eq!(out, expected);

        let removed = set_iptc_irb(&data, &[]);
        let mut expected = block(0x03ed, &[1, 2, 3]);
        expected.extend(block(0x040c, &[7]));
        assert_eq!(removed, expected);
    }
}
