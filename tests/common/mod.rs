//! Builds small TIFF structures in memory.
#![allow(dead_code)]

use exif_tree::ByteOrder;

/// One directory entry, with its value already in the byte order of the structure.
#[derive(Clone, Debug)]
pub struct Entry {
    pub tag: u16,
    pub ty: u16,
    pub count: u32,
    /// `None` for an entry whose offset field is set later with [`TiffBuilder::link`].
    pub data: Option<Vec<u8>>,
    /// The data is the offset field itself, whatever the size of the value.
    pub inline: bool,
}

impl Entry {
    pub fn ascii(tag: u16, text: &str) -> Entry {
        let mut data = text.as_bytes().to_vec();
        data.push(0);
        Entry {
            tag,
            ty: 2,
            count: data.len() as u32,
            data: Some(data),
            inline: false,
        }
    }

    pub fn short(bo: ByteOrder, tag: u16, values: &[u16]) -> Entry {
        Entry {
            tag,
            ty: 3,
            count: values.len() as u32,
            data: Some(values.iter().flat_map(|&v| bo.u16_bytes(v)).collect()),
            inline: false,
        }
    }

    pub fn long(bo: ByteOrder, tag: u16, values: &[u32]) -> Entry {
        Entry {
            tag,
            ty: 4,
            count: values.len() as u32,
            data: Some(values.iter().flat_map(|&v| bo.u32_bytes(v)).collect()),
            inline: false,
        }
    }

    pub fn rational(bo: ByteOrder, tag: u16, num: u32, denom: u32) -> Entry {
        let mut data = bo.u32_bytes(num).to_vec();
        data.extend_from_slice(&bo.u32_bytes(denom));
        Entry {
            tag,
            ty: 5,
            count: 1,
            data: Some(data),
            inline: false,
        }
    }

    pub fn undefined(tag: u16, bytes: &[u8]) -> Entry {
        Entry {
            tag,
            ty: 7,
            count: bytes.len() as u32,
            data: Some(bytes.to_vec()),
            inline: false,
        }
    }

    /// An entry pointing at data placed elsewhere, such as a sub-IFD or image strip.
    pub fn pointer(tag: u16, ty: u16, count: u32) -> Entry {
        Entry {
            tag,
            ty,
            count,
            data: None,
            inline: false,
        }
    }

    /// An entry with a raw offset field, which need not point into the buffer.
    pub fn raw(bo: ByteOrder, tag: u16, ty: u16, count: u32, offset: u32) -> Entry {
        Entry {
            tag,
            ty,
            count,
            data: Some(bo.u32_bytes(offset).to_vec()),
            inline: true,
        }
    }
}

/// Where a directory ended up.
#[derive(Clone, Debug)]
pub struct IfdPos {
    pub start: usize,
    /// Offset of each 12-byte entry.
    pub slots: Vec<usize>,
    /// Offset of the next-IFD pointer.
    pub next: usize,
}

impl IfdPos {
    pub fn slot(&self, n: usize) -> usize {
        self.slots[n]
    }
}

/// Appends directories and data to a buffer starting with a TIFF header.
pub struct TiffBuilder {
    pub bo: ByteOrder,
    pub data: Vec<u8>,
}

impl TiffBuilder {
    /// A header whose first directory is at offset 8, where the first [`ifd`] goes.
    ///
    /// [`ifd`]: TiffBuilder::ifd
    pub fn new(bo: ByteOrder) -> TiffBuilder {
        let mut data = bo.marker().as_bytes().to_vec();
        data.extend_from_slice(&bo.u16_bytes(42));
        data.extend_from_slice(&bo.u32_bytes(8));
        TiffBuilder { bo, data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Write a directory with its out-of-line values after it.
    pub fn ifd(&mut self, entries: &[Entry]) -> IfdPos {
        let bo = self.bo;
        let start = self.data.len();
        let mut values = start + 2 + 12 * entries.len() + 4;

        self.data
            .extend_from_slice(&bo.u16_bytes(entries.len() as u16));
        let mut slots = Vec::new();
        let mut out_of_line = Vec::new();
        for entry in entries {
            slots.push(self.data.len());
            self.data.extend_from_slice(&bo.u16_bytes(entry.tag));
            self.data.extend_from_slice(&bo.u16_bytes(entry.ty));
            self.data.extend_from_slice(&bo.u32_bytes(entry.count));

            let mut field = [0u8; 4];
            match &entry.data {
                Some(data) if entry.inline || data.len() <= 4 => field[..data.len()].copy_from_slice(data),
                Some(data) => {
                    field = bo.u32_bytes(values as u32);
                    out_of_line.extend_from_slice(data);
                    if data.len() % 2 == 1 {
                        out_of_line.push(0);
                    }
                    values = start + 2 + 12 * entries.len() + 4 + out_of_line.len();
                }
                None => {}
            }
            self.data.extend_from_slice(&field);
        }

        let next = self.data.len();
        self.data.extend_from_slice(&[0; 4]);
        self.data.extend_from_slice(&out_of_line);

        IfdPos { start, slots, next }
    }

    /// Append raw bytes, returning their offset.
    pub fn bytes(&mut self, bytes: &[u8]) -> usize {
        let at = self.data.len();
        self.data.extend_from_slice(bytes);
        at
    }

    /// Point the offset field of the entry at `slot` to `target`.
    pub fn link(&mut self, slot: usize, target: usize) {
        self.patch_u32(slot + 8, target as u32);
    }

    pub fn set_next(&mut self, ifd: &IfdPos, target: usize) {
        self.patch_u32(ifd.next, target as u32);
    }

    pub fn patch_u32(&mut self, at: usize, value: u32) {
        let bytes = self.bo.u32_bytes(value);
        self.data[at..at + 4].copy_from_slice(&bytes);
    }

    pub fn patch_u16(&mut self, at: usize, value: u16) {
        let bytes = self.bo.u16_bytes(value);
        self.data[at..at + 2].copy_from_slice(&bytes);
    }

    pub fn finish(self) -> Vec<u8> {
        self.data
    }
}

/// A Nikon type 3 makernote: the signature, then a complete TIFF structure of its own.
pub fn nikon3_makernote(inner: TiffBuilder) -> Vec<u8> {
    let mut data = b"Nikon\0\x02\x10\0\0".to_vec();
    data.extend_from_slice(&inner.finish());
    data
}
