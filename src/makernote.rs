//! Vendor makernotes: recognizing them and reading their headers.
use log::debug;

use crate::tags::{ByteOrder, Group};

const OLYMPUS_SIGNATURE: &[u8] = b"OLYMP\0";
const NIKON_SIGNATURE: &[u8] = b"Nikon\0";
const SONY_SIGNATURE: &[u8] = b"SONY DSC \0\0\0";

/// The header in front of a makernote's directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MnHeader {
    /// The directory starts right at the makernote.
    None,
    /// `"OLYMP\0"` and two version bytes.
    Olympus { header: [u8; 8] },
    /// `"Nikon\0"`, version, then an embedded TIFF header whose offsets are relative to it.
    Nikon3 {
        header: [u8; 10],
        byte_order: Option<ByteOrder>,
        start: u32,
    },
    /// `"SONY DSC \0\0\0"`.
    Sony,
}

impl MnHeader {
    pub fn nikon3() -> Self {
        let mut header = [0u8; 10];
        header[..6].copy_from_slice(NIKON_SIGNATURE);
        header[6] = 0x02;
        header[7] = 0x10;
        MnHeader::Nikon3 {
            header,
            byte_order: None,
            start: 8,
        }
    }

    pub fn olympus() -> Self {
        let mut header = [0u8; 8];
        header[..6].copy_from_slice(OLYMPUS_SIGNATURE);
        header[6] = 0x01;
        MnHeader::Olympus { header }
    }

    /// Read the header from the start of the makernote, returning whether it is valid.
    pub fn read(&mut self, data: &[u8]) -> bool {
        match self {
            MnHeader::None => true,
            MnHeader::Olympus { header } => {
                if data.len() < header.len() || !data.starts_with(OLYMPUS_SIGNATURE) {
                    return false;
                }
                header.copy_from_slice(&data[..8]);
                true
            }
            MnHeader::Nikon3 {
                header,
                byte_order,
                start,
            } => {
                if data.len() < 18 || !data.starts_with(NIKON_SIGNATURE) {
                    return false;
                }
                header.copy_from_slice(&data[..10]);
                let Some(bo) = ByteOrder::from_marker(&data[10..12]) else {
                    return false;
                };
                if bo.read_u16(&data[12..14]) != Some(42) {
                    return false;
                }
                *byte_order = Some(bo);
                *start = bo.read_u32(&data[14..18]).unwrap_or(8);
                true
            }
            MnHeader::Sony => data.len() >= SONY_SIGNATURE.len() && data.starts_with(SONY_SIGNATURE),
        }
    }

    /// Size of the header when written.
    pub fn size(&self) -> usize {
        match self {
            MnHeader::None => 0,
            MnHeader::Olympus { .. } => 8,
            MnHeader::Nikon3 { .. } => 18,
            MnHeader::Sony => SONY_SIGNATURE.len(),
        }
    }

    /// Offset of the directory from the start of the makernote.
    pub fn ifd_offset(&self) -> usize {
        match self {
            MnHeader::Nikon3 { start, .. } => 10 + *start as usize,
            other => other.size(),
        }
    }

    /// Byte order mandated by the header, if any.
    pub fn byte_order(&self) -> Option<ByteOrder> {
        match self {
            MnHeader::Nikon3 { byte_order, .. } => *byte_order,
            _ => None,
        }
    }

    /// Only headers that record a byte order can change it.
    pub fn set_byte_order(&mut self, bo: ByteOrder) {
        if let MnHeader::Nikon3 { byte_order, .. } = self {
            *byte_order = Some(bo);
        }
    }

    /// Base that offsets inside the makernote are relative to, given the makernote's offset.
    pub fn base_offset(&self, mn_offset: usize) -> usize {
        match self {
            MnHeader::Nikon3 { .. } => mn_offset + 10,
            _ => 0,
        }
    }

    /// Serialize the header in the given byte order.
    pub fn write(&self, bo: ByteOrder) -> Vec<u8> {
        match self {
            MnHeader::None => Vec::new(),
            MnHeader::Olympus { header } => header.to_vec(),
            MnHeader::Nikon3 {
                header, byte_order, ..
            } => {
                let bo = byte_order.unwrap_or(bo);
                let mut out = header.to_vec();
                out.extend_from_slice(bo.marker().as_bytes());
                out.extend_from_slice(&bo.u16_bytes(42));
                out.extend_from_slice(&bo.u32_bytes(8));
                out
            }
            MnHeader::Sony => SONY_SIGNATURE.to_vec(),
        }
    }
}

/// What a makernote factory decided about a MakerNote entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Makernote {
    pub header: MnHeader,
    /// Group of the makernote's directory.
    pub mn_group: Group,
    pub has_next: bool,
}

/// Recognizes makernotes.
pub trait MakernoteFactory {
    /// Recognize a makernote by the camera make and its first bytes.
    fn create(
        &self,
        tag: u16,
        group: Group,
        make: &str,
        data: &[u8],
        byte_order: ByteOrder,
    ) -> Option<Makernote>;

    /// Create an empty makernote for a known directory group, when building a tree.
    fn create_for_group(&self, tag: u16, group: Group, mn_group: Group) -> Option<Makernote>;
}

/// The built-in makernotes, keyed by the beginning of the camera make.
#[derive(Clone, Copy, Debug, Default)]
pub struct StandardMakernotes;

impl StandardMakernotes {
    fn for_group(mn_group: Group) -> Option<Makernote> {
        let header = match mn_group {
            Group::Canon => MnHeader::None,
            Group::Nikon3 => MnHeader::nikon3(),
            Group::Olympus => MnHeader::olympus(),
            Group::Sony1 => MnHeader::Sony,
            _ => return None,
        };

        Some(Makernote {
            header,
            mn_group,
            has_next: true,
        })
    }
}

impl MakernoteFactory for StandardMakernotes {
    fn create(
        &self,
        _tag: u16,
        _group: Group,
        make: &str,
        data: &[u8],
        _byte_order: ByteOrder,
    ) -> Option<Makernote> {
        let mn_group = if make.starts_with("Canon") {
            Group::Canon
        } else if make.starts_with("NIKON") && data.starts_with(b"Nikon\0\x02") {
            Group::Nikon3
        } else if make.starts_with("OLYMPUS") && data.starts_with(OLYMPUS_SIGNATURE) {
            Group::Olympus
        } else if make.starts_with("SONY") && data.starts_with(SONY_SIGNATURE) {
            Group::Sony1
        } else {
            debug!("no makernote known for make {:?}", make);
            return None;
        };

        Self::for_group(mn_group)
    }

    fn create_for_group(&self, _tag: u16, _group: Group, mn_group: Group) -> Option<Makernote> {
        Self::for_group(mn_group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nikon_header_carries_byte_order() {
        let mut data = b"Nikon\0\x02\x10\0\0MM\0\x2a\0\0\0\x08".to_vec();
        data.extend_from_slice(&[0; 4]);

        let mut header = MnHeader::nikon3();
        assert!(header.read(&data));
        assert_eq!(header.byte_order(), Some(ByteOrder::BigEndian));
        assert_eq!(header.ifd_offset(), 18);
        assert_eq!(header.base_offset(100), 110);
        assert_eq!(header.write(ByteOrder::LittleEndian), data[..18]);
    }

    #[test]
    fn truncated_headers_are_rejected() {
        assert!(!MnHeader::nikon3().read(b"Nikon\0\x02"));
        assert!(!MnHeader::olympus().read(b"OLYMP"));
        assert!(!MnHeader::Sony.read(b"SONY DSC "));
        assert!(MnHeader::None.read(&[]));
    }

    #[test]
    fn recognized_by_make_and_signature() {
        let factory = StandardMakernotes;
        let canon = factory.create(0x927c, Group::Exif, "Canon", &[], ByteOrder::LittleEndian);
        assert_eq!(canon.map(|mn| mn.mn_group), Some(Group::Canon));

        let sony = factory.create(0x927c, Group::Exif, "SONY", b"garbage", ByteOrder::LittleEndian);
        assert_eq!(sony, None);

        let sony = factory.create(
            0x927c,
            Group::Exif,
            "SONY",
            b"SONY DSC \0\0\0\x01\x00",
            ByteOrder::LittleEndian,
        );
        assert_eq!(sony.map(|mn| mn.header), Some(MnHeader::Sony));
    }
}
