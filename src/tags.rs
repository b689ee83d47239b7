macro_rules! tags {
    {
        // Permit arbitrary meta items, which include documentation.
        $( #[$enum_attr:meta] )*
        $vis:vis enum $name:ident($ty:tt) $(unknown(#[$unknown_meta:meta] $unknown_doc:ident))* {
            // Each of the `Name = Val,` permitting documentation.
            $($(#[$ident_attr:meta])* $tag:ident = $val:expr,)*
        }
    } => {
        $( #[$enum_attr] )*
        #[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
        #[non_exhaustive]
        #[repr($ty)]
        pub enum $name {
            $($(#[$ident_attr])* $tag = $val,)*
            $(
                #[$unknown_meta]
                Unknown($ty),
            )*
        }

        impl $name {
            #[inline(always)]
            const fn __from_inner_type(n: $ty) -> Result<Self, $ty> {
                match n {
                    $( $val => Ok($name::$tag), )*
                    n => Err(n),
                }
            }

            #[inline(always)]
            const fn __to_inner_type(&self) -> $ty {
                match *self {
                    $( $name::$tag => $val, )*
                    $( $name::Unknown($unknown_doc) => { $unknown_doc }, )*
                }
            }
        }

        tags!($name, $ty, $($unknown_doc)*);
    };
    // For u16 tags, provide direct inherent primitive conversion methods.
    ($name:tt, u16, $($unknown_doc:ident)*) => {
        impl $name {
            #[inline(always)]
            pub const fn from_u16(val: u16) -> Option<Self> {
                match Self::__from_inner_type(val) {
                    Ok(v) => Some(v),
                    Err(_) => None,
                }
            }

            $(
            #[inline(always)]
            pub const fn from_u16_exhaustive($unknown_doc: u16) -> Self {
                match Self::__from_inner_type($unknown_doc) {
                    Ok(v) => v,
                    Err(_) => $name::Unknown($unknown_doc),
                }
            }
            )*

            #[inline(always)]
            pub const fn to_u16(&self) -> u16 {
                Self::__to_inner_type(self)
            }
        }
    };
    ($name:tt, $ty:tt, $($unknown_doc:literal)*) => {};
}

/// Tag numbers the tree machinery itself depends on.
///
/// Everything else is carried through opaquely by its number.
pub mod tag {
    pub const NEW_SUBFILE_TYPE: u16 = 0x00fe;
    pub const MAKE: u16 = 0x010f;
    pub const MODEL: u16 = 0x0110;
    pub const STRIP_OFFSETS: u16 = 0x0111;
    pub const STRIP_BYTE_COUNTS: u16 = 0x0117;
    pub const TILE_OFFSETS: u16 = 0x0144;
    pub const TILE_BYTE_COUNTS: u16 = 0x0145;
    pub const SUB_IFDS: u16 = 0x014a;
    pub const JPEG_INTERCHANGE_FORMAT: u16 = 0x0201;
    pub const JPEG_INTERCHANGE_FORMAT_LENGTH: u16 = 0x0202;
    pub const XML_PACKET: u16 = 0x02bc;
    pub const IPTC_NAA: u16 = 0x83bb;
    pub const IMAGE_RESOURCES: u16 = 0x8649;
    pub const EXIF_IFD: u16 = 0x8769;
    pub const GPS_IFD: u16 = 0x8825;
    pub const MAKER_NOTE: u16 = 0x927c;
    pub const INTEROPERABILITY_IFD: u16 = 0xa005;

    /// Synthesized record: offset of the makernote within the image.
    pub const MN_OFFSET: u16 = 0x0001;
    /// Synthesized record: byte order of the makernote, `"II"` or `"MM"`.
    pub const MN_BYTE_ORDER: u16 = 0x0002;

    pub const CANON_CAMERA_SETTINGS: u16 = 0x0001;
    pub const CANON_AF_INFO: u16 = 0x0026;
    pub const SONY_PREVIEW_IMAGE: u16 = 0x2001;
    pub const SONY_TAG_9402: u16 = 0x9402;
}

/// Extended tag numbers used by the factory tables and paths.
///
/// They lie outside the 16-bit range so they can never collide with a tag read from a file.
pub mod ext {
    /// The root of a tree. A node created from it has tag `0`.
    pub const ROOT: u32 = 0x20000;
    /// The next-IFD pointer of a directory.
    pub const NEXT: u32 = 0x30000;
    /// Wildcard matching every tag.
    pub const ALL: u32 = 0x40000;
}

tags! {
/// The type of an entry.
pub enum Type(u16) unknown(
    /// A type code without a known size, treated as one byte per element.
    unknown
) {
    /// 8-bit unsigned integer
    BYTE = 1,
    /// 8-bit byte that contains a 7-bit ASCII code; the last byte must be zero
    ASCII = 2,
    /// 16-bit unsigned integer
    SHORT = 3,
    /// 32-bit unsigned integer
    LONG = 4,
    /// Fraction stored as two 32-bit unsigned integers
    RATIONAL = 5,
    /// 8-bit signed integer
    SBYTE = 6,
    /// 8-bit byte that may contain anything, depending on the field
    UNDEFINED = 7,
    /// 16-bit signed integer
    SSHORT = 8,
    /// 32-bit signed integer
    SLONG = 9,
    /// Fraction stored as two 32-bit signed integers
    SRATIONAL = 10,
    /// 32-bit IEEE floating point
    FLOAT = 11,
    /// 64-bit IEEE floating point
    DOUBLE = 12,
    /// 32-bit unsigned integer (offset)
    IFD = 13,
}
}

impl Type {
    /// Size of a single element of this type.
    pub fn byte_len(&self) -> usize {
        match *self {
            Type::BYTE | Type::SBYTE | Type::ASCII | Type::UNDEFINED => 1,
            Type::SHORT | Type::SSHORT => 2,
            Type::LONG | Type::SLONG | Type::FLOAT | Type::IFD => 4,
            Type::DOUBLE | Type::RATIONAL | Type::SRATIONAL => 8,
            Type::Unknown(_) => 1,
        }
    }

    pub(crate) fn endian_bytes(self) -> EndianBytes {
        match self {
            Type::BYTE | Type::SBYTE | Type::ASCII | Type::UNDEFINED | Type::Unknown(_) => {
                EndianBytes::One
            }
            Type::SHORT | Type::SSHORT => EndianBytes::Two,
            Type::LONG
            | Type::SLONG
            | Type::FLOAT
            | Type::IFD
            | Type::RATIONAL
            | Type::SRATIONAL => EndianBytes::Four,
            Type::DOUBLE => EndianBytes::Eight,
        }
    }
}

tags! {
/// Identifies which directory or sub-structure an entry belongs to.
///
/// The sub-image groups are numbered consecutively so that the `n`th directory behind a
/// sub-IFD pointer can be addressed with [`Group::nth`].
pub enum Group(u16) unknown(
    /// A group defined by a custom factory.
    unknown
) {
    /// Placeholder for "no group", the parent of the root.
    NotSet = 0,
    /// Primary image directory.
    Ifd0 = 1,
    /// Thumbnail directory.
    Ifd1 = 2,
    Ifd2 = 3,
    Ifd3 = 4,
    /// Exif sub-directory.
    Exif = 5,
    /// GPS sub-directory.
    Gps = 6,
    /// Interoperability sub-directory.
    Iop = 7,
    /// Synthesized records describing the makernote.
    MakerNote = 8,
    SubImage1 = 20,
    SubImage2 = 21,
    SubImage3 = 22,
    SubImage4 = 23,
    SubImage5 = 24,
    SubImage6 = 25,
    SubImage7 = 26,
    SubImage8 = 27,
    SubImage9 = 28,
    /// Canon makernote directory.
    Canon = 40,
    /// Canon camera settings array.
    CanonCs = 41,
    /// Nikon type 3 makernote directory.
    Nikon3 = 50,
    /// Olympus makernote directory.
    Olympus = 60,
    /// Sony makernote directory.
    Sony1 = 70,
    /// Sony enciphered 0x9402 array.
    Sony9402 = 71,
}
}

impl Group {
    /// The group `n` places after this one, used for consecutive sub-IFD directories.
    pub fn nth(self, n: u16) -> Group {
        Group::from_u16_exhaustive(self.to_u16().wrapping_add(n))
    }

    /// A printable name for the group.
    pub fn name(self) -> &'static str {
        match self {
            Group::NotSet => "NotSet",
            Group::Ifd0 => "Image",
            Group::Ifd1 => "Thumbnail",
            Group::Ifd2 => "Image2",
            Group::Ifd3 => "Image3",
            Group::Exif => "Photo",
            Group::Gps => "GPSInfo",
            Group::Iop => "Iop",
            Group::MakerNote => "MakerNote",
            Group::SubImage1 => "SubImage1",
            Group::SubImage2 => "SubImage2",
            Group::SubImage3 => "SubImage3",
            Group::SubImage4 => "SubImage4",
            Group::SubImage5 => "SubImage5",
            Group::SubImage6 => "SubImage6",
            Group::SubImage7 => "SubImage7",
            Group::SubImage8 => "SubImage8",
            Group::SubImage9 => "SubImage9",
            Group::Canon => "Canon",
            Group::CanonCs => "CanonCs",
            Group::Nikon3 => "Nikon3",
            Group::Olympus => "Olympus",
            Group::Sony1 => "Sony1",
            Group::Sony9402 => "Sony9402",
            Group::Unknown(_) => "Unknown",
        }
    }
}

impl std::fmt::Display for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Group::Unknown(n) => write!(f, "Unknown{:#x}", n),
            other => f.write_str(other.name()),
        }
    }
}

/// Byte order of a TIFF structure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    /// little endian byte order
    LittleEndian,
    /// big endian byte order
    BigEndian,
}

impl ByteOrder {
    /// Get the byte order representing the running target.
    pub const fn native() -> Self {
        match () {
            #[cfg(target_endian = "little")]
            () => ByteOrder::LittleEndian,
            #[cfg(target_endian = "big")]
            () => ByteOrder::BigEndian,
            #[cfg(not(any(target_endian = "big", target_endian = "little")))]
            () => compile_error!("Unsupported target"),
        }
    }

    /// Parse the two-letter marker used in TIFF headers and makernote records.
    pub fn from_marker(marker: &[u8]) -> Option<Self> {
        match marker {
            b"II" => Some(ByteOrder::LittleEndian),
            b"MM" => Some(ByteOrder::BigEndian),
            _ => None,
        }
    }

    /// The two-letter marker of this byte order.
    pub fn marker(self) -> &'static str {
        match self {
            ByteOrder::LittleEndian => "II",
            ByteOrder::BigEndian => "MM",
        }
    }

    /// Given a typed buffer, convert its contents to the specified byte order in-place.
    ///
    /// The buffer is assumed to represent an array of the given type. Trailing bytes that do not
    /// form a whole element are left alone.
    pub fn convert(self, ty: Type, buffer: &mut [u8], to: ByteOrder) {
        self.convert_endian_bytes(ty.endian_bytes(), buffer, to)
    }

    pub(crate) fn convert_endian_bytes(self, cls: EndianBytes, buffer: &mut [u8], to: ByteOrder) {
        if self == to {
            return;
        }

        match cls {
            EndianBytes::One => {}
            EndianBytes::Two => {
                for chunk in buffer.chunks_exact_mut(2) {
                    chunk.swap(0, 1);
                }
            }
            EndianBytes::Four => {
                for chunk in buffer.chunks_exact_mut(4) {
                    chunk.reverse();
                }
            }
            EndianBytes::Eight => {
                for chunk in buffer.chunks_exact_mut(8) {
                    chunk.reverse();
                }
            }
        }
    }

    pub fn read_u16(self, bytes: &[u8]) -> Option<u16> {
        let raw: [u8; 2] = bytes.get(..2)?.try_into().ok()?;
        Some(match self {
            ByteOrder::LittleEndian => u16::from_le_bytes(raw),
            ByteOrder::BigEndian => u16::from_be_bytes(raw),
        })
    }

    pub fn read_u32(self, bytes: &[u8]) -> Option<u32> {
        let raw: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
        Some(match self {
            ByteOrder::LittleEndian => u32::from_le_bytes(raw),
            ByteOrder::BigEndian => u32::from_be_bytes(raw),
        })
    }

    pub fn u16_bytes(self, n: u16) -> [u8; 2] {
        match self {
            ByteOrder::LittleEndian => n.to_le_bytes(),
            ByteOrder::BigEndian => n.to_be_bytes(),
        }
    }

    pub fn u32_bytes(self, n: u32) -> [u8; 4] {
        match self {
            ByteOrder::LittleEndian => n.to_le_bytes(),
            ByteOrder::BigEndian => n.to_be_bytes(),
        }
    }
}

/// The size of individual byte-order corrected elements.
#[derive(Clone, Copy)]
pub(crate) enum EndianBytes {
    One,
    Two,
    Four,
    Eight,
}

#[test]
fn unknown_type_is_one_byte_wide() {
    let ty = Type::from_u16_exhaustive(0x55);
    assert_eq!(ty, Type::Unknown(0x55));
    assert_eq!(ty.byte_len(), 1);
    assert_eq!(ty.to_u16(), 0x55);
}

#[test]
fn sub_image_groups_are_consecutive() {
    assert_eq!(Group::SubImage1.nth(0), Group::SubImage1);
    assert_eq!(Group::SubImage1.nth(8), Group::SubImage9);
    assert_eq!(Group::Ifd1.nth(1), Group::Ifd2);
}

#[test]
fn convert_rational_swaps_halves_separately() {
    let mut buf = [0, 0, 0, 1, 0, 0, 0, 2];
    ByteOrder::BigEndian.convert(Type::RATIONAL, &mut buf, ByteOrder::LittleEndian);
    assert_eq!(buf, [1, 0, 0, 0, 2, 0, 0, 0]);
}

#[test]
fn markers_round_trip() {
    for bo in [ByteOrder::LittleEndian, ByteOrder::BigEndian] {
        assert_eq!(ByteOrder::from_marker(bo.marker().as_bytes()), Some(bo));
    }
    assert_eq!(ByteOrder::from_marker(b"XX"), None);
}
