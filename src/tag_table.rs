//! Names of known tags, by group.
use crate::tags::Group;

/// What is known about a tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TagInfo {
    pub tag: u16,
    pub name: &'static str,
    pub group: Group,
}

/// Looks up tags by group and number.
pub trait TagTable {
    fn tag_info(&self, group: Group, tag: u16) -> Option<TagInfo>;
}

const fn info(tag: u16, name: &'static str, group: Group) -> TagInfo {
    TagInfo { tag, name, group }
}

static IMAGE_TAGS: &[TagInfo] = &[
    info(0x00fe, "NewSubfileType", Group::Ifd0),
    info(0x0100, "ImageWidth", Group::Ifd0),
    info(0x0101, "ImageLength", Group::Ifd0),
    info(0x0103, "Compression", Group::Ifd0),
    info(0x010f, "Make", Group::Ifd0),
    info(0x0110, "Model", Group::Ifd0),
    info(0x0111, "StripOffsets", Group::Ifd0),
    info(0x0117, "StripByteCounts", Group::Ifd0),
    info(0x014a, "SubIFDs", Group::Ifd0),
    info(0x0201, "JPEGInterchangeFormat", Group::Ifd0),
    info(0x0202, "JPEGInterchangeFormatLength", Group::Ifd0),
    info(0x02bc, "XMLPacket", Group::Ifd0),
    info(0x83bb, "IPTCNAA", Group::Ifd0),
    info(0x8649, "ImageResources", Group::Ifd0),
    info(0x8769, "ExifTag", Group::Ifd0),
    info(0x8825, "GPSTag", Group::Ifd0),
];

static MAKERNOTE_TAGS: &[TagInfo] = &[
    info(0x0001, "Offset", Group::MakerNote),
    info(0x0002, "ByteOrder", Group::MakerNote),
];

static CANON_TAGS: &[TagInfo] = &[
    info(0x0001, "CameraSettings", Group::Canon),
    info(0x0026, "AFInfo", Group::Canon),
    info(0x2600, "AFInfoSize", Group::Canon),
    info(0x2601, "AFAreaMode", Group::Canon),
    info(0x2602, "AFNumPoints", Group::Canon),
    info(0x2603, "AFValidPoints", Group::Canon),
    info(0x2604, "AFCanonImageWidth", Group::Canon),
    info(0x2605, "AFCanonImageHeight", Group::Canon),
    info(0x2606, "AFImageWidth", Group::Canon),
    info(0x2607, "AFImageHeight", Group::Canon),
    info(0x2608, "AFAreaWidths", Group::Canon),
    info(0x2609, "AFAreaHeights", Group::Canon),
    info(0x260a, "AFXPositions", Group::Canon),
    info(0x260b, "AFYPositions", Group::Canon),
    info(0x260c, "AFPointsInFocus", Group::Canon),
    info(0x260d, "AFPointsSelected", Group::Canon),
    info(0x260e, "AFPointsUnusable", Group::Canon),
];

/// The built-in tag lists.
#[derive(Clone, Copy, Debug, Default)]
pub struct StandardTags;

impl TagTable for StandardTags {
    fn tag_info(&self, group: Group, tag: u16) -> Option<TagInfo> {
        let list = match group {
            Group::Ifd0 | Group::Ifd1 | Group::Ifd2 | Group::Ifd3 => IMAGE_TAGS,
            Group::MakerNote => MAKERNOTE_TAGS,
            Group::Canon => CANON_TAGS,
            _ => return None,
        };

        list.iter()
            .find(|info| info.tag == tag)
            .map(|info| TagInfo { group, ..*info })
    }
}
