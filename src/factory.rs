//! Which component to create for a tag, and where in the tree it belongs.
use log::warn;

use crate::binary_array::{CANON_CAMERA_SETTINGS, SONY_9402};
use crate::tags::{ext, tag, Group};
use crate::tree::{Node, PathItem};

/// Creates tree components and knows the structure of the tree.
pub trait ComponentFactory {
    /// Create the component for an extended tag in a group, `None` if it is to be ignored.
    fn create(&self, ext_tag: u32, group: Group) -> Option<Node>;

    /// The path from the root to a tag in a group, starting with the root's item.
    ///
    /// `None` if the group is not part of the structure below `root`.
    fn path(&self, ext_tag: u32, group: Group, root: u32) -> Option<Vec<PathItem>>;
}

/// Links a group to the entry in its parent group that points to it.
#[derive(Clone, Copy, Debug)]
struct TreeStructure {
    root: u32,
    group: Group,
    parent_group: Group,
    parent_ext_tag: u32,
}

const fn link(group: Group, parent_group: Group, parent_ext_tag: u32) -> TreeStructure {
    TreeStructure {
        root: ext::ROOT,
        group,
        parent_group,
        parent_ext_tag,
    }
}

const STRUCTURE: &[TreeStructure] = &[
    link(Group::NotSet, Group::NotSet, ext::ROOT),
    link(Group::Ifd0, Group::NotSet, ext::ROOT),
    link(Group::Ifd1, Group::Ifd0, ext::NEXT),
    link(Group::Ifd2, Group::Ifd1, ext::NEXT),
    link(Group::Ifd3, Group::Ifd2, ext::NEXT),
    link(Group::Exif, Group::Ifd0, tag::EXIF_IFD as u32),
    link(Group::Gps, Group::Ifd0, tag::GPS_IFD as u32),
    link(Group::Iop, Group::Exif, tag::INTEROPERABILITY_IFD as u32),
    link(Group::SubImage1, Group::Ifd0, tag::SUB_IFDS as u32),
    link(Group::SubImage2, Group::Ifd0, tag::SUB_IFDS as u32),
    link(Group::SubImage3, Group::Ifd0, tag::SUB_IFDS as u32),
    link(Group::SubImage4, Group::Ifd0, tag::SUB_IFDS as u32),
    link(Group::SubImage5, Group::Ifd0, tag::SUB_IFDS as u32),
    link(Group::SubImage6, Group::Ifd0, tag::SUB_IFDS as u32),
    link(Group::SubImage7, Group::Ifd0, tag::SUB_IFDS as u32),
    link(Group::SubImage8, Group::Ifd0, tag::SUB_IFDS as u32),
    link(Group::SubImage9, Group::Ifd0, tag::SUB_IFDS as u32),
    link(Group::Canon, Group::Exif, tag::MAKER_NOTE as u32),
    link(Group::CanonCs, Group::Canon, tag::CANON_CAMERA_SETTINGS as u32),
    link(Group::Nikon3, Group::Exif, tag::MAKER_NOTE as u32),
    link(Group::Olympus, Group::Exif, tag::MAKER_NOTE as u32),
    link(Group::Sony1, Group::Exif, tag::MAKER_NOTE as u32),
    link(Group::Sony9402, Group::Sony1, tag::SONY_TAG_9402 as u32),
];

/// The built-in components for TIFF and Exif images and the supported makernotes.
#[derive(Clone, Copy, Debug, Default)]
pub struct StandardFactory;

impl StandardFactory {
    fn is_image_group(group: Group) -> bool {
        matches!(
            group,
            Group::Ifd0
                | Group::Ifd1
                | Group::Ifd2
                | Group::Ifd3
                | Group::SubImage1
                | Group::SubImage2
                | Group::SubImage3
                | Group::SubImage4
                | Group::SubImage5
                | Group::SubImage6
                | Group::SubImage7
                | Group::SubImage8
                | Group::SubImage9
        )
    }

    fn is_known_group(group: Group) -> bool {
        STRUCTURE.iter().any(|s| s.group == group && group != Group::NotSet)
    }
}

impl ComponentFactory for StandardFactory {
    fn create(&self, ext_tag: u32, group: Group) -> Option<Node> {
        if ext_tag == ext::ROOT && group == Group::NotSet {
            return Some(Node::directory(0, Group::Ifd0, true));
        }

        if ext_tag == ext::NEXT {
            let next = match group {
                Group::Ifd0 => Group::Ifd1,
                Group::Ifd1 => Group::Ifd2,
                Group::Ifd2 => Group::Ifd3,
                _ => return None,
            };
            return Some(Node::directory(0, next, true));
        }

        let Ok(number) = u16::try_from(ext_tag) else {
            warn!("no component for extended tag {:#x} in group {}", ext_tag, group);
            return None;
        };

        let node = match (number, group) {
            (tag::EXIF_IFD, Group::Ifd0) => Node::sub_ifd(number, group, Group::Exif),
            (tag::GPS_IFD, Group::Ifd0) => Node::sub_ifd(number, group, Group::Gps),
            (tag::INTEROPERABILITY_IFD, Group::Exif) => Node::sub_ifd(number, group, Group::Iop),
            (tag::SUB_IFDS, Group::Ifd0) => Node::sub_ifd(number, group, Group::SubImage1),
            (tag::MAKER_NOTE, Group::Exif) => Node::mn_entry(number, group, Group::MakerNote),

            (tag::JPEG_INTERCHANGE_FORMAT, Group::Ifd0 | Group::Ifd1) => {
                Node::data_entry(number, group, tag::JPEG_INTERCHANGE_FORMAT_LENGTH, group)
            }
            (tag::JPEG_INTERCHANGE_FORMAT_LENGTH, Group::Ifd0 | Group::Ifd1) => {
                Node::size_entry(number, group, tag::JPEG_INTERCHANGE_FORMAT, group)
            }
            (tag::STRIP_OFFSETS, g) if Self::is_image_group(g) => {
                Node::image_entry(number, g, tag::STRIP_BYTE_COUNTS, g)
            }
            (tag::STRIP_BYTE_COUNTS, g) if Self::is_image_group(g) => {
                Node::size_entry(number, g, tag::STRIP_OFFSETS, g)
            }
            (tag::TILE_OFFSETS, g) if Self::is_image_group(g) => {
                Node::image_entry(number, g, tag::TILE_BYTE_COUNTS, g)
            }
            (tag::TILE_BYTE_COUNTS, g) if Self::is_image_group(g) => {
                Node::size_entry(number, g, tag::TILE_OFFSETS, g)
            }

            (tag::CANON_CAMERA_SETTINGS, Group::Canon) => {
                Node::binary_array(number, group, &CANON_CAMERA_SETTINGS)
            }
            (tag::SONY_TAG_9402, Group::Sony1) => Node::binary_array(number, group, &SONY_9402),
            (_, Group::CanonCs | Group::Sony9402) => Node::binary_element(
                number,
                group,
                crate::binary_array::ArrayDef::new(0, crate::tags::Type::UNDEFINED, 1),
                None,
            ),

            (_, g) if Self::is_known_group(g) => Node::entry(number, g),
            _ => return None,
        };

        Some(node)
    }

    fn path(&self, ext_tag: u32, group: Group, root: u32) -> Option<Vec<PathItem>> {
        let mut path = Vec::new();
        let (mut ext_tag, mut group) = (ext_tag, group);

        loop {
            path.push(PathItem::new(ext_tag, group));
            let link = STRUCTURE.iter().find(|s| s.root == root && s.group == group)?;
            ext_tag = link.parent_ext_tag;
            group = link.parent_group;
            if link.group == Group::NotSet {
                break;
            }
        }

        path.reverse();
        Some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_of_a_makernote_tag() {
        let path = StandardFactory
            .path(0x0004, Group::Canon, ext::ROOT)
            .expect("Canon is part of the structure");

        assert_eq!(
            path,
            [
                PathItem::new(ext::ROOT, Group::NotSet),
                PathItem::new(tag::EXIF_IFD as u32, Group::Ifd0),
                PathItem::new(tag::MAKER_NOTE as u32, Group::Exif),
                PathItem::new(0x0004, Group::Canon),
            ]
        );
    }

    #[test]
    fn path_of_a_thumbnail_tag() {
        let path = StandardFactory
            .path(0x0103, Group::Ifd1, ext::ROOT)
            .expect("IFD1 is part of the structure");

        assert_eq!(
            path,
            [
                PathItem::new(ext::ROOT, Group::NotSet),
                PathItem::new(ext::NEXT, Group::Ifd0),
                PathItem::new(0x0103, Group::Ifd1),
            ]
        );
    }

    #[test]
    fn unknown_groups_have_no_path() {
        assert_eq!(StandardFactory.path(1, Group::Unknown(999), ext::ROOT), None);
        assert!(StandardFactory.create(1, Group::Unknown(999)).is_none());
    }

    #[test]
    fn next_pointers_end_after_ifd3() {
        assert!(StandardFactory.create(ext::NEXT, Group::Ifd2).is_some());
        assert!(StandardFactory.create(ext::NEXT, Group::Ifd3).is_none());
        assert!(StandardFactory.create(ext::NEXT, Group::Exif).is_none());
    }
}
