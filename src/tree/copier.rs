//! Carrying the image data of a tree over into a new one.
use log::{debug, warn};

use super::{Tree, Variant};
use crate::encoder::ImagePolicy;
use crate::factory::ComponentFactory;
use crate::makernote::MakernoteFactory;
use crate::tags::{tag, Group, Type};

const IMAGE_GROUPS: [Group; 13] = [
    Group::Ifd0,
    Group::Ifd1,
    Group::Ifd2,
    Group::Ifd3,
    Group::SubImage1,
    Group::SubImage2,
    Group::SubImage3,
    Group::SubImage4,
    Group::SubImage5,
    Group::SubImage6,
    Group::SubImage7,
    Group::SubImage8,
    Group::SubImage9,
];

/// The groups holding a primary image: those whose `NewSubfileType` is a single `LONG` with
/// the reduced-resolution bit clear.
pub fn find_primary_groups(tree: &Tree) -> Vec<Group> {
    IMAGE_GROUPS
        .iter()
        .copied()
        .filter(|&group| {
            let value = tree
                .find(tag::NEW_SUBFILE_TYPE, group)
                .and_then(|found| tree.node(found).value());
            matches!(value, Some(v)
                if v.data_type() == Type::LONG && v.count() == 1 && v.to_i64(0).map_or(false, |n| n & 1 == 0))
        })
        .collect()
}

/// Deep copy every entry of `source` that the policy counts as image data into `dest`,
/// each at the place its tag and group have below `root`.
///
/// Directories themselves are not copied; they are created as needed on the way to their
/// entries.
pub fn copy_image_tags(
    source: &Tree,
    dest: &mut Tree,
    root: u32,
    policy: &dyn ImagePolicy,
    primary_groups: &[Group],
    factory: &dyn ComponentFactory,
    makernotes: &dyn MakernoteFactory,
) {
    for id in source.descendants(source.root()) {
        let node = source.node(id);
        if node.variant() == Variant::Directory {
            continue;
        }
        let (tag, group) = (node.tag(), node.group());
        if !policy.is_image_tag(tag, group, primary_groups) {
            continue;
        }

        let Some(path) = factory.path(u32::from(tag), group, root) else {
            warn!("No path to copy {:#06x} in {} to.", tag, group);
            continue;
        };
        let copy = source.clone_into(id, dest);
        match dest.add_path(tag, &path, Some(copy), factory, makernotes) {
            Some(_) => debug!("Copied {:#06x} in {}", tag, group),
            None => warn!("Failed to copy {:#06x} in {}.", tag, group),
        }
    }
}
