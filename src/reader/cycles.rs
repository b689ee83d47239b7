use std::collections::HashMap;

use crate::tags::Group;

/// Directories of a TIFF structure should form a tree, but nothing stops a file from pointing
/// a sub-IFD or next pointer back at a directory that was already read. Reading it again would
/// never terminate on a malicious image, so each directory start is read at most once.
///
/// The first group to claim a position is kept for diagnostics.
#[derive(Default, Debug)]
pub struct VisitedDirectories {
    starts: HashMap<usize, Group>,
}

impl VisitedDirectories {
    pub fn new() -> Self {
        VisitedDirectories::default()
    }

    /// Record a directory start, returning the group that claimed it before, if any.
    pub fn insert(&mut self, start: usize, group: Group) -> Option<Group> {
        match self.starts.get(&start) {
            Some(previous) => Some(*previous),
            None => {
                self.starts.insert(start, group);
                None
            }
        }
    }
}

#[test]
fn revisited_start_reports_first_group() {
    let mut visited = VisitedDirectories::new();

    assert_eq!(visited.insert(0x20, Group::Ifd0), None);
    assert_eq!(visited.insert(0x800, Group::Ifd1), None);
    assert_eq!(visited.insert(0x20, Group::Ifd2), Some(Group::Ifd0));
}

#[test]
fn directory_pointing_at_itself() {
    let mut visited = VisitedDirectories::new();

    assert_eq!(visited.insert(0x20, Group::Exif), None);
    assert_eq!(visited.insert(0x20, Group::Exif), Some(Group::Exif));
}
