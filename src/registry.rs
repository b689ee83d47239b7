//! Per-tag behavior looked up by camera make, tag and group.
use crate::tags::{ext, Group};

/// One row of a [`Registry`].
#[derive(Clone, Copy, Debug)]
pub struct RegistryEntry<F: 'static> {
    /// Beginning of the camera make, `"*"` for any make.
    pub make: &'static str,
    /// A tag number, or [`ext::ALL`] for any tag.
    pub tag: u32,
    pub group: Group,
    /// `None` explicitly selects no function for matching entries.
    pub function: Option<F>,
}

impl<F: Copy> RegistryEntry<F> {
    fn matches(&self, make: &str, tag: u16, group: Group) -> bool {
        (self.make == "*" || make.starts_with(self.make))
            && (self.tag == ext::ALL || self.tag == u32::from(tag))
            && self.group == group
    }
}

/// A table of functions with a fallback for entries that match no row.
#[derive(Clone, Copy, Debug)]
pub struct Registry<F: 'static> {
    entries: &'static [RegistryEntry<F>],
    default: Option<F>,
}

impl<F: Copy> Registry<F> {
    pub const fn new(entries: &'static [RegistryEntry<F>], default: Option<F>) -> Self {
        Registry { entries, default }
    }

    /// The function of the first matching row, the default if no row matches.
    pub fn find(&self, make: &str, tag: u16, group: Group) -> Option<F> {
        match self.entries.iter().find(|e| e.matches(make, tag, group)) {
            Some(entry) => entry.function,
            None => self.default,
        }
    }
}
