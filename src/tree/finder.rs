//! Lookup of nodes by tag and group.
use super::{NodeId, Tree};
use crate::tags::Group;

/// The first node below `start`, in traversal order, with the given tag and group.
pub fn find(tree: &Tree, start: NodeId, tag: u16, group: Group) -> Option<NodeId> {
    let mut stack = vec![start];
    while let Some(id) = stack.pop() {
        let node = tree.node(id);
        if node.tag == tag && node.group == group {
            return Some(id);
        }
        stack.extend(tree.children(id).into_iter().rev());
    }
    None
}

impl Tree {
    /// Find a node anywhere in the tree. See [`find`].
    pub fn find(&self, tag: u16, group: Group) -> Option<NodeId> {
        find(self, self.root(), tag, group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Node;

    #[test]
    fn finds_first_in_traversal_order() {
        let mut tree = Tree::new(Vec::new(), Node::directory(0, Group::Ifd0, true));
        let root = tree.root();

        let sub = tree.insert(Node::sub_ifd(0x8769, Group::Ifd0, Group::Exif));
        tree.add_child(root, sub);
        let exif = tree.insert(Node::directory(0x8769, Group::Exif, false));
        tree.add_child(sub, exif);
        let deep = tree.insert(Node::entry(0x9000, Group::Exif));
        tree.add_child(exif, deep);

        let next = tree.insert(Node::directory(0, Group::Ifd1, true));
        tree.add_next(root, next);
        let late = tree.insert(Node::entry(0x9000, Group::Exif));
        tree.add_child(next, late);

        assert_eq!(tree.find(0x9000, Group::Exif), Some(deep));
        assert_eq!(find(&tree, next, 0x9000, Group::Exif), Some(late));
        assert_eq!(tree.find(0x9000, Group::Gps), None);
    }
}
