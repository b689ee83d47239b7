//! Traversal of a [`Tree`] with a visitor.
use super::{NodeId, NodeKind, Tree, Variant};
use crate::error::TreeResult;

/// Events a visitor can stop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GoEvent {
    /// Continue the traversal.
    Traverse = 0,
    /// Keep the makernote that was just visited.
    KnownMakernote = 1,
}

/// The set of go flags of a visitor, all set initially.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GoFlags([bool; 2]);

impl Default for GoFlags {
    fn default() -> Self {
        GoFlags([true; 2])
    }
}

impl GoFlags {
    pub fn go(&self, event: GoEvent) -> bool {
        self.0[event as usize]
    }

    pub fn set(&mut self, event: GoEvent, go: bool) {
        self.0[event as usize] = go;
    }
}

/// Receives callbacks for each node of a tree.
///
/// Handlers get mutable access to the whole tree; they may attach new children to the node
/// they are visiting, which the traversal then descends into.
pub trait TreeVisitor {
    fn flags(&self) -> &GoFlags;
    fn flags_mut(&mut self) -> &mut GoFlags;

    fn go(&self, event: GoEvent) -> bool {
        self.flags().go(event)
    }

    fn set_go(&mut self, event: GoEvent, go: bool) {
        self.flags_mut().set(event, go)
    }

    fn visit_entry(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()>;
    fn visit_data_entry(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()>;
    fn visit_image_entry(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()>;
    fn visit_size_entry(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()>;
    fn visit_directory(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()>;

    /// Called after the entries of a directory, before its next directory.
    fn visit_directory_next(&mut self, _tree: &mut Tree, _id: NodeId) -> TreeResult<()> {
        Ok(())
    }

    fn visit_directory_end(&mut self, _tree: &mut Tree, _id: NodeId) -> TreeResult<()> {
        Ok(())
    }

    fn visit_sub_ifd(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()>;
    fn visit_mn_entry(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()>;
    fn visit_ifd_makernote(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()>;

    fn visit_ifd_makernote_end(&mut self, _tree: &mut Tree, _id: NodeId) -> TreeResult<()> {
        Ok(())
    }

    fn visit_binary_array(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()>;

    fn visit_binary_array_end(&mut self, _tree: &mut Tree, _id: NodeId) -> TreeResult<()> {
        Ok(())
    }

    fn visit_binary_element(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()>;
}

impl Tree {
    /// Walk the subtree at `id`, calling the visitor for every node.
    ///
    /// Nothing is visited while the visitor's traverse flag is cleared. A makernote whose
    /// visit cleared the known-makernote flag is detached from its entry afterwards and the
    /// flag is set again.
    pub fn accept<V: TreeVisitor + ?Sized>(&mut self, id: NodeId, visitor: &mut V) -> TreeResult<()> {
        if !visitor.go(GoEvent::Traverse) {
            return Ok(());
        }

        match self.node(id).variant() {
            Variant::Entry => visitor.visit_entry(self, id),
            Variant::DataEntry => visitor.visit_data_entry(self, id),
            Variant::ImageEntry => visitor.visit_image_entry(self, id),
            Variant::SizeEntry => visitor.visit_size_entry(self, id),
            Variant::BinaryElement => visitor.visit_binary_element(self, id),
            Variant::Directory => {
                visitor.visit_directory(self, id)?;

                let mut n = 0;
                while visitor.go(GoEvent::Traverse) {
                    let child = match &self.node(id).kind {
                        NodeKind::Directory(dir) => dir.children.get(n).copied(),
                        _ => None,
                    };
                    let Some(child) = child else { break };
                    self.accept(child, visitor)?;
                    n += 1;
                }

                if visitor.go(GoEvent::Traverse) {
                    visitor.visit_directory_next(self, id)?;
                }

                let next = match &self.node(id).kind {
                    NodeKind::Directory(dir) => dir.next,
                    _ => None,
                };
                if let Some(next) = next {
                    self.accept(next, visitor)?;
                }

                if visitor.go(GoEvent::Traverse) {
                    visitor.visit_directory_end(self, id)?;
                }
                Ok(())
            }
            Variant::SubIfd => {
                visitor.visit_sub_ifd(self, id)?;
                let mut n = 0;
                while visitor.go(GoEvent::Traverse) {
                    let ifd = match &self.node(id).kind {
                        NodeKind::SubIfd(_, sub) => sub.ifds.get(n).copied(),
                        _ => None,
                    };
                    let Some(ifd) = ifd else { break };
                    self.accept(ifd, visitor)?;
                    n += 1;
                }
                Ok(())
            }
            Variant::MnEntry => {
                visitor.visit_mn_entry(self, id)?;

                let makernote = match &self.node(id).kind {
                    NodeKind::MnEntry(_, mn) => mn.makernote,
                    _ => None,
                };
                if let Some(mn) = makernote {
                    self.accept(mn, visitor)?;
                }

                if !visitor.go(GoEvent::KnownMakernote) {
                    if let NodeKind::MnEntry(_, mn) = &mut self.node_mut(id).kind {
                        mn.makernote = None;
                    }
                    visitor.set_go(GoEvent::KnownMakernote, true);
                }
                Ok(())
            }
            Variant::IfdMakernote => {
                visitor.visit_ifd_makernote(self, id)?;

                if visitor.go(GoEvent::KnownMakernote) {
                    let ifd = match &self.node(id).kind {
                        NodeKind::IfdMakernote(mn) => mn.ifd,
                        _ => return Ok(()),
                    };
                    self.accept(ifd, visitor)?;
                }

                if visitor.go(GoEvent::KnownMakernote) && visitor.go(GoEvent::Traverse) {
                    visitor.visit_ifd_makernote_end(self, id)?;
                }
                Ok(())
            }
            Variant::BinaryArray => {
                visitor.visit_binary_array(self, id)?;

                let mut n = 0;
                loop {
                    let element = match &self.node(id).kind {
                        NodeKind::BinaryArray(_, array) => array.elements.get(n).copied(),
                        _ => None,
                    };
                    let Some(element) = element else { break };
                    self.accept(element, visitor)?;
                    n += 1;
                }

                if visitor.go(GoEvent::Traverse) {
                    visitor.visit_binary_array_end(self, id)?;
                }
                Ok(())
            }
        }
    }
}
