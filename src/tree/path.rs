//! Building trees by materializing paths.
use log::debug;

use super::{Node, NodeId, NodeKind, Tree, Variant};
use crate::factory::ComponentFactory;
use crate::makernote::MakernoteFactory;
use crate::tags::{ext, tag, Group};

/// One step of the path from the root to an entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PathItem {
    pub ext_tag: u32,
    pub group: Group,
}

impl PathItem {
    pub fn new(ext_tag: u32, group: Group) -> Self {
        PathItem { ext_tag, group }
    }
}

impl Tree {
    /// Make sure every component on `path` exists, creating missing ones with the factories.
    ///
    /// `path` starts with the item of the root. If `object` is given it is attached as the
    /// final component instead of a newly created one. Returns the final component.
    pub fn add_path(
        &mut self,
        tag: u16,
        path: &[PathItem],
        object: Option<NodeId>,
        factory: &dyn ComponentFactory,
        makernotes: &dyn MakernoteFactory,
    ) -> Option<NodeId> {
        let root = self.root();
        self.add_path_at(root, tag, path, object, factory, makernotes)
    }

    fn add_path_at(
        &mut self,
        id: NodeId,
        tag: u16,
        path: &[PathItem],
        object: Option<NodeId>,
        factory: &dyn ComponentFactory,
        makernotes: &dyn MakernoteFactory,
    ) -> Option<NodeId> {
        match self.node(id).variant() {
            Variant::Directory => {
                let rest = path.get(1..)?;
                let item = *rest.first()?;

                let mut child = None;
                let is_makernote = item.ext_tag == u32::from(tag::MAKER_NOTE) && item.group == Group::Exif;
                if rest.len() > 1 || is_makernote {
                    if let NodeKind::Directory(dir) = &self.node(id).kind {
                        child = if item.ext_tag == ext::NEXT {
                            dir.next
                        } else {
                            dir.children.iter().copied().find(|&c| {
                                let n = self.node(c);
                                u32::from(n.tag) == item.ext_tag && n.group == item.group
                            })
                        };
                    }
                }

                let child = match child {
                    Some(child) => child,
                    None => {
                        let created = match object {
                            Some(object) if rest.len() == 1 => object,
                            _ => self.insert(factory.create(item.ext_tag, item.group)?),
                        };
                        // A sub-IFD is only useful with a directory below it.
                        if rest.len() == 1 && self.node(created).variant() == Variant::SubIfd {
                            debug!("not adding sub-IFD {:#06x} without children", item.ext_tag);
                            return None;
                        }
                        if item.ext_tag == ext::NEXT {
                            self.add_next(id, created)?
                        } else {
                            self.add_child(id, created)?
                        }
                    }
                };

                self.add_path_at(child, tag, rest, object, factory, makernotes)
            }
            Variant::SubIfd => {
                let own = *path.first()?;
                let Some(item) = path.get(1).copied() else {
                    return Some(id);
                };

                let existing = match &self.node(id).kind {
                    NodeKind::SubIfd(_, sub) => sub
                        .ifds
                        .iter()
                        .copied()
                        .find(|&d| self.node(d).group == item.group),
                    _ => None,
                };

                let dir = match existing {
                    Some(dir) => dir,
                    None => {
                        let created = self.insert(Node::directory(own.ext_tag as u16, item.group, true));
                        self.add_child(id, created)?
                    }
                };

                self.add_path_at(dir, tag, path, object, factory, makernotes)
            }
            Variant::MnEntry => {
                let own = *path.first()?;
                let Some(item) = path.get(1).copied() else {
                    return Some(id);
                };

                let existing = match &self.node(id).kind {
                    NodeKind::MnEntry(_, mn) => mn.makernote,
                    _ => None,
                };

                let makernote = match existing {
                    Some(mn) => mn,
                    None => {
                        if let NodeKind::MnEntry(_, mn) = &mut self.node_mut(id).kind {
                            mn.mn_group = item.group;
                        }
                        let mn = makernotes.create_for_group(own.ext_tag as u16, own.group, item.group)?;
                        self.attach_makernote(id, mn.header, mn.mn_group, mn.has_next)?
                    }
                };

                self.add_path_at(makernote, tag, path, object, factory, makernotes)
            }
            Variant::IfdMakernote => {
                let ifd = match &self.node(id).kind {
                    NodeKind::IfdMakernote(mn) => mn.ifd,
                    _ => return None,
                };
                self.add_path_at(ifd, tag, path, object, factory, makernotes)
            }
            Variant::BinaryArray => {
                let rest = path.get(1..).filter(|rest| !rest.is_empty());
                let Some(rest) = rest else {
                    return Some(id);
                };
                let item = rest[0];

                if let NodeKind::BinaryArray(_, array) = &mut self.node_mut(id).kind {
                    if array.cfg.is_none() {
                        array.cfg = array.set.position_for_group(item.group);
                    }
                }

                let mut child = None;
                if rest.len() > 1 {
                    if let NodeKind::BinaryArray(_, array) = &self.node(id).kind {
                        child = array.elements.iter().copied().find(|&e| {
                            let n = self.node(e);
                            u32::from(n.tag) == item.ext_tag && n.group == item.group
                        });
                    }
                }

                let child = match child {
                    Some(child) => child,
                    None => {
                        let created = match object {
                            Some(object) if rest.len() == 1 => object,
                            _ => {
                                let mut node = factory.create(item.ext_tag, item.group)?;
                                self.place_element(id, &mut node);
                                self.insert(node)
                            }
                        };
                        self.add_child(id, created)?
                    }
                };

                self.add_path_at(child, tag, rest, object, factory, makernotes)
            }
            Variant::Entry
            | Variant::DataEntry
            | Variant::ImageEntry
            | Variant::SizeEntry
            | Variant::BinaryElement => Some(id),
        }
    }

    /// Give a new element the definition its array's layout has for its position.
    fn place_element(&self, array: NodeId, node: &mut Node) {
        let Some(cfg) = self.node(array).binary_array_ref().and_then(|a| a.cfg()) else {
            return;
        };
        if let NodeKind::BinaryElement(base, element) = &mut node.kind {
            element.def = cfg.def_at(usize::from(node.tag) * cfg.tag_step());
            element.byte_order = cfg.byte_order;
            base.tiff_type = element.def.tiff_type;
        }
    }
}
