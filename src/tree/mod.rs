//! The component tree of a TIFF structure.
//!
//! All nodes live in an arena owned by [`Tree`] together with the buffer they were read from.
//! Entries refer to their bytes by range into that buffer until they are given a value that no
//! longer fits, at which point they own their bytes.
use std::ops::Range;

use crate::binary_array::{ArrayDef, ArraySet};
use crate::makernote::MnHeader;
use crate::tags::{ByteOrder, Group, Type};
use crate::value::Value;

pub mod copier;
pub mod finder;
mod path;
pub mod visitor;

pub use self::path::PathItem;

/// Index of a node in its [`Tree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Where the bytes of an entry live.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Storage {
    #[default]
    Empty,
    /// A range of the tree's buffer.
    Shared(Range<usize>),
    Owned(Vec<u8>),
}

impl Storage {
    pub fn len(&self) -> usize {
        match self {
            Storage::Empty => 0,
            Storage::Shared(range) => range.len(),
            Storage::Owned(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One strip or tile of image data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Strip {
    Shared(Range<usize>),
    Owned(Vec<u8>),
    /// Only the size is known; the data is taken from elsewhere when writing.
    Pseudo(usize),
}

impl Strip {
    pub fn len(&self) -> usize {
        match self {
            Strip::Shared(range) => range.len(),
            Strip::Owned(bytes) => bytes.len(),
            Strip::Pseudo(len) => *len,
        }
    }
}

/// State shared by all entry-based nodes.
#[derive(Clone, Debug)]
pub struct EntryBase {
    pub(crate) tiff_type: Type,
    pub(crate) count: usize,
    /// The raw value of the offset field as read.
    pub(crate) offset: u32,
    pub(crate) storage: Storage,
    pub(crate) value: Option<Value>,
}

impl EntryBase {
    fn new(tiff_type: Type) -> Self {
        EntryBase {
            tiff_type,
            count: 0,
            offset: 0,
            storage: Storage::Empty,
            value: None,
        }
    }

    pub fn tiff_type(&self) -> Type {
        self.tiff_type
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Number of bytes of the entry's data.
    pub fn size(&self) -> usize {
        self.storage.len()
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Set type, count and value without touching the stored bytes.
    pub(crate) fn set_value(&mut self, value: Value) {
        self.tiff_type = value.data_type();
        self.count = value.count();
        self.value = Some(value);
    }
}

/// An entry whose value is an offset to a single data area, e.g. an embedded thumbnail.
#[derive(Clone, Debug)]
pub struct DataEntry {
    pub(crate) size_tag: u16,
    pub(crate) size_group: Group,
    pub(crate) data_area: Option<Range<usize>>,
}

/// An entry whose values are offsets to strips or tiles of image data.
#[derive(Clone, Debug)]
pub struct ImageEntry {
    pub(crate) size_tag: u16,
    pub(crate) size_group: Group,
    pub(crate) strips: Vec<Strip>,
}

/// An entry holding the sizes that belong to a [`DataEntry`] or [`ImageEntry`].
#[derive(Clone, Debug)]
pub struct SizeEntry {
    pub(crate) data_tag: u16,
    pub(crate) data_group: Group,
}

#[derive(Clone, Debug, Default)]
pub struct Directory {
    pub(crate) children: Vec<NodeId>,
    pub(crate) next: Option<NodeId>,
    pub(crate) has_next: bool,
}

/// An entry pointing at one or more directories.
#[derive(Clone, Debug)]
pub struct SubIfd {
    pub(crate) new_group: Group,
    pub(crate) ifds: Vec<NodeId>,
}

/// The MakerNote entry.
#[derive(Clone, Debug)]
pub struct MnEntry {
    pub(crate) mn_group: Group,
    pub(crate) makernote: Option<NodeId>,
}

/// A vendor makernote: optional header followed by a directory.
#[derive(Clone, Debug)]
pub struct IfdMakernote {
    pub(crate) header: MnHeader,
    pub(crate) ifd: NodeId,
    pub(crate) image_byte_order: Option<ByteOrder>,
    pub(crate) mn_offset: usize,
}

impl IfdMakernote {
    /// The byte order of the makernote: its header's, else that of the image around it.
    pub fn byte_order(&self) -> Option<ByteOrder> {
        self.header.byte_order().or(self.image_byte_order)
    }

    pub fn set_byte_order(&mut self, byte_order: ByteOrder) {
        self.header.set_byte_order(byte_order)
    }

    pub fn header(&self) -> &MnHeader {
        &self.header
    }

    pub fn mn_offset(&self) -> usize {
        self.mn_offset
    }
}

/// An entry whose bytes are an array of values, each decoded as its own element.
#[derive(Clone, Debug)]
pub struct BinaryArray {
    pub(crate) set: &'static ArraySet,
    pub(crate) cfg: Option<usize>,
    pub(crate) elements: Vec<NodeId>,
    pub(crate) decoded: bool,
    /// The enciphered bytes as read, overwritten in place when the array is written back.
    pub(crate) orig: Option<Range<usize>>,
}

impl BinaryArray {
    pub fn decoded(&self) -> bool {
        self.decoded
    }

    pub fn cfg(&self) -> Option<&'static crate::binary_array::ArrayCfg> {
        self.cfg.and_then(|n| self.set.layouts.get(n))
    }
}

/// One element of a [`BinaryArray`].
#[derive(Clone, Debug)]
pub struct BinaryElement {
    pub(crate) def: ArrayDef,
    pub(crate) byte_order: Option<ByteOrder>,
}

impl BinaryElement {
    pub fn def(&self) -> &ArrayDef {
        &self.def
    }

    /// Byte order of the element if it does not follow its surroundings.
    pub fn byte_order(&self) -> Option<ByteOrder> {
        self.byte_order
    }
}

#[derive(Clone, Debug)]
pub enum NodeKind {
    Entry(EntryBase),
    DataEntry(EntryBase, DataEntry),
    ImageEntry(EntryBase, ImageEntry),
    SizeEntry(EntryBase, SizeEntry),
    Directory(Directory),
    SubIfd(EntryBase, SubIfd),
    MnEntry(EntryBase, MnEntry),
    IfdMakernote(IfdMakernote),
    BinaryArray(EntryBase, BinaryArray),
    BinaryElement(EntryBase, BinaryElement),
}

/// The variant of a node without its payload, used to dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Variant {
    Entry,
    DataEntry,
    ImageEntry,
    SizeEntry,
    Directory,
    SubIfd,
    MnEntry,
    IfdMakernote,
    BinaryArray,
    BinaryElement,
}

#[derive(Clone, Debug)]
pub struct Node {
    pub(crate) tag: u16,
    pub(crate) group: Group,
    pub(crate) idx: i32,
    /// Position in the tree's buffer this node was read from.
    pub(crate) start: Option<usize>,
    pub(crate) kind: NodeKind,
}

impl Node {
    fn new(tag: u16, group: Group, kind: NodeKind) -> Self {
        Node {
            tag,
            group,
            idx: 0,
            start: None,
            kind,
        }
    }

    pub fn entry(tag: u16, group: Group) -> Self {
        Node::new(tag, group, NodeKind::Entry(EntryBase::new(Type::UNDEFINED)))
    }

    pub fn data_entry(tag: u16, group: Group, size_tag: u16, size_group: Group) -> Self {
        let data = DataEntry {
            size_tag,
            size_group,
            data_area: None,
        };
        Node::new(tag, group, NodeKind::DataEntry(EntryBase::new(Type::LONG), data))
    }

    pub fn image_entry(tag: u16, group: Group, size_tag: u16, size_group: Group) -> Self {
        let image = ImageEntry {
            size_tag,
            size_group,
            strips: Vec::new(),
        };
        Node::new(tag, group, NodeKind::ImageEntry(EntryBase::new(Type::LONG), image))
    }

    pub fn size_entry(tag: u16, group: Group, data_tag: u16, data_group: Group) -> Self {
        let size = SizeEntry {
            data_tag,
            data_group,
        };
        Node::new(tag, group, NodeKind::SizeEntry(EntryBase::new(Type::LONG), size))
    }

    pub fn directory(tag: u16, group: Group, has_next: bool) -> Self {
        let dir = Directory {
            has_next,
            ..Directory::default()
        };
        Node::new(tag, group, NodeKind::Directory(dir))
    }

    pub fn sub_ifd(tag: u16, group: Group, new_group: Group) -> Self {
        let sub = SubIfd {
            new_group,
            ifds: Vec::new(),
        };
        Node::new(tag, group, NodeKind::SubIfd(EntryBase::new(Type::LONG), sub))
    }

    pub fn mn_entry(tag: u16, group: Group, mn_group: Group) -> Self {
        let mn = MnEntry {
            mn_group,
            makernote: None,
        };
        Node::new(tag, group, NodeKind::MnEntry(EntryBase::new(Type::UNDEFINED), mn))
    }

    pub fn binary_array(tag: u16, group: Group, set: &'static ArraySet) -> Self {
        let array = BinaryArray {
            set,
            cfg: None,
            elements: Vec::new(),
            decoded: false,
            orig: None,
        };
        let ty = set
            .layouts
            .first()
            .map_or(Type::UNDEFINED, |cfg| cfg.el_tiff_type);
        Node::new(tag, group, NodeKind::BinaryArray(EntryBase::new(ty), array))
    }

    pub fn binary_element(tag: u16, group: Group, def: ArrayDef, bo: Option<ByteOrder>) -> Self {
        let element = BinaryElement {
            def,
            byte_order: bo,
        };
        Node::new(
            tag,
            group,
            NodeKind::BinaryElement(EntryBase::new(def.tiff_type), element),
        )
    }

    pub fn tag(&self) -> u16 {
        self.tag
    }

    pub fn group(&self) -> Group {
        self.group
    }

    pub fn idx(&self) -> i32 {
        self.idx
    }

    /// Place the node at `start` in the buffer, for the reader to read it from there.
    pub fn with_start(mut self, start: usize) -> Self {
        self.start = Some(start);
        self
    }

    pub fn start(&self) -> Option<usize> {
        self.start
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn variant(&self) -> Variant {
        match self.kind {
            NodeKind::Entry(..) => Variant::Entry,
            NodeKind::DataEntry(..) => Variant::DataEntry,
            NodeKind::ImageEntry(..) => Variant::ImageEntry,
            NodeKind::SizeEntry(..) => Variant::SizeEntry,
            NodeKind::Directory(..) => Variant::Directory,
            NodeKind::SubIfd(..) => Variant::SubIfd,
            NodeKind::MnEntry(..) => Variant::MnEntry,
            NodeKind::IfdMakernote(..) => Variant::IfdMakernote,
            NodeKind::BinaryArray(..) => Variant::BinaryArray,
            NodeKind::BinaryElement(..) => Variant::BinaryElement,
        }
    }

    /// The entry state, for every variant that is an entry.
    pub fn entry_base(&self) -> Option<&EntryBase> {
        match &self.kind {
            NodeKind::Entry(e)
            | NodeKind::DataEntry(e, _)
            | NodeKind::ImageEntry(e, _)
            | NodeKind::SizeEntry(e, _)
            | NodeKind::SubIfd(e, _)
            | NodeKind::MnEntry(e, _)
            | NodeKind::BinaryArray(e, _)
            | NodeKind::BinaryElement(e, _) => Some(e),
            NodeKind::Directory(_) | NodeKind::IfdMakernote(_) => None,
        }
    }

    pub fn entry_base_mut(&mut self) -> Option<&mut EntryBase> {
        match &mut self.kind {
            NodeKind::Entry(e)
            | NodeKind::DataEntry(e, _)
            | NodeKind::ImageEntry(e, _)
            | NodeKind::SizeEntry(e, _)
            | NodeKind::SubIfd(e, _)
            | NodeKind::MnEntry(e, _)
            | NodeKind::BinaryArray(e, _)
            | NodeKind::BinaryElement(e, _) => Some(e),
            NodeKind::Directory(_) | NodeKind::IfdMakernote(_) => None,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        self.entry_base().and_then(EntryBase::value)
    }

    pub fn directory_ref(&self) -> Option<&Directory> {
        match &self.kind {
            NodeKind::Directory(dir) => Some(dir),
            _ => None,
        }
    }

    pub fn makernote(&self) -> Option<&IfdMakernote> {
        match &self.kind {
            NodeKind::IfdMakernote(mn) => Some(mn),
            _ => None,
        }
    }

    pub fn binary_array_ref(&self) -> Option<&BinaryArray> {
        match &self.kind {
            NodeKind::BinaryArray(_, array) => Some(array),
            _ => None,
        }
    }

    pub fn image_entry_ref(&self) -> Option<&ImageEntry> {
        match &self.kind {
            NodeKind::ImageEntry(_, image) => Some(image),
            _ => None,
        }
    }

    pub fn binary_element_ref(&self) -> Option<&BinaryElement> {
        match &self.kind {
            NodeKind::BinaryElement(_, element) => Some(element),
            _ => None,
        }
    }
}

impl ImageEntry {
    pub fn strips(&self) -> &[Strip] {
        &self.strips
    }
}

/// An arena of nodes and the buffer they were read from.
#[derive(Clone, Debug)]
pub struct Tree {
    data: Vec<u8>,
    nodes: Vec<Node>,
    root: NodeId,
}

impl Tree {
    /// Create a tree whose root is `root`, reading from `data`.
    pub fn new(data: Vec<u8>, root: Node) -> Self {
        Tree {
            data,
            nodes: vec![root],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    /// Put a detached node into the arena.
    pub fn insert(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Attach `child` below `parent`, if `parent` has children at all.
    ///
    /// Directories and arrays collect children, a sub-IFD collects directories and a
    /// MakerNote entry holds at most one makernote, replacing a previous one.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Option<NodeId> {
        match &mut self.node_mut(parent).kind {
            NodeKind::Directory(dir) => dir.children.push(child),
            NodeKind::SubIfd(_, sub) => sub.ifds.push(child),
            NodeKind::MnEntry(_, mn) => mn.makernote = Some(child),
            NodeKind::BinaryArray(_, array) => {
                array.elements.push(child);
                array.decoded = true;
            }
            _ => return None,
        }
        Some(child)
    }

    /// Set the next directory of a directory.
    pub fn add_next(&mut self, dir: NodeId, next: NodeId) -> Option<NodeId> {
        match &mut self.node_mut(dir).kind {
            NodeKind::Directory(d) if d.has_next => {
                d.next = Some(next);
                Some(next)
            }
            _ => None,
        }
    }

    /// The direct successors of a node, in traversal order.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        match &self.node(id).kind {
            NodeKind::Directory(dir) => dir.children.iter().copied().chain(dir.next).collect(),
            NodeKind::SubIfd(_, sub) => sub.ifds.clone(),
            NodeKind::MnEntry(_, mn) => mn.makernote.into_iter().collect(),
            NodeKind::IfdMakernote(mn) => vec![mn.ifd],
            NodeKind::BinaryArray(_, array) => array.elements.clone(),
            _ => Vec::new(),
        }
    }

    /// All nodes reachable from `id`, in pre-order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).into_iter().rev());
        }
        out
    }

    /// The bytes of an entry.
    pub fn entry_data(&self, id: NodeId) -> &[u8] {
        match self.node(id).entry_base().map(|e| &e.storage) {
            Some(Storage::Shared(range)) => self.data.get(range.clone()).unwrap_or(&[]),
            Some(Storage::Owned(bytes)) => bytes,
            Some(Storage::Empty) | None => &[],
        }
    }

    /// The bytes of a strip, if it carries any.
    pub fn strip_data<'t>(&'t self, strip: &'t Strip) -> &'t [u8] {
        match strip {
            Strip::Shared(range) => self.data.get(range.clone()).unwrap_or(&[]),
            Strip::Owned(bytes) => bytes,
            Strip::Pseudo(_) => &[],
        }
    }

    pub(crate) fn data_range_mut(&mut self, range: Range<usize>) -> Option<&mut [u8]> {
        self.data.get_mut(range)
    }

    /// Store `value` in an entry, converted to `byte_order`.
    ///
    /// The bytes are written over the current ones when they fit, the remainder zeroed;
    /// otherwise the entry gets its own buffer. Type and count follow the value.
    pub fn update_value(&mut self, id: NodeId, value: Value, byte_order: ByteOrder) {
        let bytes = value.to_bytes(byte_order);
        let storage = match self.node(id).entry_base() {
            Some(entry) => entry.storage.clone(),
            None => return,
        };

        let storage = match storage {
            Storage::Shared(range) if bytes.len() <= range.len() => {
                if let Some(target) = self.data.get_mut(range.clone()) {
                    target.fill(0);
                    target[..bytes.len()].copy_from_slice(&bytes);
                }
                Storage::Shared(range.start..range.start + bytes.len())
            }
            Storage::Shared(range) => {
                if let Some(old) = self.data.get_mut(range) {
                    old.fill(0);
                }
                Storage::Owned(bytes)
            }
            Storage::Empty | Storage::Owned(_) => Storage::Owned(bytes),
        };

        if let Some(entry) = self.node_mut(id).entry_base_mut() {
            entry.storage = storage;
            entry.set_value(value);
        }
    }

    /// Copy the node `id` and everything below it into `dest`, returning the new root.
    ///
    /// Shared bytes become owned by the copy, so it no longer depends on this tree's buffer.
    pub fn clone_into(&self, id: NodeId, dest: &mut Tree) -> NodeId {
        let mut node = self.node(id).clone();
        node.start = None;

        if let Some(entry) = node.entry_base_mut() {
            if let Storage::Shared(_) = entry.storage {
                entry.storage = Storage::Owned(self.entry_data(id).to_vec());
            }
        }

        match &mut node.kind {
            NodeKind::DataEntry(_, data) => data.data_area = None,
            NodeKind::ImageEntry(_, image) => {
                for strip in &mut image.strips {
                    if let Strip::Shared(_) = strip {
                        *strip = Strip::Owned(self.strip_data(strip).to_vec());
                    }
                }
            }
            NodeKind::BinaryArray(_, array) => array.orig = None,
            _ => {}
        }

        // Children are re-attached below with their new ids.
        match &mut node.kind {
            NodeKind::Directory(dir) => {
                dir.children.clear();
                dir.next = None;
            }
            NodeKind::SubIfd(_, sub) => sub.ifds.clear(),
            NodeKind::MnEntry(_, mn) => mn.makernote = None,
            NodeKind::BinaryArray(_, array) => array.elements.clear(),
            _ => {}
        }

        let decoded = node.binary_array_ref().map(|a| a.decoded);
        let new_id = dest.insert(node);

        match &self.node(id).kind {
            NodeKind::Directory(dir) => {
                for &child in &dir.children {
                    let c = self.clone_into(child, dest);
                    dest.add_child(new_id, c);
                }
                if let Some(next) = dir.next {
                    let n = self.clone_into(next, dest);
                    dest.add_next(new_id, n);
                }
            }
            NodeKind::IfdMakernote(mn) => {
                let ifd = self.clone_into(mn.ifd, dest);
                if let NodeKind::IfdMakernote(copy) = &mut dest.node_mut(new_id).kind {
                    copy.ifd = ifd;
                }
            }
            _ => {
                for child in self.children(id) {
                    let c = self.clone_into(child, dest);
                    dest.add_child(new_id, c);
                }
            }
        }

        if let (Some(decoded), NodeKind::BinaryArray(_, array)) =
            (decoded, &mut dest.node_mut(new_id).kind)
        {
            array.decoded = decoded;
        }

        new_id
    }

    /// Create the directory and makernote node for a makernote below `mn_entry`.
    pub(crate) fn attach_makernote(
        &mut self,
        mn_entry: NodeId,
        header: MnHeader,
        mn_group: Group,
        has_next: bool,
    ) -> Option<NodeId> {
        let (tag, group) = {
            let node = self.node(mn_entry);
            (node.tag, node.group)
        };

        let ifd = self.insert(Node::directory(tag, mn_group, has_next));
        let mn = self.insert(Node::new(
            tag,
            group,
            NodeKind::IfdMakernote(IfdMakernote {
                header,
                ifd,
                image_byte_order: None,
                mn_offset: 0,
            }),
        ));

        self.add_child(mn_entry, mn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_tree() -> (Tree, NodeId) {
        let mut tree = Tree::new(vec![1, 2, 3, 4, 5, 6], Node::directory(0, Group::Ifd0, true));
        let root = tree.root();
        let entry = tree.insert(Node::entry(0x0100, Group::Ifd0));
        tree.add_child(root, entry);
        if let Some(e) = tree.node_mut(entry).entry_base_mut() {
            e.storage = Storage::Shared(2..6);
        }
        (tree, entry)
    }

    #[test]
    fn update_in_place_zeroes_remainder() {
        let (mut tree, entry) = small_tree();
        tree.update_value(entry, Value::from_u16s(&[0x0a0b]), ByteOrder::BigEndian);

        assert_eq!(tree.data(), &[1, 2, 0x0a, 0x0b, 0, 0]);
        assert_eq!(tree.entry_data(entry), &[0x0a, 0x0b]);
        let base = tree.node(entry).entry_base().expect("entry");
        assert_eq!(base.tiff_type(), Type::SHORT);
        assert_eq!(base.count(), 1);
    }

    #[test]
    fn update_that_grows_owns_its_bytes() {
        let (mut tree, entry) = small_tree();
        tree.update_value(entry, Value::from_u32s(&[1, 2]), ByteOrder::LittleEndian);

        assert_eq!(tree.data(), &[1, 2, 0, 0, 0, 0]);
        assert_eq!(tree.entry_data(entry), &[1, 0, 0, 0, 2, 0, 0, 0]);
    }

    #[test]
    fn clone_detaches_from_buffer() {
        let (tree, entry) = small_tree();
        let mut dest = Tree::new(Vec::new(), Node::directory(0, Group::Ifd0, true));
        let copy = tree.clone_into(tree.root(), &mut dest);

        let children = dest.children(copy);
        assert_eq!(children.len(), 1);
        assert_eq!(dest.entry_data(children[0]), tree.entry_data(entry));
    }

    #[test]
    fn only_containers_take_children() {
        let (mut tree, entry) = small_tree();
        let other = tree.insert(Node::entry(1, Group::Ifd0));
        assert_eq!(tree.add_child(entry, other), None);
    }
}
