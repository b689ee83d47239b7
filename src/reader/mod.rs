//! Reading a tree out of a byte buffer.
//!
//! The reader is a visitor: visiting a directory creates its entries, visiting a sub-IFD or
//! makernote creates the directories below it, and the traversal then descends into what was
//! just created. All offsets come from the file and are checked against the buffer before use.
use std::collections::HashMap;

use log::{debug, error, warn};

use crate::binary_array::ArrayCfg;
use crate::error::{TreeError, TreeResult};
use crate::factory::ComponentFactory;
use crate::makernote::MakernoteFactory;
use crate::tags::{ext, tag, ByteOrder, Group, Type};
use crate::tree::finder::find;
use crate::tree::visitor::{GoEvent, GoFlags, TreeVisitor};
use crate::tree::{Node, NodeId, NodeKind, Storage, Strip, Tree};
use crate::value::Value;

mod cycles;

use self::cycles::VisitedDirectories;

/// Sanity limits applied while reading.
#[derive(Clone, Debug)]
pub struct Limits {
    /// Directories with more entries are considered invalid and not read, the default is 256.
    pub max_directory_entries: u16,
    /// Entries with this many or more elements are skipped, the default is `0x1000_0000`.
    pub max_entry_count: u32,
    /// Directories read behind one sub-IFD entry, the default is 9.
    pub max_sub_ifds: usize,
    /// Directories read behind one sub-IFD entry in IFD1, the default is 1.
    pub max_thumbnail_sub_ifds: usize,
    /// Entries whose data lies outside the buffer by convention. They become empty `UNDEFINED`
    /// entries without an error. The default is the Sony preview image.
    pub out_of_bounds_entries: Vec<(u16, Group)>,
    /// The purpose of this is to prevent all the fields of the struct from
    /// being public, as this would make adding new fields a major version
    /// bump.
    _non_exhaustive: (),
}

impl Limits {
    /// A configuration that does not impose any limits.
    ///
    /// Counts are still bounded by what the buffer can hold.
    pub fn unlimited() -> Limits {
        Limits {
            max_directory_entries: u16::MAX,
            max_entry_count: u32::MAX,
            max_sub_ifds: usize::MAX,
            max_thumbnail_sub_ifds: usize::MAX,
            out_of_bounds_entries: Vec::new(),
            _non_exhaustive: (),
        }
    }
}

impl Default for Limits {
    fn default() -> Limits {
        Limits {
            max_directory_entries: 256,
            max_entry_count: 0x1000_0000,
            max_sub_ifds: 9,
            max_thumbnail_sub_ifds: 1,
            out_of_bounds_entries: vec![(tag::SONY_PREVIEW_IMAGE, Group::Sony1)],
            _non_exhaustive: (),
        }
    }
}

/// Byte order and offset base in effect while reading.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RwState {
    pub byte_order: ByteOrder,
    pub base_offset: usize,
}

impl RwState {
    pub fn new(byte_order: ByteOrder, base_offset: usize) -> Self {
        RwState {
            byte_order,
            base_offset,
        }
    }
}

/// Reads the components of a tree from its buffer.
pub struct Reader<'a> {
    factory: &'a dyn ComponentFactory,
    makernotes: &'a dyn MakernoteFactory,
    limits: Limits,
    orig_state: RwState,
    /// Makernote states, innermost last.
    states: Vec<RwState>,
    visited: VisitedDirectories,
    idx_seq: HashMap<Group, i32>,
    /// Binary arrays to expand once everything else is read, with the state they were read in.
    post_list: Vec<(NodeId, RwState)>,
    post_proc: bool,
    flags: GoFlags,
}

impl<'a> Reader<'a> {
    pub fn new(
        state: RwState,
        factory: &'a dyn ComponentFactory,
        makernotes: &'a dyn MakernoteFactory,
    ) -> Self {
        Reader {
            factory,
            makernotes,
            limits: Limits::default(),
            orig_state: state,
            states: Vec::new(),
            visited: VisitedDirectories::new(),
            idx_seq: HashMap::new(),
            post_list: Vec::new(),
            post_proc: false,
            flags: GoFlags::default(),
        }
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Read the whole tree below `root`, then expand the binary arrays found on the way.
    pub fn read(&mut self, tree: &mut Tree, root: NodeId) -> TreeResult<()> {
        tree.accept(root, self)?;
        self.post_process(tree)
    }

    /// Expand the binary arrays queued while reading.
    ///
    /// Each array is visited again in the byte order and offset base it was read with. An
    /// array that already has elements is left as it is.
    pub fn post_process(&mut self, tree: &mut Tree) -> TreeResult<()> {
        self.post_proc = true;
        let queued = std::mem::take(&mut self.post_list);
        for &(id, state) in &queued {
            self.states.push(state);
            let result = tree.accept(id, self);
            self.states.pop();
            result?;
        }
        self.post_list = queued;
        self.post_proc = false;
        Ok(())
    }

    fn state(&self) -> RwState {
        self.states.last().copied().unwrap_or(self.orig_state)
    }

    fn byte_order(&self) -> ByteOrder {
        self.state().byte_order
    }

    fn base_offset(&self) -> usize {
        self.state().base_offset
    }

    fn next_idx(&mut self, group: Group) -> i32 {
        let seq = self.idx_seq.entry(group).or_insert(0);
        *seq += 1;
        *seq
    }

    /// Read type, count and value of the entry at its start position.
    fn read_entry(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()> {
        let node = tree.node(id);
        let (tag, group) = (node.tag, node.group);
        let Some(start) = node.start else {
            return Ok(());
        };
        let bo = self.byte_order();
        let data = tree.data();

        let Some(raw) = start.checked_add(12).and_then(|end| data.get(start..end)) else {
            error!(
                "Entry in directory {} requests access to memory beyond the data buffer. Skipping entry.",
                group
            );
            return Ok(());
        };

        let mut tiff_type = Type::from_u16_exhaustive(bo.read_u16(&raw[2..4]).unwrap_or(0));
        if let Type::Unknown(code) = tiff_type {
            warn!(
                "Directory {}, entry {:#06x} has unknown Exif (TIFF) type {}; setting type size 1.",
                group, tag, code
            );
        }

        let count = bo.read_u32(&raw[4..8]).unwrap_or(0);
        if count >= self.limits.max_entry_count {
            error!(
                "Directory {}, entry {:#06x} has invalid size {}*{}; skipping entry.",
                group,
                tag,
                count,
                tiff_type.byte_len()
            );
            return Ok(());
        }

        let mut size = (count as usize)
            .checked_mul(tiff_type.byte_len())
            .ok_or(TreeError::ArithmeticOverflow)?;
        let offset = bo.read_u32(&raw[8..12]).unwrap_or(0);
        let mut data_start = start + 8;

        if size > 4 {
            let target = self
                .base_offset()
                .checked_add(offset as usize)
                .ok_or(TreeError::CorruptedMetadata)?;

            if target >= data.len() {
                if self.limits.out_of_bounds_entries.contains(&(tag, group)) {
                    tiff_type = Type::UNDEFINED;
                } else {
                    error!(
                        "Offset of directory {}, entry {:#06x} is out of bounds: Offset = {:#010x}; truncating the entry",
                        group, tag, offset
                    );
                }
                size = 0;
            } else if size > data.len() - target {
                error!(
                    "Upper boundary of data for directory {}, entry {:#06x} is out of bounds: Offset = {:#010x}, size = {}, exceeds buffer size by {} Bytes; truncating the entry",
                    group,
                    tag,
                    offset,
                    size,
                    size - (data.len() - target)
                );
                size = 0;
            } else {
                data_start = target;
            }
        }

        let range = data_start..data_start + size;
        let value = Value::read(tiff_type, &data[range.clone()], bo);
        let idx = self.next_idx(group);

        let node = tree.node_mut(id);
        node.idx = idx;
        if let Some(entry) = node.entry_base_mut() {
            entry.tiff_type = tiff_type;
            entry.count = value.count();
            entry.offset = offset;
            entry.storage = Storage::Shared(range);
            entry.value = Some(value);
        }

        Ok(())
    }

    /// Locate the strips or data area of a data entry using the sizes in `sizes`.
    fn set_strips(&self, tree: &mut Tree, id: NodeId, sizes: &Value) {
        let base = self.base_offset();
        let len = tree.data().len();
        let (tag, group) = (tree.node(id).tag, tree.node(id).group);
        let Some(offsets) = tree.node(id).value().cloned() else {
            return;
        };

        if offsets.count() != sizes.count() {
            warn!(
                "Directory {}, entry {:#06x}: Size and data offset entries have different number of components, ignoring them.",
                group, tag
            );
            return;
        }

        let in_bounds = |offset: u32, size: u32| -> Option<std::ops::Range<usize>> {
            let start = base.checked_add(offset as usize)?;
            let end = start.checked_add(size as usize)?;
            (end <= len).then_some(start..end)
        };

        match tree.node(id).variant() {
            crate::tree::Variant::DataEntry => {
                if offsets.count() == 0 {
                    return;
                }
                let last = offsets.count() - 1;
                let (Some(first), Some(last_offset), Some(last_size)) =
                    (offsets.to_u32(0), offsets.to_u32(last), sizes.to_u32(last))
                else {
                    return;
                };
                let total = (0..sizes.count())
                    .map(|i| sizes.to_u32(i).map(u64::from))
                    .sum::<Option<u64>>()
                    .unwrap_or(u64::MAX);

                let span = u64::from(last_offset) + u64::from(last_size);
                if span.checked_sub(u64::from(first)) != Some(total) {
                    warn!(
                        "Directory {}, entry {:#06x}: Data area is not contiguous, ignoring it.",
                        group, tag
                    );
                    return;
                }

                let Some(area) = u32::try_from(total).ok().and_then(|t| in_bounds(first, t)) else {
                    warn!(
                        "Directory {}, entry {:#06x}: Data area exceeds data buffer, ignoring it.",
                        group, tag
                    );
                    return;
                };

                let bytes = tree.data()[area.clone()].to_vec();
                let node = tree.node_mut(id);
                if let NodeKind::DataEntry(entry, data) = &mut node.kind {
                    data.data_area = Some(area);
                    if let Some(value) = entry.value.as_mut() {
                        value.set_data_area(&bytes);
                    }
                }
            }
            crate::tree::Variant::ImageEntry => {
                let mut strips = Vec::new();
                for i in 0..offsets.count() {
                    let (Some(offset), Some(size)) = (offsets.to_u32(i), sizes.to_u32(i)) else {
                        continue;
                    };
                    match in_bounds(offset, size) {
                        None => warn!(
                            "Directory {}, entry {:#06x}: Strip {} is outside of the data area; ignored.",
                            group, tag, i
                        ),
                        Some(range) if !range.is_empty() => strips.push(Strip::Shared(range)),
                        Some(_) => {}
                    }
                }
                if let NodeKind::ImageEntry(_, image) = &mut tree.node_mut(id).kind {
                    image.strips = strips;
                }
            }
            _ => {}
        }
    }

    fn read_data_entry(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()> {
        self.read_entry(tree, id)?;

        let (size_tag, size_group) = match &tree.node(id).kind {
            NodeKind::DataEntry(_, d) => (d.size_tag, d.size_group),
            NodeKind::ImageEntry(_, i) => (i.size_tag, i.size_group),
            _ => return Ok(()),
        };

        let sizes = find(tree, tree.root(), size_tag, size_group)
            .and_then(|found| tree.node(found).value())
            .cloned();
        if let Some(sizes) = sizes {
            self.set_strips(tree, id, &sizes);
        }
        Ok(())
    }

    /// Add the element described by `def` at offset `idx` of an array.
    fn add_element(
        &mut self,
        tree: &mut Tree,
        array: NodeId,
        cfg: &ArrayCfg,
        idx: usize,
        def: crate::binary_array::ArrayDef,
        len: usize,
    ) {
        let tag = (idx / cfg.tag_step()) as u16;
        let (storage, start) = {
            let node = tree.node(array);
            match node.entry_base().map(|e| &e.storage) {
                Some(Storage::Shared(range)) => {
                    let s = range.start + idx;
                    (Storage::Shared(s..s + len), Some(s))
                }
                Some(Storage::Owned(bytes)) => (Storage::Owned(bytes[idx..idx + len].to_vec()), None),
                _ => return,
            }
        };

        let mut element = Node::binary_element(tag, cfg.group, def, cfg.byte_order);
        element.start = start;
        if let Some(entry) = element.entry_base_mut() {
            entry.storage = storage;
        }
        let element = tree.insert(element);
        tree.add_child(array, element);
    }
}

impl TreeVisitor for Reader<'_> {
    fn flags(&self) -> &GoFlags {
        &self.flags
    }

    fn flags_mut(&mut self) -> &mut GoFlags {
        &mut self.flags
    }

    fn visit_entry(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()> {
        self.read_entry(tree, id)
    }

    fn visit_data_entry(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()> {
        self.read_data_entry(tree, id)
    }

    fn visit_image_entry(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()> {
        self.read_data_entry(tree, id)
    }

    fn visit_size_entry(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()> {
        self.read_entry(tree, id)?;

        let (data_tag, data_group) = match &tree.node(id).kind {
            NodeKind::SizeEntry(_, s) => (s.data_tag, s.data_group),
            _ => return Ok(()),
        };
        let Some(sizes) = tree.node(id).value().cloned() else {
            return Ok(());
        };

        let target = find(tree, tree.root(), data_tag, data_group).filter(|&found| {
            let node = tree.node(found);
            matches!(node.kind, NodeKind::DataEntry(..) | NodeKind::ImageEntry(..))
                && node.value().is_some()
        });
        if let Some(target) = target {
            self.set_strips(tree, target, &sizes);
        }
        Ok(())
    }

    fn visit_directory(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()> {
        let node = tree.node(id);
        let group = node.group;
        let Some(start) = node.start else {
            return Ok(());
        };

        if let Some(previous) = self.visited.insert(start, group) {
            error!(
                "{} pointer references previously read {} directory; ignored.",
                group, previous
            );
            return Ok(());
        }

        let bo = self.byte_order();
        let Some(count) = tree.data().get(start..).and_then(|d| bo.read_u16(d)) else {
            error!("Directory {}: IFD exceeds data buffer, cannot read entry count.", group);
            return Ok(());
        };

        if count > self.limits.max_directory_entries {
            error!(
                "Directory {} with {} entries considered invalid; not read.",
                group, count
            );
            return Ok(());
        }

        let mut p = start + 2;
        for i in 0..count {
            let Some(raw) = tree.data().get(p..p + 12) else {
                error!(
                    "Directory {}: IFD entry {} lies outside of the data buffer.",
                    group, i
                );
                return Ok(());
            };
            let tag = bo.read_u16(raw).unwrap_or(0);

            match self.factory.create(u32::from(tag), group) {
                Some(mut component) => {
                    component.start = Some(p);
                    let child = tree.insert(component);
                    tree.add_child(id, child);
                }
                None => warn!("Unable to handle tag {:#06x}.", tag),
            }
            p += 12;
        }

        let has_next = matches!(&tree.node(id).kind, NodeKind::Directory(dir) if dir.has_next);
        if !has_next {
            return Ok(());
        }

        let Some(next) = tree.data().get(p..).and_then(|d| bo.read_u32(d)) else {
            error!(
                "Directory {}: IFD exceeds data buffer, cannot read next pointer.",
                group
            );
            return Ok(());
        };
        if next == 0 {
            return Ok(());
        }

        let Some(mut component) = self.factory.create(ext::NEXT, group) else {
            warn!(
                "Directory {} has an unexpected next pointer; ignored.",
                group
            );
            return Ok(());
        };

        let target = self.base_offset().checked_add(next as usize);
        match target {
            Some(target) if target <= tree.data().len() => {
                component.start = Some(target);
                let next = tree.insert(component);
                tree.add_next(id, next);
            }
            _ => error!(
                "Directory {}: Next pointer is out of bounds; ignored.",
                group
            ),
        }

        Ok(())
    }

    fn visit_sub_ifd(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()> {
        self.read_entry(tree, id)?;

        let node = tree.node(id);
        let (tag, group) = (node.tag, node.group);
        let NodeKind::SubIfd(entry, sub) = &node.kind else {
            return Ok(());
        };
        let new_group = sub.new_group;

        let is_pointer = matches!(entry.tiff_type, Type::LONG | Type::SLONG | Type::IFD);
        if !is_pointer || entry.count < 1 || entry.value.is_none() {
            warn!(
                "Directory {}, entry {:#06x} doesn't look like a sub-IFD.",
                group, tag
            );
            return Ok(());
        }

        let max = if group == Group::Ifd1 {
            self.limits.max_thumbnail_sub_ifds
        } else {
            self.limits.max_sub_ifds
        };
        let count = entry.count;
        let bo = self.byte_order();
        let pointers = tree.entry_data(id).to_vec();

        for i in 0..count {
            let Some(offset) = pointers.get(4 * i..).and_then(|p| bo.read_u32(p)) else {
                warn!(
                    "Directory {}, entry {:#06x}: Sub-IFD pointer {} lies outside of the entry; ignoring it.",
                    group, tag, i
                );
                break;
            };

            let target = self.base_offset().checked_add(offset as usize);
            let Some(target) = target.filter(|&t| t <= tree.data().len()) else {
                error!(
                    "Directory {}, entry {:#06x} Sub-IFD pointer {} is out of bounds; ignoring it.",
                    group, tag, i
                );
                return Ok(());
            };

            if i >= max {
                warn!(
                    "Directory {}, entry {:#06x}: Skipping sub-IFDs beyond the first {}.",
                    group, tag, i
                );
                break;
            }

            let mut dir = Node::directory(tag, new_group.nth(i as u16), true);
            dir.start = Some(target);
            let dir = tree.insert(dir);
            tree.add_child(id, dir);
        }

        Ok(())
    }

    fn visit_mn_entry(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()> {
        self.read_entry(tree, id)?;

        let make = find(tree, tree.root(), tag::MAKE, Group::Ifd0)
            .and_then(|found| tree.node(found).value())
            .map(|v| v.to_string());
        let Some(make) = make else {
            return Ok(());
        };

        let node = tree.node(id);
        let (tag, mn_group) = match &node.kind {
            NodeKind::MnEntry(_, mn) => (node.tag, mn.mn_group),
            _ => return Ok(()),
        };
        let start = match node.entry_base().map(|e| &e.storage) {
            Some(Storage::Shared(range)) => range.start,
            _ => return Ok(()),
        };

        let makernote = self.makernotes.create(
            tag,
            mn_group,
            &make,
            tree.entry_data(id),
            self.byte_order(),
        );

        if let Some(mn) = makernote {
            debug!("reading {} makernote at {:#x}", mn.mn_group, start);
            if let Some(mn_id) = tree.attach_makernote(id, mn.header, mn.mn_group, mn.has_next) {
                tree.node_mut(mn_id).start = Some(start);
            }
        }
        Ok(())
    }

    fn visit_ifd_makernote(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()> {
        let bo = self.byte_order();
        let start = tree.node(id).start;

        let (mut header, ifd) = match &mut tree.node_mut(id).kind {
            NodeKind::IfdMakernote(mn) => {
                mn.image_byte_order = Some(bo);
                (mn.header.clone(), mn.ifd)
            }
            _ => return Ok(()),
        };

        let data = tree.data();
        let valid = start
            .and_then(|s| data.get(s..))
            .map_or(false, |bytes| header.read(bytes));
        let (Some(start), true) = (start, valid) else {
            error!(
                "Failed to read {} IFD Makernote header.",
                tree.node(ifd).group
            );
            self.set_go(GoEvent::KnownMakernote, false);
            return Ok(());
        };

        tree.node_mut(ifd).start = Some(start + header.ifd_offset());

        let state = RwState::new(header.byte_order().unwrap_or(bo), header.base_offset(start));
        if let NodeKind::IfdMakernote(mn) = &mut tree.node_mut(id).kind {
            mn.header = header;
            mn.mn_offset = start;
        }
        self.states.push(state);

        Ok(())
    }

    fn visit_ifd_makernote_end(&mut self, _tree: &mut Tree, _id: NodeId) -> TreeResult<()> {
        self.states.pop();
        Ok(())
    }

    fn visit_binary_array(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()> {
        if !self.post_proc {
            self.read_entry(tree, id)?;
            if let NodeKind::BinaryArray(entry, array) = &mut tree.node_mut(id).kind {
                if let Storage::Shared(range) = &entry.storage {
                    array.orig = Some(range.clone());
                }
            }
            self.post_list.push((id, self.state()));
            return Ok(());
        }

        let node = tree.node(id);
        let (tag, group, idx) = (node.tag, node.group, node.idx);
        if node.binary_array_ref().map_or(true, |a| !a.elements.is_empty()) {
            return Ok(());
        }

        if let Some(first) = find(tree, tree.root(), tag, group) {
            let first = tree.node(first);
            if first.entry_base().is_some() && first.idx != idx {
                warn!(
                    "Not decoding duplicate binary array tag {:#06x}, group {}, idx {}",
                    tag, group, idx
                );
                if let NodeKind::BinaryArray(_, array) = &mut tree.node_mut(id).kind {
                    array.decoded = false;
                }
                return Ok(());
            }
        }

        if tree.entry_data(id).is_empty() {
            return Ok(());
        }

        let (set, cfg) = match &tree.node(id).kind {
            NodeKind::BinaryArray(_, array) => (array.set, array.cfg),
            _ => return Ok(()),
        };
        let cfg = match cfg {
            Some(cfg) => Some(cfg),
            None => set.select(tag, tree.entry_data(id), tree),
        };
        let Some(cfg_index) = cfg else {
            return Ok(());
        };
        let Some(cfg) = set.layouts.get(cfg_index) else {
            return Ok(());
        };
        if let NodeKind::BinaryArray(_, array) = &mut tree.node_mut(id).kind {
            array.cfg = Some(cfg_index);
        }

        if let Some(cipher) = cfg.cipher {
            let plain = (cipher.apply)(tag, tree.entry_data(id), tree);
            if !plain.is_empty() {
                if let Some(entry) = tree.node_mut(id).entry_base_mut() {
                    entry.storage = Storage::Owned(plain);
                }
            }
        }

        let size = tree.entry_data(id).len();
        for (offset, def, len) in cfg.plan(size) {
            self.add_element(tree, id, cfg, offset, def, len);
        }

        Ok(())
    }

    fn visit_binary_element(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()> {
        let (def, element_bo) = match &tree.node(id).kind {
            NodeKind::BinaryElement(entry, element) if entry.value.is_none() => {
                (element.def, element.byte_order)
            }
            _ => return Ok(()),
        };

        let bo = element_bo.unwrap_or_else(|| self.byte_order());
        let value = Value::read(def.tiff_type, tree.entry_data(id), bo);
        let group = tree.node(id).group;
        let idx = self.next_idx(group);

        let node = tree.node_mut(id);
        node.idx = idx;
        if let Some(entry) = node.entry_base_mut() {
            entry.tiff_type = def.tiff_type;
            entry.count = value.count();
            entry.offset = 0;
            entry.value = Some(value);
        }
        Ok(())
    }
}
