//! Encoding metadata into a tree.
//!
//! There are two ways to get metadata back into a tree. Non-intrusive writing visits the tree
//! that was read from a file and updates every entry from its record in place; this only
//! works while every new value fits into the space of the old one. As soon as one does not,
//! the encoder is marked dirty and stops. Intrusive writing builds a new tree: image data is
//! copied over from the old tree and every record is added at its path with [`Encoder::add`].
use log::{debug, error, trace, warn};

use crate::error::TreeResult;
use crate::factory::ComponentFactory;
use crate::makernote::MakernoteFactory;
use crate::metadata::{Datum, Key, Metadata};
use crate::packet::{set_iptc_irb, IptcParser, XmpParser};
use crate::registry::Registry;
use crate::tags::{tag, ByteOrder, Group, Type};
use crate::tree::finder::find;
use crate::tree::visitor::{GoEvent, GoFlags, TreeVisitor};
use crate::tree::{NodeId, NodeKind, Storage, Strip, Tree, Variant};
use crate::value::Value;

mod tag_filter;

pub use self::tag_filter::{ImagePolicy, ImageTagFilter, NoImageTags};

/// How a tree was brought up to date with the metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteMethod {
    /// The entries of the original tree were updated in place.
    NonIntrusive,
    /// A new tree was built.
    Intrusive,
}

/// Encodes a record into an entry, in place of the built-in handling.
pub type EncodeFn = for<'a> fn(&mut Encoder<'a>, &mut Tree, NodeId, &Datum);

/// No entries are encoded specially by default.
pub static STANDARD_ENCODER_REGISTRY: Registry<EncodeFn> = Registry::new(&[], None);

/// Writes metadata records into the entries of a tree.
///
/// The encoder works on its own copy of the records. In erase mode, the default, records are
/// removed once they were encoded, so that whatever is left afterwards has no place in the
/// tree.
pub struct Encoder<'a> {
    exif: Metadata,
    registry: &'a Registry<EncodeFn>,
    policy: &'a dyn ImagePolicy,
    primary_groups: &'a [Group],
    is_new_image: bool,
    /// Byte orders in effect, innermost last. The first is the image's.
    byte_orders: Vec<ByteOrder>,
    write_method: WriteMethod,
    source: Option<&'a Tree>,
    make: String,
    dirty: bool,
    erase: bool,
    flags: GoFlags,
}

impl<'a> Encoder<'a> {
    /// Create an encoder for the records in `exif`, to be written into `tree`.
    pub fn new(
        exif: Metadata,
        tree: Option<&Tree>,
        byte_order: ByteOrder,
        policy: &'a dyn ImagePolicy,
        registry: &'a Registry<EncodeFn>,
    ) -> Self {
        let make = exif
            .value(tag::MAKE, Group::Ifd0)
            .map(|v| v.to_string())
            .filter(|make| !make.is_empty())
            .or_else(|| {
                let tree = tree?;
                find(tree, tree.root(), tag::MAKE, Group::Ifd0)
                    .and_then(|found| tree.node(found).value())
                    .map(|v| v.to_string())
            })
            .unwrap_or_default();

        Encoder {
            exif,
            registry,
            policy,
            primary_groups: &[],
            is_new_image: false,
            byte_orders: vec![byte_order],
            write_method: WriteMethod::NonIntrusive,
            source: None,
            make,
            dirty: false,
            erase: true,
            flags: GoFlags::default(),
        }
    }

    /// Encode image tags too, the tree is for an image that does not exist yet.
    pub fn new_image(mut self, is_new_image: bool) -> Self {
        self.is_new_image = is_new_image;
        self
    }

    pub fn with_primary_groups(mut self, primary_groups: &'a [Group]) -> Self {
        self.primary_groups = primary_groups;
        self
    }

    /// Rebuild the records holding IPTC data and the XMP packet from their parsers.
    pub fn with_packets(
        mut self,
        iptc: Option<&dyn IptcParser>,
        xmp: Option<&dyn XmpParser>,
    ) -> Self {
        if let Some(iptc) = iptc {
            self.encode_iptc(iptc);
        }
        if let Some(xmp) = xmp {
            self.encode_xmp(xmp);
        }
        self
    }

    /// The records not encoded so far.
    pub fn metadata(&self) -> &Metadata {
        &self.exif
    }

    pub fn write_method(&self) -> WriteMethod {
        self.write_method
    }

    /// Whether the tree could not take the metadata in place, or records are left over.
    pub fn dirty(&self) -> bool {
        self.dirty || !self.exif.is_empty()
    }

    /// Mark the encoding as failed, which ends the traversal, or undo that.
    pub fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
        self.set_go(GoEvent::Traverse, !dirty);
    }

    /// The byte order values are written in.
    pub fn byte_order(&self) -> ByteOrder {
        self.byte_orders
            .last()
            .copied()
            .unwrap_or_else(ByteOrder::native)
    }

    /// Update the entries of `tree` from the records, in place.
    pub fn encode(&mut self, tree: &mut Tree) -> TreeResult<()> {
        let root = tree.root();
        tree.accept(root, self)
    }

    /// Update the IPTC-NAA record from `iptc`, and the IPTC block of the image resources.
    ///
    /// An IPTC-NAA record is created only if there was one before, or there are no image
    /// resources to hold the block. It is removed when there is no IPTC data.
    fn encode_iptc(&mut self, iptc: &dyn IptcParser) {
        let mut naa_key = Key::new(tag::IPTC_NAA, Group::Ifd0);
        let mut replaced = false;
        if let Some(pos) = self.exif.find_key(naa_key.tag, naa_key.group) {
            naa_key = self.exif.erase(pos).key;
            replaced = true;
        }

        let raw = iptc.encode();
        let mut irb_key = Key::new(tag::IMAGE_RESOURCES, Group::Ifd0);
        let mut irb = self.exif.find_key(irb_key.tag, irb_key.group);
        if let Some(pos) = irb {
            irb_key = self.exif.get(pos).map_or(irb_key, |d| d.key);
        }

        if !raw.is_empty() && (replaced || irb.is_none()) {
            // Stored as LONGs, the last one padded with zeros.
            let mut padded = raw.clone();
            padded.resize((raw.len() + 3) / 4 * 4, 0);
            let value = Value::read(Type::LONG, &padded, self.byte_order());
            self.exif.add(naa_key, value);
            irb = self.exif.find_key(irb_key.tag, irb_key.group);
        }

        if let Some(pos) = irb {
            let resources = self.exif.erase(pos).value.to_bytes(self.byte_order());
            let resources = set_iptc_irb(&resources, &raw);
            if !resources.is_empty() {
                self.exif
                    .add(irb_key, Value::from_bytes(Type::BYTE, &resources));
            }
        }
    }

    /// Replace the XML packet record with the packet from `xmp`.
    fn encode_xmp(&mut self, xmp: &dyn XmpParser) {
        let mut key = Key::new(tag::XML_PACKET, Group::Ifd0);
        if let Some(pos) = self.exif.find_key(key.tag, key.group) {
            key = self.exif.erase(pos).key;
        }

        let packet = match xmp.encode() {
            Ok(packet) => packet,
            Err(err) => {
                error!("Failed to encode XMP metadata: {}", err);
                return;
            }
        };
        if !packet.is_empty() {
            self.exif
                .add(key, Value::from_bytes(Type::BYTE, packet.as_bytes()));
        }
    }

    fn is_image_tag(&self, tag: u16, group: Group) -> bool {
        !self.is_new_image && self.policy.is_image_tag(tag, group, self.primary_groups)
    }

    /// Encode the record for an entry.
    ///
    /// Without `datum` the record is looked up by the entry's tag and group, preferring the
    /// record with the entry's index among duplicates. An entry without a record makes the
    /// encoding dirty since it would have to be removed.
    pub fn encode_component(&mut self, tree: &mut Tree, id: NodeId, datum: Option<&Datum>) {
        let (tag, group, idx) = {
            let node = tree.node(id);
            (node.tag(), node.group(), node.idx())
        };

        let mut pos = None;
        let record = match datum {
            Some(datum) => {
                tree.node_mut(id).idx = datum.key.idx;
                Some(datum.clone())
            }
            None => match self.exif.find_key(tag, group) {
                Some(mut found) => {
                    if self.exif.get(found).map_or(false, |d| d.key.idx != idx) {
                        let exact = self
                            .exif
                            .position(|d| d.key.group == group && d.key.idx == idx)
                            .filter(|&p| self.exif.get(p).map_or(false, |d| d.key.tag == tag));
                        if let Some(exact) = exact {
                            found = exact;
                        }
                    }
                    pos = Some(found);
                    self.exif.get(found).cloned()
                }
                None => {
                    trace!("no record for {:#06x} in {}, idx {}", tag, group, idx);
                    self.set_dirty(true);
                    None
                }
            },
        };

        if let Some(record) = &record {
            if !self.is_image_tag(tag, group) {
                match self.registry.find(&self.make, tag, group) {
                    Some(encode) => encode(self, tree, id, record),
                    None => self.encode_variant(tree, id, record),
                }
            }
        }

        if self.erase {
            if let Some(pos) = pos {
                self.exif.erase(pos);
            }
        }
    }

    fn encode_variant(&mut self, tree: &mut Tree, id: NodeId, datum: &Datum) {
        match tree.node(id).variant() {
            Variant::Entry | Variant::SizeEntry | Variant::BinaryElement => {
                self.encode_entry_base(tree, id, datum)
            }
            Variant::SubIfd | Variant::BinaryArray => self.encode_offset_entry(tree, id, datum),
            Variant::DataEntry => self.encode_data_entry(tree, id, datum),
            Variant::ImageEntry => self.encode_image_entry(tree, id, datum),
            Variant::MnEntry => {
                let has_makernote = matches!(
                    &tree.node(id).kind,
                    NodeKind::MnEntry(_, mn) if mn.makernote.is_some()
                );
                if !has_makernote {
                    self.encode_entry_base(tree, id, datum);
                }
            }
            Variant::Directory | Variant::IfdMakernote => {}
        }
    }

    fn allocated(tree: &Tree, id: NodeId) -> usize {
        tree.node(id).entry_base().map_or(0, |e| e.size())
    }

    /// Write the value into the entry, making the encoding dirty if it needs more space.
    fn encode_entry_base(&mut self, tree: &mut Tree, id: NodeId, datum: &Datum) {
        let allocated = Self::allocated(tree, id);
        if datum.value.size() > allocated {
            debug!(
                "{:#06x} in {} grew from {} to {} bytes",
                datum.key.tag,
                datum.key.group,
                allocated,
                datum.value.size()
            );
            self.set_dirty(true);
        }
        tree.update_value(id, datum.value.clone(), self.byte_order());
    }

    /// Offsets are only written when the value grew; otherwise the data stays where it is.
    fn encode_offset_entry(&mut self, tree: &mut Tree, id: NodeId, datum: &Datum) {
        if datum.value.size() > Self::allocated(tree, id) {
            self.set_dirty(true);
            tree.update_value(id, datum.value.clone(), self.byte_order());
        } else if let Some(entry) = tree.node_mut(id).entry_base_mut() {
            entry.set_value(datum.value.clone());
        }
    }

    fn encode_data_entry(&mut self, tree: &mut Tree, id: NodeId, datum: &Datum) {
        self.encode_offset_entry(tree, id, datum);

        if self.dirty || self.write_method != WriteMethod::NonIntrusive {
            return;
        }

        let area = match &tree.node(id).kind {
            NodeKind::DataEntry(_, data) => data.data_area.clone().unwrap_or(0..0),
            _ => return,
        };
        let new_area = datum.value.data_area();
        if area.len() < new_area.len() {
            debug!(
                "data area of {:#06x} in {} grew",
                datum.key.tag, datum.key.group
            );
            self.set_dirty(true);
        } else if !new_area.is_empty() {
            if let Some(target) = tree.data_range_mut(area) {
                target.fill(0);
                target[..new_area.len()].copy_from_slice(new_area);
            }
        }
    }

    fn encode_image_entry(&mut self, tree: &mut Tree, id: NodeId, datum: &Datum) {
        self.encode_offset_entry(tree, id, datum);

        let area = datum.value.data_area().len();
        let (tag, group) = (datum.key.tag, datum.key.group);
        let (size_tag, size_group) = match &tree.node(id).kind {
            NodeKind::ImageEntry(_, image) => (image.size_tag, image.size_group),
            _ => return,
        };

        let strips = match (self.write_method, area) {
            (WriteMethod::NonIntrusive, 0) => return,
            (WriteMethod::NonIntrusive, _) => {
                self.set_dirty(true);
                return;
            }
            (WriteMethod::Intrusive, 0) => {
                let Some(source) = self.source else {
                    warn!("No image data to encode {:#06x} in {}.", tag, group);
                    return;
                };
                let found = find(source, source.root(), tag, group)
                    .and_then(|found| source.node(found).image_entry_ref());
                let Some(image) = found else {
                    return;
                };
                image
                    .strips()
                    .iter()
                    .map(|strip| match strip {
                        Strip::Shared(_) => Strip::Owned(source.strip_data(strip).to_vec()),
                        other => other.clone(),
                    })
                    .collect()
            }
            (WriteMethod::Intrusive, _) => match self.exif.value(size_tag, size_group) {
                None => {
                    error!(
                        "Size tag {:#06x} in {} not found. Writing only one strip.",
                        size_tag, size_group
                    );
                    vec![Strip::Pseudo(area)]
                }
                Some(sizes) => {
                    let strips: Vec<Strip> = (0..sizes.count())
                        .map(|i| Strip::Pseudo(sizes.to_u32(i).unwrap_or(0) as usize))
                        .collect();
                    let total: usize = strips.iter().map(Strip::len).sum();
                    if total != area {
                        error!(
                            "Sum of all sizes of {:#06x} in {} != data size of {:#06x}. This results in an invalid image.",
                            size_tag, size_group, tag
                        );
                    }
                    strips
                }
            },
        };

        if let NodeKind::ImageEntry(_, image) = &mut tree.node_mut(id).kind {
            image.strips = strips;
        }
    }

    /// Add every record to `tree`, creating the entries on the way.
    ///
    /// `source` is the tree the image data is taken from, if there is one. Records of image
    /// tags are skipped unless the image is new, as are the records describing the makernote;
    /// its byte order is applied to the makernote at the end.
    pub fn add(
        &mut self,
        tree: &mut Tree,
        source: Option<&'a Tree>,
        root: u32,
        factory: &dyn ComponentFactory,
        makernotes: &dyn MakernoteFactory,
    ) -> TreeResult<()> {
        self.write_method = WriteMethod::Intrusive;
        self.source = source;
        self.erase = false;

        let records: Vec<Datum> = self.exif.iter().cloned().collect();
        let mut mn_byte_order = None;
        for datum in &records {
            let Key { tag, group, .. } = datum.key;
            if group == Group::MakerNote {
                if tag == tag::MN_BYTE_ORDER {
                    mn_byte_order = ByteOrder::from_marker(datum.value.to_string().as_bytes());
                }
                continue;
            }
            if self.is_image_tag(tag, group) {
                continue;
            }

            let Some(path) = factory.path(u32::from(tag), group, root) else {
                debug!("no path to {:#06x} in {}", tag, group);
                continue;
            };
            match tree.add_path(tag, &path, None, factory, makernotes) {
                Some(id) if tree.node(id).entry_base().is_some() => {
                    self.encode_component(tree, id, Some(datum))
                }
                _ => debug!("no entry added for {:#06x} in {}", tag, group),
            }
        }

        let Some(bo) = mn_byte_order else {
            return Ok(());
        };
        let makernote = find(tree, tree.root(), tag::MAKER_NOTE, Group::Exif).and_then(|found| {
            match &tree.node(found).kind {
                NodeKind::MnEntry(_, mn) => mn.makernote,
                _ => None,
            }
        });
        if let Some(mn) = makernote {
            if let NodeKind::IfdMakernote(mn) = &mut tree.node_mut(mn).kind {
                mn.set_byte_order(bo);
            }
        }
        Ok(())
    }

    /// Rewrite the slot of an entry in its directory: type, count, and the value itself if
    /// it fits into the offset field now.
    fn update_dir_entry(&self, tree: &mut Tree, slot: usize, id: NodeId) {
        let bo = self.byte_order();
        let Some(entry) = tree.node(id).entry_base() else {
            return;
        };
        let (tiff_type, count, storage) = (entry.tiff_type(), entry.count(), entry.storage.clone());

        let count = u32::try_from(count).unwrap_or(u32::MAX);
        let Some(raw) = tree.data_range_mut(slot..slot + 12) else {
            return;
        };
        raw[2..4].copy_from_slice(&bo.u16_bytes(tiff_type.to_u16()));
        raw[4..8].copy_from_slice(&bo.u32_bytes(count));

        let inline = slot + 8;
        let size = storage.len();
        if size > 4 || matches!(&storage, Storage::Shared(range) if range.start == inline) {
            return;
        }

        let bytes = tree.entry_data(id).to_vec();
        if let Storage::Shared(old) = &storage {
            if let Some(old) = tree.data_range_mut(old.clone()) {
                old.fill(0);
            }
        }
        if let Some(field) = tree.data_range_mut(inline..inline + 4) {
            field.fill(0);
            field[..size].copy_from_slice(&bytes);
        }
        if let Some(entry) = tree.node_mut(id).entry_base_mut() {
            entry.storage = Storage::Shared(inline..inline + size);
        }
    }
}

impl TreeVisitor for Encoder<'_> {
    fn flags(&self) -> &GoFlags {
        &self.flags
    }

    fn flags_mut(&mut self) -> &mut GoFlags {
        &mut self.flags
    }

    fn visit_entry(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()> {
        self.encode_component(tree, id, None);
        Ok(())
    }

    fn visit_data_entry(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()> {
        self.encode_component(tree, id, None);
        Ok(())
    }

    fn visit_image_entry(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()> {
        self.encode_component(tree, id, None);
        Ok(())
    }

    fn visit_size_entry(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()> {
        self.encode_component(tree, id, None);
        Ok(())
    }

    fn visit_directory(&mut self, _tree: &mut Tree, _id: NodeId) -> TreeResult<()> {
        Ok(())
    }

    fn visit_directory_next(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()> {
        let children = match &tree.node(id).kind {
            NodeKind::Directory(dir) => dir.children.clone(),
            _ => return Ok(()),
        };

        for child in children {
            if let Some(slot) = tree.node(child).start() {
                self.update_dir_entry(tree, slot, child);
            }
        }
        Ok(())
    }

    fn visit_sub_ifd(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()> {
        self.encode_component(tree, id, None);
        Ok(())
    }

    fn visit_mn_entry(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()> {
        let node = tree.node(id);
        let has_makernote = matches!(&node.kind, NodeKind::MnEntry(_, mn) if mn.makernote.is_some());

        if !has_makernote {
            self.encode_component(tree, id, None);
        } else if self.erase {
            // The makernote's entries replace the raw record.
            if let Some(pos) = self.exif.find_key(node.tag(), node.group()) {
                self.exif.erase(pos);
            }
        }
        Ok(())
    }

    fn visit_ifd_makernote(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()> {
        if let Some(pos) = self.exif.find_key(tag::MN_BYTE_ORDER, Group::MakerNote) {
            let bo = self
                .exif
                .get(pos)
                .and_then(|d| ByteOrder::from_marker(d.value.to_string().as_bytes()));
            if let (Some(bo), NodeKind::IfdMakernote(mn)) = (bo, &mut tree.node_mut(id).kind) {
                if mn.byte_order() != Some(bo) {
                    mn.set_byte_order(bo);
                    self.set_dirty(true);
                }
            }
            if self.erase {
                self.exif.erase(pos);
            }
        }

        if self.erase {
            if let Some(pos) = self.exif.find_key(tag::MN_OFFSET, Group::MakerNote) {
                self.exif.erase(pos);
            }
        }

        let bo = tree
            .node(id)
            .makernote()
            .and_then(|mn| mn.byte_order())
            .unwrap_or_else(|| self.byte_order());
        self.byte_orders.push(bo);
        Ok(())
    }

    fn visit_ifd_makernote_end(&mut self, _tree: &mut Tree, _id: NodeId) -> TreeResult<()> {
        if self.byte_orders.len() > 1 {
            self.byte_orders.pop();
        }
        Ok(())
    }

    fn visit_binary_array(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()> {
        let expanded = tree
            .node(id)
            .binary_array_ref()
            .map_or(false, |array| array.cfg().is_some() && array.decoded());
        if !expanded {
            self.encode_component(tree, id, None);
        }
        Ok(())
    }

    /// Put the elements of an enciphered array back together and encipher them into the
    /// array's original bytes.
    fn visit_binary_array_end(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()> {
        let tag = tree.node(id).tag();
        let Some(array) = tree.node(id).binary_array_ref() else {
            return Ok(());
        };
        let (Some(cfg), true) = (array.cfg(), array.decoded()) else {
            return Ok(());
        };
        let Some(cipher) = cfg.cipher else {
            return Ok(());
        };
        let elements = array.elements.clone();
        let orig = array.orig.clone();

        let mut plain = tree.entry_data(id).to_vec();
        if plain.is_empty() {
            return Ok(());
        }
        for element in elements {
            let Some(def) = tree.node(element).binary_element_ref().map(|e| *e.def()) else {
                continue;
            };
            let end = (def.idx + def.size()).min(plain.len());
            let bytes = tree.entry_data(element);
            if let Some(slot) = plain.get_mut(def.idx..end) {
                slot.fill(0);
                let len = bytes.len().min(slot.len());
                slot[..len].copy_from_slice(&bytes[..len]);
            }
        }

        let enciphered = (cipher.for_writing())(tag, &plain, tree);
        let bytes = if enciphered.is_empty() { &plain } else { &enciphered };

        match orig.filter(|range| range.len() == bytes.len()) {
            Some(range) => {
                if let Some(target) = tree.data_range_mut(range) {
                    target.copy_from_slice(bytes);
                }
                if let Some(entry) = tree.node_mut(id).entry_base_mut() {
                    entry.storage = Storage::Owned(plain);
                }
            }
            None => self.set_dirty(true),
        }
        Ok(())
    }

    fn visit_binary_element(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()> {
        let own = tree
            .node(id)
            .binary_element_ref()
            .and_then(|element| element.byte_order());
        if let Some(bo) = own {
            self.byte_orders.push(bo);
        }
        self.encode_component(tree, id, None);
        if own.is_some() {
            self.byte_orders.pop();
        }
        Ok(())
    }
}
