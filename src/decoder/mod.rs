//! Decoding a tree into flat metadata.
//!
//! The [`Decoder`] walks a tree that was read before and turns every entry with a value into
//! a [`Metadata`] record. Which function handles an entry is looked up in a [`Registry`] by
//! camera make, tag and group, so that single entries can be decoded specially: the XMP
//! packet and IPTC blocks are handed to their parsers, the Canon AF info is split up.
use std::borrow::Cow;

use log::warn;

use crate::error::TreeResult;
use crate::metadata::{Key, Metadata};
use crate::packet::{locate_iptc_irb, IptcParser, XmpParser};
use crate::registry::{Registry, RegistryEntry};
use crate::tag_table::{StandardTags, TagTable};
use crate::tags::{tag, Group};
use crate::tree::finder::find;
use crate::tree::visitor::{GoFlags, TreeVisitor};
use crate::tree::{NodeId, Tree};
use crate::value::Value;

mod canon;

pub use self::canon::decode_canon_af_info;

/// Decodes one entry into records.
pub type DecodeFn = for<'a> fn(&mut Decoder<'a>, &Tree, NodeId);

static STANDARD_DECODERS: [RegistryEntry<DecodeFn>; 4] = [
    RegistryEntry {
        make: "Canon",
        tag: tag::CANON_AF_INFO as u32,
        group: Group::Canon,
        function: Some(decode_canon_af_info),
    },
    RegistryEntry {
        make: "*",
        tag: tag::XML_PACKET as u32,
        group: Group::Ifd0,
        function: Some(decode_xmp),
    },
    RegistryEntry {
        make: "*",
        tag: tag::IPTC_NAA as u32,
        group: Group::Ifd0,
        function: Some(decode_iptc),
    },
    RegistryEntry {
        make: "*",
        tag: tag::IMAGE_RESOURCES as u32,
        group: Group::Ifd0,
        function: Some(decode_iptc),
    },
];

/// The built-in decoders; entries not listed are copied verbatim.
pub static STANDARD_DECODER_REGISTRY: Registry<DecodeFn> =
    Registry::new(&STANDARD_DECODERS, Some(decode_std_entry));

/// Turns the entries of a tree into metadata records.
pub struct Decoder<'a> {
    exif: &'a mut Metadata,
    iptc: Option<&'a mut dyn IptcParser>,
    xmp: Option<&'a mut dyn XmpParser>,
    registry: &'a Registry<DecodeFn>,
    tags: &'a dyn TagTable,
    make: String,
    decoded_iptc: bool,
    flags: GoFlags,
}

impl<'a> Decoder<'a> {
    /// Create a decoder adding records to `exif`.
    ///
    /// The camera make is taken from the records already present, or from the tree.
    pub fn new(exif: &'a mut Metadata, tree: &Tree, registry: &'a Registry<DecodeFn>) -> Self {
        let make = exif
            .value(tag::MAKE, Group::Ifd0)
            .map(|v| v.to_string())
            .or_else(|| {
                find(tree, tree.root(), tag::MAKE, Group::Ifd0)
                    .and_then(|found| tree.node(found).value())
                    .map(|v| v.to_string())
            })
            .unwrap_or_default();

        Decoder {
            exif,
            iptc: None,
            xmp: None,
            registry,
            tags: &StandardTags,
            make,
            decoded_iptc: false,
            flags: GoFlags::default(),
        }
    }

    /// Hand IPTC blocks to `parser`.
    pub fn with_iptc(mut self, parser: &'a mut dyn IptcParser) -> Self {
        self.iptc = Some(parser);
        self
    }

    /// Hand the XMP packet to `parser`.
    pub fn with_xmp(mut self, parser: &'a mut dyn XmpParser) -> Self {
        self.xmp = Some(parser);
        self
    }

    /// Use another list of known tags for the records split out of composite entries.
    pub fn with_tag_table(mut self, tags: &'a dyn TagTable) -> Self {
        self.tags = tags;
        self
    }

    /// The camera make the decode functions are selected by.
    pub fn make(&self) -> &str {
        &self.make
    }

    /// Decode the whole tree.
    pub fn decode(&mut self, tree: &mut Tree) -> TreeResult<()> {
        let root = tree.root();
        tree.accept(root, self)
    }

    fn decode_entry(&mut self, tree: &Tree, id: NodeId) {
        let node = tree.node(id);
        if node.value().is_none() {
            return;
        }

        if let Some(decode) = self.registry.find(&self.make, node.tag(), node.group()) {
            decode(self, tree, id);
        }
    }
}

/// The bytes of the entry `(tag, group)`: those of `object` if it is that entry, else those
/// of the first such entry in the tree.
fn object_data(tree: &Tree, object: NodeId, tag: u16, group: Group) -> Option<&[u8]> {
    let node = tree.node(object);
    let id = if node.tag() == tag && node.group() == group {
        object
    } else {
        find(tree, tree.root(), tag, group)?
    };

    tree.node(id).entry_base()?;
    let data = tree.entry_data(id);
    (!data.is_empty()).then_some(data)
}

/// Copy key and value of an entry.
pub fn decode_std_entry(decoder: &mut Decoder<'_>, tree: &Tree, id: NodeId) {
    let node = tree.node(id);
    let Some(value) = node.value() else {
        return;
    };
    let key = Key::new(node.tag(), node.group()).with_idx(node.idx());
    decoder.exif.add(key, value.clone());
}

/// Copy the XML packet entry and hand the packet to the XMP parser.
pub fn decode_xmp(decoder: &mut Decoder<'_>, tree: &Tree, id: NodeId) {
    decode_std_entry(decoder, tree, id);

    let Some(data) = object_data(tree, id, tag::XML_PACKET, Group::Ifd0) else {
        return;
    };
    let Some(parser) = decoder.xmp.as_deref_mut() else {
        return;
    };

    let mut packet = String::from_utf8_lossy(data);
    if let Cow::Owned(_) = packet {
        warn!("XMP packet is not valid UTF-8; invalid bytes were replaced.");
    }
    if let Some(start) = packet.find('<').filter(|&start| start > 0) {
        warn!(
            "Removing {} characters from the beginning of the XMP packet",
            start
        );
        packet = packet[start..].to_owned().into();
    }

    if parser.decode(&packet).is_err() {
        warn!("Failed to decode XMP metadata.");
    }
}

/// Copy the entry, then decode the IPTC data of the image once.
///
/// The IPTC-NAA entry is tried first; if it is missing or broken, the IPTC resource block of
/// the Photoshop image resources.
pub fn decode_iptc(decoder: &mut Decoder<'_>, tree: &Tree, id: NodeId) {
    decode_std_entry(decoder, tree, id);

    if decoder.decoded_iptc {
        return;
    }
    decoder.decoded_iptc = true;

    let Some(parser) = decoder.iptc.as_deref_mut() else {
        return;
    };

    if let Some(data) = object_data(tree, id, tag::IPTC_NAA, Group::Ifd0) {
        if parser.decode(data).is_ok() {
            return;
        }
        warn!("Failed to decode IPTC block found in Directory Image, entry 0x83bb");
    }

    if let Some(data) = object_data(tree, id, tag::IMAGE_RESOURCES, Group::Ifd0) {
        let Some(irb) = locate_iptc_irb(data) else {
            return;
        };
        if parser.decode(&data[irb.payload()]).is_err() {
            warn!("Failed to decode IPTC block found in Directory Image, entry 0x8649");
        }
    }
}

impl TreeVisitor for Decoder<'_> {
    fn flags(&self) -> &GoFlags {
        &self.flags
    }

    fn flags_mut(&mut self) -> &mut GoFlags {
        &mut self.flags
    }

    fn visit_entry(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()> {
        self.decode_entry(tree, id);
        Ok(())
    }

    fn visit_data_entry(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()> {
        self.decode_entry(tree, id);
        Ok(())
    }

    fn visit_image_entry(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()> {
        self.decode_entry(tree, id);
        Ok(())
    }

    fn visit_size_entry(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()> {
        self.decode_entry(tree, id);
        Ok(())
    }

    fn visit_directory(&mut self, _tree: &mut Tree, _id: NodeId) -> TreeResult<()> {
        Ok(())
    }

    fn visit_sub_ifd(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()> {
        self.decode_entry(tree, id);
        Ok(())
    }

    fn visit_mn_entry(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()> {
        self.decode_entry(tree, id);
        Ok(())
    }

    fn visit_ifd_makernote(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()> {
        let Some(mn) = tree.node(id).makernote() else {
            return Ok(());
        };

        let offset = u32::try_from(mn.mn_offset()).unwrap_or(u32::MAX);
        self.exif
            .set(Key::new(tag::MN_OFFSET, Group::MakerNote), Value::from_u32(offset));

        if let Some(bo) = mn.byte_order() {
            self.exif.set(
                Key::new(tag::MN_BYTE_ORDER, Group::MakerNote),
                Value::from_ascii(bo.marker()),
            );
        }
        Ok(())
    }

    fn visit_binary_array(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()> {
        let expanded = tree
            .node(id)
            .binary_array_ref()
            .map_or(false, |array| array.cfg().is_some() && array.decoded());
        if !expanded {
            self.decode_entry(tree, id);
        }
        Ok(())
    }

    fn visit_binary_element(&mut self, tree: &mut Tree, id: NodeId) -> TreeResult<()> {
        self.decode_entry(tree, id);
        Ok(())
    }
}
