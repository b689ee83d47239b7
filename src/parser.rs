//! Parsing a TIFF structure into a tree and metadata, and encoding metadata back into one.
use log::{debug, info};

use crate::decoder::{DecodeFn, Decoder, STANDARD_DECODER_REGISTRY};
use crate::encoder::{
    EncodeFn, Encoder, ImagePolicy, ImageTagFilter, WriteMethod, STANDARD_ENCODER_REGISTRY,
};
use crate::error::{TreeError, TreeFormatError, TreeResult};
use crate::factory::{ComponentFactory, StandardFactory};
use crate::makernote::{MakernoteFactory, StandardMakernotes};
use crate::metadata::Metadata;
use crate::packet::{IptcParser, XmpParser};
use crate::reader::{Limits, Reader, RwState};
use crate::registry::Registry;
use crate::tags::{ext, ByteOrder, Group};
use crate::tree::copier::{copy_image_tags, find_primary_groups};
use crate::tree::Tree;

const TIFF_MAGIC: u16 = 42;

/// The 8 bytes at the start of a TIFF structure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TiffHeader {
    byte_order: ByteOrder,
    offset: u32,
    has_image_tags: bool,
}

impl TiffHeader {
    /// A header for a new structure with the first directory right after it.
    ///
    /// `has_image_tags` is false where the image data lives outside the structure, as for
    /// Exif in a JPEG file.
    pub fn new(byte_order: ByteOrder, has_image_tags: bool) -> Self {
        TiffHeader {
            byte_order,
            offset: 8,
            has_image_tags,
        }
    }

    /// Read the header at the start of `data`.
    pub fn read(data: &[u8], has_image_tags: bool) -> TreeResult<Self> {
        if data.len() < 8 {
            return Err(TreeFormatError::TiffHeaderTooShort(data.len()).into());
        }
        let byte_order = ByteOrder::from_marker(&data[..2])
            .ok_or(TreeFormatError::UnknownByteOrder([data[0], data[1]]))?;

        let magic = byte_order.read_u16(&data[2..4]).unwrap_or(0);
        if magic != TIFF_MAGIC {
            return Err(TreeFormatError::InvalidMagic(magic).into());
        }
        let offset = byte_order.read_u32(&data[4..8]).unwrap_or(0);

        Ok(TiffHeader {
            byte_order,
            offset,
            has_image_tags,
        })
    }

    pub fn write(&self) -> Vec<u8> {
        let mut header = Vec::with_capacity(8);
        header.extend_from_slice(self.byte_order.marker().as_bytes());
        header.extend_from_slice(&self.byte_order.u16_bytes(TIFF_MAGIC));
        header.extend_from_slice(&self.byte_order.u32_bytes(self.offset));
        header
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn set_byte_order(&mut self, byte_order: ByteOrder) {
        self.byte_order = byte_order;
    }

    /// Offset of the first directory.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn set_offset(&mut self, offset: u32) {
        self.offset = offset;
    }
}

impl ImagePolicy for TiffHeader {
    fn is_image_tag(&self, tag: u16, group: Group, primary_groups: &[Group]) -> bool {
        self.has_image_tags && ImageTagFilter::tiff().is_image_tag(tag, group, primary_groups)
    }
}

/// Reads, decodes and encodes trees with a fixed set of factories, limits and registries.
pub struct TreeParser<'a> {
    factory: &'a dyn ComponentFactory,
    makernotes: &'a dyn MakernoteFactory,
    limits: Limits,
    decoders: &'a Registry<DecodeFn>,
    encoders: &'a Registry<EncodeFn>,
}

impl Default for TreeParser<'static> {
    fn default() -> Self {
        TreeParser::new()
    }
}

impl TreeParser<'static> {
    /// A parser with the built-in components, makernotes and registries.
    pub fn new() -> Self {
        static FACTORY: StandardFactory = StandardFactory;
        static MAKERNOTES: StandardMakernotes = StandardMakernotes;

        TreeParser {
            factory: &FACTORY,
            makernotes: &MAKERNOTES,
            limits: Limits::default(),
            decoders: &STANDARD_DECODER_REGISTRY,
            encoders: &STANDARD_ENCODER_REGISTRY,
        }
    }
}

impl<'a> TreeParser<'a> {
    pub fn with_factories(
        self,
        factory: &'a dyn ComponentFactory,
        makernotes: &'a dyn MakernoteFactory,
    ) -> TreeParser<'a> {
        TreeParser {
            factory,
            makernotes,
            ..self
        }
    }

    pub fn with_registries(
        self,
        decoders: &'a Registry<DecodeFn>,
        encoders: &'a Registry<EncodeFn>,
    ) -> TreeParser<'a> {
        TreeParser {
            decoders,
            encoders,
            ..self
        }
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Read the tree of `data`, whose header has already been read, below the component
    /// created for `root`.
    pub fn parse(&self, data: &[u8], root: u32, header: &TiffHeader) -> TreeResult<Tree> {
        let node = self
            .factory
            .create(root, Group::NotSet)
            .ok_or(TreeFormatError::UnknownRoot(root))?
            .with_start(header.offset() as usize);

        let mut tree = Tree::new(data.to_vec(), node);
        let start = tree.root();
        Reader::new(
            RwState::new(header.byte_order(), 0),
            self.factory,
            self.makernotes,
        )
        .with_limits(self.limits.clone())
        .read(&mut tree, start)?;
        Ok(tree)
    }

    /// Read `data` and add the records of its tree to `exif`.
    ///
    /// Embedded IPTC data and the XMP packet go to their parsers if given. Returns the byte
    /// order of the structure.
    pub fn decode<'p>(
        &self,
        data: &[u8],
        exif: &'p mut Metadata,
        iptc: Option<&'p mut dyn IptcParser>,
        xmp: Option<&'p mut dyn XmpParser>,
    ) -> TreeResult<ByteOrder> {
        let header = TiffHeader::read(data, true)?;
        let mut tree = self.parse(data, ext::ROOT, &header)?;

        let mut decoder = Decoder::new(exif, &tree, self.decoders);
        if let Some(iptc) = iptc {
            decoder = decoder.with_iptc(iptc);
        }
        if let Some(xmp) = xmp {
            decoder = decoder.with_xmp(xmp);
        }
        decoder.decode(&mut tree)?;
        Ok(header.byte_order())
    }

    /// Bring the tree of `data` up to date with `exif`.
    ///
    /// First the records are written into the tree read from `data`, in place. If that is not
    /// possible, or there is no such tree, a new one is built from the image data of the old
    /// tree and all records. `header` decides the byte order of a new tree and whether it
    /// carries image data.
    pub fn encode(
        &self,
        data: &[u8],
        exif: &Metadata,
        iptc: Option<&dyn IptcParser>,
        xmp: Option<&dyn XmpParser>,
        header: &TiffHeader,
    ) -> TreeResult<(WriteMethod, Tree)> {
        let mut byte_order = header.byte_order();
        let parsed = match TiffHeader::read(data, header.has_image_tags) {
            Ok(found) => {
                byte_order = found.byte_order();
                Some(self.parse(data, ext::ROOT, &found)?)
            }
            Err(TreeError::Format(err)) => {
                debug!("no tree to update in place: {}", err);
                None
            }
            Err(err) => return Err(err),
        };
        let primary_groups = parsed.as_ref().map(find_primary_groups).unwrap_or_default();

        if let Some(mut tree) = parsed.clone() {
            let mut encoder = Encoder::new(
                exif.clone(),
                Some(&tree),
                byte_order,
                header,
                self.encoders,
            )
            .with_primary_groups(&primary_groups)
            .with_packets(iptc, xmp);
            encoder.encode(&mut tree)?;
            if !encoder.dirty() {
                return Ok((WriteMethod::NonIntrusive, tree));
            }
            info!(
                "Writing in place is not possible, {} records left over.",
                encoder.metadata().len()
            );
        }

        let root = self
            .factory
            .create(ext::ROOT, Group::NotSet)
            .ok_or(TreeFormatError::UnknownRoot(ext::ROOT))?;
        let mut tree = Tree::new(Vec::new(), root);
        if let Some(source) = &parsed {
            copy_image_tags(
                source,
                &mut tree,
                ext::ROOT,
                header,
                &primary_groups,
                self.factory,
                self.makernotes,
            );
        }

        let mut encoder = Encoder::new(
            exif.clone(),
            parsed.as_ref(),
            byte_order,
            header,
            self.encoders,
        )
        .new_image(parsed.is_none())
        .with_primary_groups(&primary_groups)
        .with_packets(iptc, xmp);
        encoder.add(
            &mut tree,
            parsed.as_ref(),
            ext::ROOT,
            self.factory,
            self.makernotes,
        )?;
        Ok((encoder.write_method(), tree))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_both_byte_orders() {
        let header = TiffHeader::read(b"II*\0\x08\0\0\0", true).expect("valid header");
        assert_eq!(header.byte_order(), ByteOrder::LittleEndian);
        assert_eq!(header.offset(), 8);

        let header = TiffHeader::read(b"MM\0*\0\0\0\x10", true).expect("valid header");
        assert_eq!(header.byte_order(), ByteOrder::BigEndian);
        assert_eq!(header.offset(), 16);
    }

    #[test]
    fn rejects_broken_headers() {
        assert!(matches!(
            TiffHeader::read(b"II*\0", true),
            Err(TreeError::Format(TreeFormatError::TiffHeaderTooShort(4)))
        ));
        assert!(matches!(
            TiffHeader::read(b"XX*\0\x08\0\0\0", true),
            Err(TreeError::Format(TreeFormatError::UnknownByteOrder(_)))
        ));
        assert!(matches!(
            TiffHeader::read(b"II+\0\x08\0\0\0", true),
            Err(TreeError::Format(TreeFormatError::InvalidMagic(43)))
        ));
    }

    #[test]
    fn writes_what_it_reads() {
        let header = TiffHeader::new(ByteOrder::BigEndian, true);
        assert_eq!(header.write(), b"MM\0*\0\0\0\x08");
    }

    #[test]
    fn exif_in_jpeg_has_no_image_tags() {
        let header = TiffHeader::new(ByteOrder::LittleEndian, false);
        assert!(!header.is_image_tag(0x0111, Group::Ifd0, &[]));
        let header = TiffHeader::new(ByteOrder::LittleEndian, true);
        assert!(header.is_image_tag(0x0111, Group::Ifd0, &[]));
    }

    #[test]
    fn unknown_root() {
        let header = TiffHeader::new(ByteOrder::LittleEndian, true);
        let parser = TreeParser::new();
        assert!(matches!(
            parser.parse(&header.write(), 0x1234, &header),
            Err(TreeError::Format(TreeFormatError::UnknownRoot(0x1234)))
        ));
    }
}
