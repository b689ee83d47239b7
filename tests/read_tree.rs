extern crate exif_tree;

mod common;

use common::{Entry, TiffBuilder};
use exif_tree::factory::{ComponentFactory, StandardFactory};
use exif_tree::makernote::StandardMakernotes;
use exif_tree::tags::{ext, tag};
use exif_tree::tree::Storage;
use exif_tree::{
    ByteOrder, Group, Limits, NodeId, Reader, RwState, TiffHeader, Tree, TreeError, TreeParser,
    Type,
};

const LE: ByteOrder = ByteOrder::LittleEndian;

fn parse_with(parser: &TreeParser, data: &[u8]) -> Tree {
    let header = TiffHeader::read(data, true).expect("valid header");
    parser
        .parse(data, ext::ROOT, &header)
        .expect("tree can be read")
}

fn parse(data: &[u8]) -> Tree {
    parse_with(&TreeParser::new(), data)
}

fn storage(tree: &Tree, id: NodeId) -> Storage {
    tree.node(id)
        .entry_base()
        .map(|entry| entry.storage().clone())
        .unwrap_or_default()
}

fn find(tree: &Tree, tag: u16, group: Group) -> NodeId {
    tree.find(tag, group)
        .unwrap_or_else(|| panic!("{:#06x} in {} is read", tag, group))
}

#[test]
fn small_values_stay_in_their_entry() {
    let mut tiff = TiffBuilder::new(LE);
    let ifd0 = tiff.ifd(&[
        Entry::ascii(tag::MAKE, "Ca"),
        Entry::ascii(tag::MODEL, "EOS 5D Mark IV"),
    ]);
    let data = tiff.finish();
    let tree = parse(&data);

    let make = find(&tree, tag::MAKE, Group::Ifd0);
    let inline = ifd0.slot(0) + 8;
    assert_eq!(storage(&tree, make), Storage::Shared(inline..inline + 3));

    let model = find(&tree, tag::MODEL, Group::Ifd0);
    let Storage::Shared(range) = storage(&tree, model) else {
        panic!("model is read from the buffer");
    };
    assert!(range.start > ifd0.next);
    assert_eq!(
        tree.node(model).value().map(|v| v.to_string()),
        Some("EOS 5D Mark IV".to_owned())
    );
}

#[test]
fn entries_outside_the_buffer_are_empty() {
    let mut tiff = TiffBuilder::new(LE);
    tiff.ifd(&[
        Entry::raw(LE, 0x010e, 2, 40, 0xffff),
        Entry::raw(LE, 0x0131, 2, 100, 8),
        Entry::ascii(tag::MAKE, "Ca"),
    ]);
    let data = tiff.finish();
    let tree = parse(&data);

    for tag in [0x010e, 0x0131] {
        let id = find(&tree, tag, Group::Ifd0);
        assert!(tree.entry_data(id).is_empty());
        assert_eq!(tree.node(id).value().map(|v| v.count()), Some(0));
        assert_eq!(tree.node(id).entry_base().map(|e| e.count()), Some(0));
    }

    // Reading went on after them.
    let make = find(&tree, tag::MAKE, Group::Ifd0);
    assert_eq!(tree.entry_data(make), b"Ca\0");
}

#[test]
fn circular_references_are_not_followed() {
    let mut tiff = TiffBuilder::new(LE);
    let ifd0 = tiff.ifd(&[
        Entry::ascii(tag::MAKE, "Ca"),
        Entry::pointer(tag::EXIF_IFD, 4, 1),
    ]);
    tiff.link(ifd0.slot(1), ifd0.start);
    tiff.set_next(&ifd0, ifd0.start);
    let data = tiff.finish();
    let tree = parse(&data);

    let sub_ifd = find(&tree, tag::EXIF_IFD, Group::Ifd0);
    let exif = tree.children(sub_ifd);
    assert_eq!(exif.len(), 1);
    assert_eq!(tree.node(exif[0]).group(), Group::Exif);
    assert!(tree.children(exif[0]).is_empty());

    let root = tree.root();
    let next = *tree.children(root).last().expect("next directory");
    assert_eq!(tree.node(next).group(), Group::Ifd1);
    assert!(tree.children(next).is_empty());
}

#[test]
fn oversized_directory_is_skipped() {
    let mut tiff = TiffBuilder::new(LE);
    let ifd0 = tiff.ifd(&[
        Entry::ascii(tag::MAKE, "Ca"),
        Entry::pointer(tag::EXIF_IFD, 4, 1),
    ]);
    let exif = tiff.bytes(&LE.u16_bytes(300));
    tiff.bytes(&[0; 24]);
    let ifd1 = tiff.ifd(&[Entry::short(LE, 0x0103, &[6])]);
    tiff.link(ifd0.slot(1), exif);
    tiff.set_next(&ifd0, ifd1.start);
    let data = tiff.finish();
    let tree = parse(&data);

    let sub_ifd = find(&tree, tag::EXIF_IFD, Group::Ifd0);
    let exif = tree.children(sub_ifd);
    assert!(tree.children(exif[0]).is_empty());

    let compression = find(&tree, 0x0103, Group::Ifd1);
    assert_eq!(
        tree.node(compression).value().and_then(|v| v.to_i64(0)),
        Some(6)
    );
}

#[test]
fn entry_count_limit() {
    let mut tiff = TiffBuilder::new(LE);
    tiff.ifd(&[Entry::raw(LE, 0x010e, 1, 0x1000_0000, 8)]);
    let data = tiff.finish();

    let tree = parse(&data);
    let id = find(&tree, 0x010e, Group::Ifd0);
    assert!(tree.node(id).value().is_none());

    let tree = parse_with(&TreeParser::new().with_limits(Limits::unlimited()), &data);
    let id = find(&tree, 0x010e, Group::Ifd0);
    assert!(tree.node(id).value().is_some());
    assert!(tree.entry_data(id).is_empty());
}

#[test]
fn sub_ifd_fan_out_is_limited() {
    let mut tiff = TiffBuilder::new(LE);
    let ifd0 = tiff.ifd(&[Entry::pointer(tag::SUB_IFDS, 4, 2)]);
    let first = tiff.ifd(&[Entry::short(LE, 0x0103, &[1])]);
    let second = tiff.ifd(&[Entry::short(LE, 0x0103, &[7])]);
    let pointers = tiff.bytes(&[0; 8]);
    tiff.patch_u32(pointers, first.start as u32);
    tiff.patch_u32(pointers + 4, second.start as u32);
    tiff.link(ifd0.slot(0), pointers);
    let data = tiff.finish();

    let tree = parse(&data);
    assert!(tree.find(0x0103, Group::SubImage1).is_some());
    assert!(tree.find(0x0103, Group::SubImage2).is_some());

    let mut limits = Limits::default();
    limits.max_sub_ifds = 1;
    let tree = parse_with(&TreeParser::new().with_limits(limits), &data);
    assert!(tree.find(0x0103, Group::SubImage1).is_some());
    assert!(tree.find(0x0103, Group::SubImage2).is_none());
}

/// IFD0 with the make, an Exif IFD with a Canon makernote holding camera settings.
fn canon_tiff() -> Vec<u8> {
    let mut tiff = TiffBuilder::new(LE);
    let ifd0 = tiff.ifd(&[
        Entry::ascii(tag::MAKE, "Canon"),
        Entry::pointer(tag::EXIF_IFD, 4, 1),
    ]);
    let exif = tiff.ifd(&[Entry::pointer(tag::MAKER_NOTE, 7, 0)]);
    let makernote = tiff.ifd(&[Entry::short(
        LE,
        tag::CANON_CAMERA_SETTINGS,
        &[8, 1, 0xfffe, 3],
    )]);
    let len = tiff.len() - makernote.start;

    tiff.link(ifd0.slot(1), exif.start);
    tiff.link(exif.slot(0), makernote.start);
    tiff.patch_u32(exif.slot(0) + 4, len as u32);
    tiff.finish()
}

#[test]
fn binary_arrays_are_expanded_once() {
    let data = canon_tiff();
    let factory = StandardFactory;
    let makernotes = StandardMakernotes;

    let root = factory
        .create(ext::ROOT, Group::NotSet)
        .expect("root component")
        .with_start(8);
    let mut tree = Tree::new(data, root);
    let start = tree.root();

    let mut reader = Reader::new(RwState::new(LE, 0), &factory, &makernotes);
    reader.read(&mut tree, start).expect("tree can be read");

    let array = find(&tree, tag::CANON_CAMERA_SETTINGS, Group::Canon);
    let elements = tree.children(array);
    assert_eq!(elements.len(), 4);

    let third = tree.node(elements[2]);
    assert_eq!(third.group(), Group::CanonCs);
    assert_eq!(third.tag(), 2);
    assert_eq!(third.value().and_then(|v| v.to_i64(0)), Some(-2));

    let indices: Vec<i32> = elements.iter().map(|&e| tree.node(e).idx()).collect();

    reader.post_process(&mut tree).expect("nothing left to do");
    assert_eq!(tree.children(array), elements);
    let again: Vec<i32> = elements.iter().map(|&e| tree.node(e).idx()).collect();
    assert_eq!(again, indices);
}

#[test]
fn sony_preview_may_point_outside() {
    let mut tiff = TiffBuilder::new(LE);
    let ifd0 = tiff.ifd(&[
        Entry::ascii(tag::MAKE, "SONY"),
        Entry::pointer(tag::EXIF_IFD, 4, 1),
    ]);
    let exif = tiff.ifd(&[Entry::pointer(tag::MAKER_NOTE, 7, 0)]);
    let makernote = tiff.bytes(b"SONY DSC \0\0\0");
    tiff.ifd(&[Entry::raw(
        LE,
        tag::SONY_PREVIEW_IMAGE,
        4,
        2,
        0xffff_0000,
    )]);
    let len = tiff.len() - makernote;
    tiff.link(ifd0.slot(1), exif.start);
    tiff.link(exif.slot(0), makernote);
    tiff.patch_u32(exif.slot(0) + 4, len as u32);
    let data = tiff.finish();

    let tree = parse(&data);
    let preview = find(&tree, tag::SONY_PREVIEW_IMAGE, Group::Sony1);
    let entry = tree.node(preview).entry_base().expect("an entry");
    assert_eq!(entry.tiff_type(), Type::UNDEFINED);
    assert_eq!(entry.size(), 0);
}

#[test]
fn big_endian_makernote_inside_little_endian_image() {
    let mut inner = TiffBuilder::new(ByteOrder::BigEndian);
    inner.ifd(&[
        Entry::undefined(0x0001, b"0211"),
        Entry::short(ByteOrder::BigEndian, 0x0002, &[100, 200]),
    ]);
    let makernote = common::nikon3_makernote(inner);

    let mut tiff = TiffBuilder::new(LE);
    let ifd0 = tiff.ifd(&[
        Entry::ascii(tag::MAKE, "NIKON CORPORATION"),
        Entry::pointer(tag::EXIF_IFD, 4, 1),
        Entry::short(LE, 0x0112, &[1]),
    ]);
    let exif = tiff.ifd(&[Entry::undefined(tag::MAKER_NOTE, &makernote)]);
    tiff.link(ifd0.slot(1), exif.start);
    let data = tiff.finish();

    let tree = parse(&data);
    let iso = find(&tree, 0x0002, Group::Nikon3);
    let iso = tree.node(iso).value().expect("ISO is read");
    assert_eq!(iso.to_i64(0), Some(100));
    assert_eq!(iso.to_i64(1), Some(200));

    let orientation = find(&tree, 0x0112, Group::Ifd0);
    assert_eq!(
        tree.node(orientation).value().and_then(|v| v.to_i64(0)),
        Some(1)
    );
}

#[test]
fn offsets_past_the_address_space_are_corrupt() {
    let mut tiff = TiffBuilder::new(LE);
    tiff.ifd(&[Entry::ascii(tag::MAKE, "Canon EOS 5D Mark4")]);
    let data = tiff.finish();
    let factory = StandardFactory;
    let makernotes = StandardMakernotes;

    let root = factory
        .create(ext::ROOT, Group::NotSet)
        .expect("root component")
        .with_start(8);
    let mut tree = Tree::new(data, root);
    let start = tree.root();

    let mut reader = Reader::new(RwState::new(LE, usize::MAX - 4), &factory, &makernotes);
    let result = reader.read(&mut tree, start);
    assert!(matches!(result, Err(TreeError::CorruptedMetadata)));
}
