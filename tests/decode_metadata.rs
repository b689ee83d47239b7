extern crate exif_tree;

mod common;

use common::{Entry, TiffBuilder};
use exif_tree::packet::{IptcParser, XmpParser};
use exif_tree::tags::tag;
use exif_tree::{ByteOrder, Group, Key, Metadata, TreeError, TreeFormatError, TreeParser, TreeResult};

const LE: ByteOrder = ByteOrder::LittleEndian;

fn decode(data: &[u8]) -> Metadata {
    let mut exif = Metadata::new();
    TreeParser::new()
        .decode(data, &mut exif, None, None)
        .expect("metadata can be decoded");
    exif
}

fn keys(exif: &Metadata) -> Vec<(u16, Group)> {
    exif.iter().map(|d| (d.key.tag, d.key.group)).collect()
}

/// A Canon image whose makernote has the given entries.
fn canon(entries: &[Entry]) -> Vec<u8> {
    let mut tiff = TiffBuilder::new(LE);
    let ifd0 = tiff.ifd(&[
        Entry::ascii(tag::MAKE, "Canon"),
        Entry::pointer(tag::EXIF_IFD, 4, 1),
    ]);
    let exif = tiff.ifd(&[Entry::pointer(tag::MAKER_NOTE, 7, 0)]);
    let makernote = tiff.ifd(entries);
    let len = tiff.len() - makernote.start;

    tiff.link(ifd0.slot(1), exif.start);
    tiff.link(exif.slot(0), makernote.start);
    tiff.patch_u32(exif.slot(0) + 4, len as u32);
    tiff.finish()
}

#[derive(Default)]
struct RecordingIptc {
    calls: usize,
    last: Vec<u8>,
}

impl IptcParser for RecordingIptc {
    fn decode(&mut self, data: &[u8]) -> TreeResult<()> {
        self.calls += 1;
        if data.first() != Some(&0x1c) {
            return Err(TreeError::Packet("not an IPTC dataset".into()));
        }
        self.last = data.to_vec();
        Ok(())
    }

    fn encode(&self) -> Vec<u8> {
        self.last.clone()
    }
}

#[derive(Default)]
struct RecordingXmp {
    packet: String,
}

impl XmpParser for RecordingXmp {
    fn decode(&mut self, packet: &str) -> TreeResult<()> {
        self.packet = packet.to_owned();
        Ok(())
    }

    fn encode(&self) -> TreeResult<String> {
        Ok(self.packet.clone())
    }
}

fn resource_block(id: u16, payload: &[u8]) -> Vec<u8> {
    let mut out = b"8BIM".to_vec();
    out.extend_from_slice(&id.to_be_bytes());
    out.extend_from_slice(&[0, 0]);
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    if payload.len() % 2 == 1 {
        out.push(0);
    }
    out
}

#[test]
fn records_follow_the_tree() {
    let mut tiff = TiffBuilder::new(LE);
    let ifd0 = tiff.ifd(&[
        Entry::ascii(tag::MAKE, "Ca"),
        Entry::pointer(tag::EXIF_IFD, 4, 1),
    ]);
    let exif = tiff.ifd(&[Entry::rational(LE, 0x829a, 1, 250)]);
    let ifd1 = tiff.ifd(&[Entry::short(LE, 0x0103, &[6])]);
    tiff.link(ifd0.slot(1), exif.start);
    tiff.set_next(&ifd0, ifd1.start);
    let data = tiff.finish();

    let exif = decode(&data);
    assert_eq!(
        keys(&exif),
        [
            (tag::MAKE, Group::Ifd0),
            (tag::EXIF_IFD, Group::Ifd0),
            (0x829a, Group::Exif),
            (0x0103, Group::Ifd1),
        ]
    );
    assert_eq!(
        exif.value(0x829a, Group::Exif).map(|v| v.to_string()),
        Some("1/250".to_owned())
    );
}

#[test]
fn duplicate_entries_keep_their_index() {
    let mut tiff = TiffBuilder::new(LE);
    tiff.ifd(&[
        Entry::ascii(0x010e, "first"),
        Entry::ascii(0x010e, "second"),
    ]);
    let data = tiff.finish();

    let exif = decode(&data);
    let found: Vec<(i32, String)> = exif
        .iter()
        .map(|d| (d.key.idx, d.value.to_string()))
        .collect();
    assert_eq!(
        found,
        [(1, "first".to_owned()), (2, "second".to_owned())]
    );
}

#[test]
fn af_info_with_a_wrong_size_word_is_kept_whole() {
    let mut words = [0u16; 20];
    words[0] = 38;
    words[2] = 2;
    let data = canon(&[Entry::short(LE, tag::CANON_AF_INFO, &words)]);

    let exif = decode(&data);
    assert!(exif.value(tag::CANON_AF_INFO, Group::Canon).is_some());
    assert!(!exif
        .iter()
        .any(|d| d.key.group == Group::Canon && (0x2600..=0x260e).contains(&d.key.tag)));
}

#[test]
fn af_info_is_split() {
    let mut words = [0u16; 20];
    words[0] = 40;
    words[2] = 2;
    words[3] = 2;
    words[16] = 3;
    let data = canon(&[Entry::short(LE, tag::CANON_AF_INFO, &words)]);

    let exif = decode(&data);
    let points = exif.value(0x2602, Group::Canon).expect("AFNumPoints");
    assert_eq!(points.to_i64(0), Some(2));
    let in_focus = exif.value(0x260c, Group::Canon).expect("AFPointsInFocus");
    assert_eq!(in_focus.count(), 1);
    assert_eq!(in_focus.to_i64(0), Some(3));
}

#[test]
fn makernote_records() {
    let mut inner = TiffBuilder::new(ByteOrder::BigEndian);
    inner.ifd(&[Entry::short(ByteOrder::BigEndian, 0x0002, &[0, 100])]);
    let makernote = common::nikon3_makernote(inner);

    let mut tiff = TiffBuilder::new(LE);
    let ifd0 = tiff.ifd(&[
        Entry::ascii(tag::MAKE, "NIKON"),
        Entry::pointer(tag::EXIF_IFD, 4, 1),
    ]);
    let exif = tiff.ifd(&[Entry::undefined(tag::MAKER_NOTE, &makernote)]);
    tiff.link(ifd0.slot(1), exif.start);
    let data = tiff.finish();

    let exif_start = exif.start;
    let exif = decode(&data);
    assert_eq!(
        exif.value(0x0002, Group::Nikon3).and_then(|v| v.to_i64(1)),
        Some(100)
    );
    assert_eq!(
        exif.value(tag::MN_BYTE_ORDER, Group::MakerNote)
            .map(|v| v.to_string()),
        Some("MM".to_owned())
    );

    // The makernote is the only value stored after the Exif directory.
    let offset = exif_start + 2 + 12 + 4;
    assert_eq!(
        exif.value(tag::MN_OFFSET, Group::MakerNote)
            .and_then(|v| v.to_i64(0)),
        Some(offset as i64)
    );
}

#[test]
fn xmp_packet_is_handed_over() {
    let mut tiff = TiffBuilder::new(LE);
    tiff.ifd(&[Entry::undefined(
        tag::XML_PACKET,
        b"\n  <x:xmpmeta xmlns:x=\"adobe:ns:meta/\"/>",
    )]);
    let data = tiff.finish();

    let mut exif = Metadata::new();
    let mut xmp = RecordingXmp::default();
    TreeParser::new()
        .decode(&data, &mut exif, None, Some(&mut xmp as &mut dyn XmpParser))
        .expect("metadata can be decoded");

    assert_eq!(xmp.packet, "<x:xmpmeta xmlns:x=\"adobe:ns:meta/\"/>");
    assert!(exif.value(tag::XML_PACKET, Group::Ifd0).is_some());
}

#[test]
fn xmp_packet_with_invalid_bytes_is_still_handed_over() {
    let mut tiff = TiffBuilder::new(LE);
    tiff.ifd(&[Entry::undefined(
        tag::XML_PACKET,
        b"<x:xmpmeta>\xff</x:xmpmeta>",
    )]);
    let data = tiff.finish();

    let mut exif = Metadata::new();
    let mut xmp = RecordingXmp::default();
    TreeParser::new()
        .decode(&data, &mut exif, None, Some(&mut xmp as &mut dyn XmpParser))
        .expect("metadata can be decoded");

    assert_eq!(xmp.packet, "<x:xmpmeta>\u{fffd}</x:xmpmeta>");
}

#[test]
fn iptc_is_decoded_once() {
    let iptc = [0x1c, 0x02, 0x78, 0x00, 0x03, b'a', b'b', b'c'];
    let other = [0x1c, 0x02, 0x78, 0x00, 0x03, b'x', b'y', b'z'];
    let resources = resource_block(0x0404, &other);

    let mut tiff = TiffBuilder::new(LE);
    tiff.ifd(&[
        Entry::undefined(tag::IPTC_NAA, &iptc),
        Entry::undefined(tag::IMAGE_RESOURCES, &resources),
    ]);
    let data = tiff.finish();

    let mut exif = Metadata::new();
    let mut parser = RecordingIptc::default();
    TreeParser::new()
        .decode(&data, &mut exif, Some(&mut parser as &mut dyn IptcParser), None)
        .expect("metadata can be decoded");

    assert_eq!(parser.calls, 1);
    assert_eq!(parser.last, iptc);
    assert_eq!(exif.len(), 2);
}

#[test]
fn iptc_from_image_resources() {
    let iptc = [0x1c, 0x02, 0x05, 0x00, 0x02, b'h', b'i'];
    let mut resources = resource_block(0x03ed, &[0; 16]);
    resources.extend(resource_block(0x0404, &iptc));

    let mut tiff = TiffBuilder::new(LE);
    tiff.ifd(&[
        Entry::undefined(tag::IPTC_NAA, &[0xff; 8]),
        Entry::undefined(tag::IMAGE_RESOURCES, &resources),
    ]);
    let data = tiff.finish();

    let mut exif = Metadata::new();
    let mut parser = RecordingIptc::default();
    TreeParser::new()
        .decode(&data, &mut exif, Some(&mut parser as &mut dyn IptcParser), None)
        .expect("metadata can be decoded");

    assert_eq!(parser.calls, 2);
    assert_eq!(parser.last, iptc);
}

#[test]
fn index_of_records() {
    let mut tiff = TiffBuilder::new(LE);
    tiff.ifd(&[Entry::ascii(tag::MAKE, "Ca"), Entry::ascii(tag::MODEL, "M")]);
    let data = tiff.finish();

    let exif = decode(&data);
    let model = exif
        .iter()
        .find(|d| d.key.tag == tag::MODEL)
        .map(|d| d.key);
    assert_eq!(model, Some(Key::new(tag::MODEL, Group::Ifd0).with_idx(2)));
}

#[test]
fn not_a_tiff() {
    let mut exif = Metadata::new();
    let result = TreeParser::new().decode(b"GIF89a\0\0\0\0", &mut exif, None, None);
    assert!(matches!(
        result,
        Err(TreeError::Format(TreeFormatError::UnknownByteOrder(_)))
    ));
    assert!(exif.is_empty());
}
