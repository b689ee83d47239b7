use crate::metadata::Key;
use crate::tags::Type;
use crate::tree::{NodeId, Tree};
use crate::value::Value;

use super::{decode_std_entry, Decoder};

/// Copy the Canon AF info entry and split it into its records.
///
/// Only the variable-length layout is split, recognized by its first word holding the size of
/// the entry in bytes. The records follow in a fixed order; the number of AF points decides
/// the length of the per-point records and of the bit masks.
pub fn decode_canon_af_info(decoder: &mut Decoder<'_>, tree: &Tree, id: NodeId) {
    decode_std_entry(decoder, tree, id);

    let node = tree.node(id);
    let Some(value) = node.value() else {
        return;
    };
    if value.count() < 3 || value.data_type() != Type::SHORT {
        return;
    }

    let words: Vec<u16> = (0..value.count())
        .filter_map(|n| value.to_i64(n))
        .map(|v| v as u16)
        .collect();
    if usize::from(words[0]) != words.len() * 2 {
        return;
    }

    let points = words[2];
    let masks = points.saturating_add(15) / 16;

    let records: [(u16, u16, bool); 15] = [
        (0x2600, 1, true),
        (0x2601, 1, true),
        (0x2602, 1, true),
        (0x2603, 1, true),
        (0x2604, 1, true),
        (0x2605, 1, true),
        (0x2606, 1, true),
        (0x2607, 1, true),
        (0x2608, points, true),
        (0x2609, points, true),
        (0x260a, points, true),
        (0x260b, points, true),
        (0x260c, masks, false),
        (0x260d, masks, false),
        (0x260e, masks, false),
    ];

    let total: usize = records.iter().map(|&(_, len, _)| usize::from(len)).sum();
    if total > words.len() {
        return;
    }

    let group = node.group();
    let mut at = 0;
    for (tag, len, signed) in records {
        let part = &words[at..at + usize::from(len)];
        at += usize::from(len);

        if decoder.tags.tag_info(group, tag).is_none() {
            continue;
        }

        let value = if signed {
            let part: Vec<i16> = part.iter().map(|&w| w as i16).collect();
            Value::from_i16s(&part)
        } else {
            Value::from_u16s(part)
        };
        decoder.exif.set(Key::new(tag, group), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::STANDARD_DECODER_REGISTRY;
    use crate::metadata::Metadata;
    use crate::tags::{ByteOrder, Group};
    use crate::tree::{Node, Storage};

    fn af_tree(words: &[u16]) -> (Tree, NodeId) {
        let mut tree = Tree::new(Vec::new(), Node::directory(0, Group::Canon, false));
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();

        let mut node = Node::entry(0x0026, Group::Canon);
        node.idx = 1;
        if let Some(entry) = node.entry_base_mut() {
            entry.storage = Storage::Owned(bytes.clone());
        }
        let id = tree.insert(node);
        tree.update_value(
            id,
            Value::read(Type::SHORT, &bytes, ByteOrder::LittleEndian),
            ByteOrder::LittleEndian,
        );
        let root = tree.root();
        tree.add_child(root, id);
        (tree, id)
    }

    fn decode(words: &[u16]) -> Metadata {
        let (mut tree, _) = af_tree(words);
        let mut exif = Metadata::new();
        let mut decoder = Decoder::new(&mut exif, &tree, &STANDARD_DECODER_REGISTRY);
        decoder.make = "Canon".into();
        decoder.decode(&mut tree).expect("decoding succeeds");
        exif
    }

    #[test]
    fn splits_af_info() {
        // 9 points need one mask word each: 8 + 4 * 9 + 3 = 47 words.
        let mut words = vec![0u16; 47];
        words[0] = 94;
        words[2] = 9;
        words[8] = 0xffff;
        words[44] = 0x01ff;

        let exif = decode(&words);
        assert_eq!(exif.len(), 16);
        assert_eq!(exif.get(0).map(|d| d.key.tag), Some(0x0026));

        let points = exif.value(0x2602, Group::Canon).expect("AFNumPoints");
        assert_eq!(points.data_type(), Type::SSHORT);
        assert_eq!(points.to_i64(0), Some(9));

        let widths = exif.value(0x2608, Group::Canon).expect("AFAreaWidths");
        assert_eq!(widths.count(), 9);
        assert_eq!(widths.to_i64(0), Some(-1));

        let in_focus = exif.value(0x260c, Group::Canon).expect("AFPointsInFocus");
        assert_eq!(in_focus.data_type(), Type::SHORT);
        assert_eq!(in_focus.to_i64(0), Some(0x01ff));
    }

    #[test]
    fn size_word_must_match() {
        let mut words = vec![0u16; 20];
        words[0] = 38;
        words[2] = 2;

        let exif = decode(&words);
        assert_eq!(exif.len(), 1);
    }

    #[test]
    fn records_must_fit() {
        let mut words = vec![0u16; 10];
        words[0] = 20;
        words[2] = 9;

        let exif = decode(&words);
        assert_eq!(exif.len(), 1);
    }
}
