#![no_main]
use libfuzzer_sys::fuzz_target;

use exif_tree::{Limits, Metadata, TiffHeader, TreeParser};

fuzz_target!(|data: &[u8]| {
    let mut limits = Limits::default();
    limits.max_entry_count = 1_000_000;

    let parser = TreeParser::new().with_limits(limits);
    let mut exif = Metadata::new();
    if parser.decode(data, &mut exif, None, None).is_err() {
        return;
    }

    let header = TiffHeader::new(exif_tree::ByteOrder::LittleEndian, true);
    let _ = parser.encode(data, &exif, None, None, &header);
});
