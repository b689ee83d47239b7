use quick_error::quick_error;

quick_error! {
    /// Errors that abort reading, decoding or encoding a tree.
    ///
    /// Most malformed input is not an error: the reader logs a warning, skips the offending
    /// entry or directory and carries on. Only arithmetic that cannot be represented and
    /// inconsistent structure that would otherwise be dereferenced end a traversal.
    #[derive(Debug)]
    pub enum TreeError {
        /// A size or offset computation overflowed.
        ArithmeticOverflow {
            display("arithmetic overflow while computing a size or offset")
        }
        /// Offsets inside the structure point outside of it.
        CorruptedMetadata {
            display("corrupted metadata")
        }
        /// The surrounding TIFF structure could not be interpreted.
        Format(err: TreeFormatError) {
            from()
            display("format error: {}", err)
            source(err)
        }
        /// An IPTC or XMP codec rejected its input.
        Packet(msg: String) {
            display("metadata packet error: {}", msg)
        }
    }
}

quick_error! {
    /// The image is not formatted properly.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum TreeFormatError {
        TiffHeaderTooShort(len: usize) {
            display("TIFF header needs 8 bytes, found {}", len)
        }
        UnknownByteOrder(marker: [u8; 2]) {
            display("unknown byte order marker {:?}", marker)
        }
        InvalidMagic(magic: u16) {
            display("TIFF signature {:#06x} is not 42", magic)
        }
        UnknownRoot(tag: u32) {
            display("no component is registered for the root tag {:#x}", tag)
        }
    }
}

/// Result of reading, decoding or encoding a tree.
pub type TreeResult<T> = Result<T, TreeError>;
