//! Reading, decoding and encoding of TIFF and Exif metadata trees
//!
//! A TIFF structure is read into a [`Tree`] of components: directories, entries, sub-IFDs,
//! makernotes and binary arrays. The tree is decoded into flat [`Metadata`] records, and
//! records are encoded back into a tree, either in place or by building a new one.
//!
//! Offsets in the input are never trusted. Entries that point outside the buffer are read as
//! empty, circular directory references are cut, and only conditions that make the whole
//! buffer untrustworthy end a read with an error.
//!
//! # Related Links
//! * <https://web.archive.org/web/20210108073850/https://www.adobe.io/open/standards/TIFF.html> - The TIFF specification
//! * <https://www.cipa.jp/std/documents/e/DC-008-Translation-2019-E.pdf> - Exif 2.32

pub mod binary_array;
pub mod decoder;
pub mod encoder;
mod error;
pub mod factory;
pub mod makernote;
pub mod metadata;
pub mod packet;
mod parser;
pub mod reader;
pub mod registry;
pub mod tag_table;
pub mod tags;
pub mod tree;
pub mod value;

pub use self::decoder::Decoder;
pub use self::encoder::{Encoder, WriteMethod};
pub use self::error::{TreeError, TreeFormatError, TreeResult};
pub use self::metadata::{Datum, Key, Metadata};
pub use self::parser::{TiffHeader, TreeParser};
pub use self::reader::{Limits, Reader, RwState};
pub use self::tags::{ByteOrder, Group, Type};
pub use self::tree::{NodeId, Tree};
pub use self::value::Value;
