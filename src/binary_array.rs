//! Layouts of entries whose bytes are themselves arrays of values.
//!
//! A layout names the group its elements belong to, the default element definition that
//! determines the tag step, and explicit definitions for offsets that deviate from it. Some
//! vendors encipher these arrays; a layout then carries the [`Cipher`] to undo that.
use crate::tags::{tag, ByteOrder, Group, Type};
use crate::tree::finder::find;
use crate::tree::Tree;

/// Transforms the bytes of an array. Receives the array's tag and the root of the tree.
pub type CryptFn = fn(tag: u16, data: &[u8], root: &Tree) -> Vec<u8>;

/// Picks one of several layouts for an array, by index.
pub type SelectFn = fn(tag: u16, data: &[u8], root: &Tree) -> Option<usize>;

/// A reversible byte transformation.
#[derive(Clone, Copy, Debug)]
pub struct Cipher {
    /// Applied when reading.
    pub apply: CryptFn,
    /// Applied when writing. `None` marks `apply` as its own inverse.
    pub inverse: Option<CryptFn>,
}

impl Cipher {
    pub fn for_writing(&self) -> CryptFn {
        self.inverse.unwrap_or(self.apply)
    }
}

/// Definition of the element at one offset of an array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArrayDef {
    /// Byte offset into the array.
    pub idx: usize,
    pub tiff_type: Type,
    pub count: usize,
}

impl ArrayDef {
    pub const fn new(idx: usize, tiff_type: Type, count: usize) -> Self {
        ArrayDef {
            idx,
            tiff_type,
            count,
        }
    }

    pub fn size(&self) -> usize {
        self.tiff_type.byte_len() * self.count
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ArrayCfg {
    /// Group of the elements.
    pub group: Group,
    /// Byte order of the elements, if fixed regardless of the file.
    pub byte_order: Option<ByteOrder>,
    /// Type of the array entry itself.
    pub el_tiff_type: Type,
    pub cipher: Option<Cipher>,
    /// Runs of bytes without a definition become one element each.
    pub concat: bool,
    pub default_def: ArrayDef,
    pub defs: &'static [ArrayDef],
}

impl ArrayCfg {
    /// Number of bytes per tag number.
    pub fn tag_step(&self) -> usize {
        self.default_def.size().max(1)
    }

    /// Split an array of `size` bytes into elements.
    ///
    /// Returns the offset, definition and byte length of each element in order. The elements
    /// cover the array without gaps; those at the end are cut short to the remaining bytes.
    pub fn plan(&self, size: usize) -> Vec<(usize, ArrayDef, usize)> {
        let mut plan = Vec::new();
        let mut idx = 0;

        while idx < size {
            let def = match self.defs.iter().find(|d| d.idx == idx) {
                Some(def) => *def,
                None if self.defs.is_empty() => self.default_def,
                None if self.concat => {
                    let gap = match self.defs.iter().find(|d| d.idx > idx) {
                        Some(next) => next.idx - idx,
                        None => size - idx,
                    };
                    let count = gap / self.tag_step();
                    if count * self.tag_step() == gap {
                        ArrayDef::new(idx, self.default_def.tiff_type, count)
                    } else {
                        ArrayDef::new(idx, Type::UNDEFINED, gap)
                    }
                }
                None => self.default_def,
            };

            let len = def.size().min(size - idx);
            if len == 0 {
                break;
            }
            plan.push((idx, ArrayDef { idx, ..def }, len));
            idx += len;
        }

        plan
    }

    /// The definition an element at `idx` gets when it is created without reading.
    pub fn def_at(&self, idx: usize) -> ArrayDef {
        self.defs
            .iter()
            .find(|d| d.idx == idx)
            .copied()
            .unwrap_or(ArrayDef::new(
                idx,
                self.default_def.tiff_type,
                self.default_def.count,
            ))
    }
}

/// The layouts an array entry may have.
#[derive(Debug)]
pub struct ArraySet {
    pub layouts: &'static [ArrayCfg],
    /// Chooses a layout when there is more than one, or refuses all of them.
    pub select: Option<SelectFn>,
}

impl ArraySet {
    /// Pick the layout for an array with the given bytes.
    pub fn select(&self, tag: u16, data: &[u8], root: &Tree) -> Option<usize> {
        match self.select {
            Some(select) => select(tag, data, root).filter(|&n| n < self.layouts.len()),
            None if self.layouts.len() == 1 => Some(0),
            None => None,
        }
    }

    pub fn position_for_group(&self, group: Group) -> Option<usize> {
        self.layouts.iter().position(|cfg| cfg.group == group)
    }
}

pub static CANON_CAMERA_SETTINGS: ArraySet = ArraySet {
    layouts: &[ArrayCfg {
        group: Group::CanonCs,
        byte_order: None,
        el_tiff_type: Type::SHORT,
        cipher: None,
        concat: false,
        default_def: ArrayDef::new(0, Type::SSHORT, 1),
        // The lens type and focal lengths form one element.
        defs: &[ArrayDef::new(46, Type::SHORT, 3)],
    }],
    select: None,
};

pub static SONY_9402: ArraySet = ArraySet {
    layouts: &[ArrayCfg {
        group: Group::Sony9402,
        byte_order: None,
        el_tiff_type: Type::UNDEFINED,
        cipher: Some(Cipher {
            apply: sony_decipher,
            inverse: Some(sony_encipher),
        }),
        concat: true,
        default_def: ArrayDef::new(0, Type::BYTE, 1),
        defs: &[
            ArrayDef::new(0x04, Type::SBYTE, 1),
            ArrayDef::new(0x16, Type::BYTE, 1),
            ArrayDef::new(0x17, Type::BYTE, 1),
            ArrayDef::new(0x2d, Type::BYTE, 1),
        ],
    }],
    select: Some(sony_9402_select),
};

/// The 0x9402 layout does not apply to some camera lines.
fn sony_9402_select(_: u16, _: &[u8], root: &Tree) -> Option<usize> {
    let model = find(root, root.root(), tag::MODEL, Group::Ifd0)
        .and_then(|id| root.node(id).value())
        .map(|v| v.to_string())
        .unwrap_or_default();

    if ["SLT-", "HV", "ILCA-"]
        .iter()
        .any(|prefix| model.starts_with(prefix))
    {
        return None;
    }

    Some(0)
}

fn sony_table(decipher: bool) -> [u8; 256] {
    let mut code = [0u8; 256];
    for i in 0..256u32 {
        if i < 249 {
            let cube = ((i * i * i) % 249) as u8;
            if decipher {
                code[usize::from(cube)] = i as u8;
            } else {
                code[i as usize] = cube;
            }
        } else {
            code[i as usize] = i as u8;
        }
    }
    code
}

/// Sony's substitution: `b -> b^3 mod 249`, bytes from 249 up unchanged.
pub fn sony_encipher(_: u16, data: &[u8], _: &Tree) -> Vec<u8> {
    let code = sony_table(false);
    data.iter().map(|&b| code[usize::from(b)]).collect()
}

pub fn sony_decipher(_: u16, data: &[u8], _: &Tree) -> Vec<u8> {
    let code = sony_table(true);
    data.iter().map(|&b| code[usize::from(b)]).collect()
}
