//! `Product`: an opened file's format tag, dynamic-type tree root, and the
//! byte arena backing it (`spec.md` component A, "Product handle").
//!
//! Grounded on `original_source/libcoda/coda-mem-type.c`'s
//! `coda_mem_product` and the top-level `coda_open`/`coda_close` pair in
//! `original_source/libcoda/coda.c`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;

use crate::cursor::{empty_record_type, Cursor};
use crate::dynamic::DynamicRef;
use crate::error::{Error, Result};
use crate::mem;
use crate::mem::arena::Arena;
use crate::rinex;
use crate::sp3;
use crate::types::Format;

/// An opened product: its detected format, the root of its dynamic-type
/// tree, and the arena that every `DataInstance` in that tree borrows from.
pub struct Product {
    pub filename: String,
    pub format: Format,
    pub root: DynamicRef,
    pub arena: Arena,
    empty_records: RefCell<HashMap<Format, DynamicRef>>,
}

impl Product {
    pub fn from_parts(format: Format, root: DynamicRef, arena: Arena) -> Self {
        Product { filename: String::new(), format, root, arena, empty_records: RefCell::new(HashMap::new()) }
    }

    /// `coda_cursor_goto_attributes` falls back to a per-format empty-record
    /// singleton when a dynamic type carries no attributes of its own
    /// (`spec.md` §9). Cached per product so repeated `goto_attributes`
    /// calls on attribute-less nodes don't allocate every time.
    pub fn empty_record(&self, format: Format) -> DynamicRef {
        if let Some(existing) = self.empty_records.borrow().get(&format) {
            return existing.clone();
        }
        let definition = empty_record_type(format);
        let record = mem::record_new(definition, None).expect("an empty record definition always validates");
        self.empty_records.borrow_mut().insert(format, record.clone());
        record
    }

    pub fn cursor(&self) -> Cursor<'_> {
        Cursor::set_product(self)
    }

    /// Detects the format from the filename extension and dispatches to the
    /// matching assembler. RINEX and SP3 are plain-text formats with no
    /// magic-byte sniffing in the original, so extension-based detection
    /// (`spec.md` §3 "Format detection") is sufficient here.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();

        #[cfg(feature = "hdf5")]
        if ext == "h5" || ext == "hdf5" {
            let mut product = crate::hdf5_backend::open(path)?;
            product.filename = path.display().to_string();
            return Ok(product);
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::file_open(format!("{}: {e}", path.display())))?;

        let stem_ext = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.rsplit('.').next())
            .unwrap_or("")
            .to_ascii_lowercase();

        let mut product = if ext == "sp3" || ext.starts_with("sp3") || stem_ext == "sp3" {
            sp3::open(&contents)?
        } else if looks_like_rinex(&contents) {
            rinex::open(&contents)?
        } else {
            return Err(Error::unsupported_product(format!("{}: unrecognized product format", path.display())));
        };
        product.filename = path.display().to_string();
        Ok(product)
    }
}

fn looks_like_rinex(contents: &str) -> bool {
    contents.lines().next().map(|line| line.len() >= 60 && line[60..].trim_start().starts_with("RINEX")).unwrap_or(false)
}
