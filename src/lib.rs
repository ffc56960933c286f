//! CODA: a unified navigation/read interface over self-describing
//! scientific data products.
//!
//! A [`types::Type`] describes the shape of a value; opening a product
//! (currently RINEX and SP3 text products, plus an HDF5 contract behind
//! the `hdf5` feature) builds a [`dynamic::DynamicType`] tree against that
//! shape, and a [`cursor::Cursor`] walks the tree one frame at a time the
//! same way a filesystem path walks directories: `goto_record_field_by_name`,
//! `goto_array_element_by_index`, `goto_parent`, then a `read_*` call at a
//! leaf.
//!
//! ```no_run
//! use coda::prelude::*;
//!
//! let product = Product::open("orbit.sp3")?;
//! let mut cursor = product.cursor();
//! cursor.goto_record_field_by_name("record")?;
//! cursor.goto_array_element_by_index(0)?;
//! cursor.goto_record_field_by_name("epoch")?;
//! let epoch = cursor.read_double()?;
//! # Ok::<(), coda::error::Error>(())
//! ```

pub mod cursor;
pub mod dynamic;
pub mod error;
pub mod filter;
#[cfg(feature = "hdf5")]
pub mod hdf5_backend;
pub mod hashtable;
pub mod mem;
pub mod product;
pub mod rinex;
pub mod sp3;
pub mod time;
pub mod types;
pub mod util;

pub mod prelude {
    pub use crate::cursor::Cursor;
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::product::Product;
}
