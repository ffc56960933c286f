//! Dynamic-type instances (`spec.md` component D, the non-cursor half).
//!
//! A [`DynamicType`] is the runtime counterpart of a [`crate::types::Type`]:
//! every instance carries a `backend` tag and a reference to its
//! *definition* (the static type it was built from). The two backend
//! groups named in `spec.md` §3.1 are `Static-equal` (ascii/binary — out of
//! scope for this core, see `SPEC_FULL.md`) and `Dynamic` (memory, hdf4,
//! hdf5, cdf, netcdf, grib). This crate implements the in-memory ("mem")
//! backend fully and the HDF5 backend at contract level (feature `hdf5`);
//! [`Backend`] is the tag distinguishing them on a [`DynamicType`].
//!
//! Modeled after `adbf_rs`'s `Record`/`RecordOps` split (data struct plus
//! an owning handle), generalized from a flat field list to the recursive
//! record/array/data/special tree this spec needs.

use std::cell::RefCell;
use std::rc::Rc;

use crate::types::{Format, TypeRef};

/// Which concrete implementation a [`DynamicType`] is backed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Mem,
    #[cfg(feature = "hdf5")]
    Hdf5,
}

pub type DynamicRef = Rc<DynamicType>;

/// A record instance: `spec.md` §3.1 "fixed `num_fields`... plus a slot per
/// field that is either null... or points at another dynamic type."
#[derive(Debug)]
pub struct RecordInstance {
    /// Wrapped in a `RefCell` (unlike every other instance's `definition`)
    /// because `record_add_field`'s `update_definition=true` branch
    /// (`spec.md` §4.2) replaces it in place with a grown sibling
    /// definition rather than mutating the shared `Type::Record` itself.
    pub definition: RefCell<TypeRef>,
    pub attributes: RefCell<Option<DynamicRef>>,
    pub field_type: RefCell<Vec<Option<DynamicRef>>>,
}

/// An array instance: static-length arrays preallocate `None` slots;
/// dynamic-length arrays grow in blocks of 16 (mirrored in `mem::array_add_element`).
#[derive(Debug)]
pub struct ArrayInstance {
    pub definition: TypeRef,
    pub attributes: RefCell<Option<DynamicRef>>,
    pub element: RefCell<Vec<Option<DynamicRef>>>,
}

/// A scalar/raw data instance: a `{length, offset}` view into the
/// product's byte arena.
#[derive(Debug)]
pub struct DataInstance {
    pub definition: TypeRef,
    pub attributes: RefCell<Option<DynamicRef>>,
    pub offset: i64,
    pub length: i64,
}

/// A special instance: wraps a base dynamic type (time), or is a
/// per-format no-data singleton.
#[derive(Debug)]
pub enum SpecialInstance {
    Time { definition: TypeRef, attributes: RefCell<Option<DynamicRef>>, base_type: DynamicRef },
    NoData { format: Format },
}

#[derive(Debug)]
pub enum DynamicType {
    Record(RecordInstance),
    Array(ArrayInstance),
    Data(DataInstance),
    Special(SpecialInstance),
    #[cfg(feature = "hdf5")]
    Hdf5(crate::hdf5_backend::Hdf5Type),
}

impl DynamicType {
    pub fn backend(&self) -> Backend {
        match self {
            #[cfg(feature = "hdf5")]
            DynamicType::Hdf5(_) => Backend::Hdf5,
            _ => Backend::Mem,
        }
    }

    /// The static type this instance was built from. `None` only for the
    /// no-data singleton, per invariant 1 in `spec.md` §3.2. Returned by
    /// value (a cheap `Rc` clone) since `RecordInstance::definition` can
    /// change identity across `record_add_field` calls.
    pub fn definition(&self) -> Option<TypeRef> {
        match self {
            DynamicType::Record(r) => Some(r.definition.borrow().clone()),
            DynamicType::Array(a) => Some(a.definition.clone()),
            DynamicType::Data(d) => Some(d.definition.clone()),
            DynamicType::Special(SpecialInstance::Time { definition, .. }) => Some(definition.clone()),
            DynamicType::Special(SpecialInstance::NoData { .. }) => None,
            #[cfg(feature = "hdf5")]
            DynamicType::Hdf5(h) => Some(h.definition.clone()),
        }
    }

    pub fn attributes(&self) -> Option<DynamicRef> {
        match self {
            DynamicType::Record(r) => r.attributes.borrow().clone(),
            DynamicType::Array(a) => a.attributes.borrow().clone(),
            DynamicType::Data(d) => d.attributes.borrow().clone(),
            DynamicType::Special(SpecialInstance::Time { attributes, .. }) => attributes.borrow().clone(),
            DynamicType::Special(SpecialInstance::NoData { .. }) => None,
            #[cfg(feature = "hdf5")]
            DynamicType::Hdf5(h) => h.attributes.clone(),
        }
    }

    pub fn as_record(&self) -> Option<&RecordInstance> {
        match self {
            DynamicType::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayInstance> {
        match self {
            DynamicType::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_data(&self) -> Option<&DataInstance> {
        match self {
            DynamicType::Data(d) => Some(d),
            _ => None,
        }
    }
}
