//! dexpipe: a streaming reader for dex files and APK archives.
//!
//! The heavy lifting lives in [`dexpipe_dex`]; this crate adds the
//! input surface that accepts either a bare dex image or an archive of
//! them.

pub mod container;
pub mod errors;

pub use container::*;
pub use errors::*;

pub use dexpipe_dex::{
    AccessFlags, CatchHandler, Config, ConstValue, Dex, DexAnnotationVisitor, DexClassVisitor,
    DexCodeVisitor, DexDebugVisitor, DexError, DexFieldVisitor, DexFileVisitor, DexMethodVisitor,
    EncodedAnnotation, EncodedValue, FieldRef, FillArrayData, Format, IndexKind, Label, MethodRef,
    Op, Visibility,
};
