//! A streaming parser for the dex container format.
//!
//! [`Dex::accept`] decodes an image and drives a [`visitor`] tree with
//! every class, field, method, instruction, exception handler,
//! annotation and debug event, in address order. Nothing is buffered
//! beyond the identifier tables; visitors that return `None` prune the
//! corresponding decoding work.

pub mod dex;
pub mod encoded_value;
pub mod errors;
pub mod op;
pub mod visitor;

mod annotations;
mod code;
mod debug;
mod mutf8;
mod raw;
mod reader;

pub use dex::*;
pub use encoded_value::{EncodedAnnotation, EncodedValue};
pub use errors::*;
pub use op::{Format, IndexKind, Op, OpInfo};
pub use visitor::*;
