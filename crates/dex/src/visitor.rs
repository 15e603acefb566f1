//! The visitor tree the reader drives.
//!
//! Every factory method returns `Option<&mut dyn …>`: `None` elides the
//! subtree and the reader skips any decoding whose only consumer would
//! have been that subtree. All methods have no-op defaults, implementors
//! override what they care about.

use bitflags::bitflags;

use crate::dex::{AccessFlags, FieldRef, MethodRef};
use crate::encoded_value::EncodedValue;
use crate::op::Op;

bitflags! {
    /// Reader configuration bitmask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Config: u32 {
        /// Omit source file, debug state machine and line info
        const SKIP_DEBUG = 1;
        /// Do not decode method bodies (implies `SKIP_DEBUG`)
        const SKIP_CODE = 1 << 2;
        /// Do not emit annotations
        const SKIP_ANNOTATION = 1 << 3;
        /// Do not decode static field initializers
        const SKIP_FIELD_CONSTANT = 1 << 4;
        /// Log per-class failures instead of aborting
        const IGNORE_READ_EXCEPTION = 1 << 5;
        /// Emit duplicate-signature methods instead of keeping only the first
        const KEEP_ALL_METHODS = 1 << 6;
        /// When `SKIP_CODE` is set, still decode `<clinit>` bodies
        const KEEP_CLINIT = 1 << 7;
    }
}

/// A position in a method's instruction stream, in code units.
///
/// Labels are deduplicated per method and emitted in offset order,
/// interleaved with the instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label(pub u32);

/// Annotation retention, the first byte of an `annotation_item`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Build,
    Runtime,
    System,
}

/// Operand of a constant-loading instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Int(i32),
    Wide(i64),
    String(String),
    /// `const-class` operand
    Type(String),
}

/// Decoded `fill-array-data` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillArrayData {
    Byte(Vec<i8>),
    Short(Vec<i16>),
    Int(Vec<i32>),
    Long(Vec<i64>),
}

impl FillArrayData {
    pub fn len(&self) -> usize {
        match self {
            FillArrayData::Byte(values) => values.len(),
            FillArrayData::Short(values) => values.len(),
            FillArrayData::Int(values) => values.len(),
            FillArrayData::Long(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One entry of a try range's handler list; `exception_type` is `None`
/// for the catch-all slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatchHandler {
    pub exception_type: Option<String>,
    pub handler: Label,
}

pub trait DexFileVisitor {
    fn visit_class(
        &mut self,
        _access_flags: AccessFlags,
        _name: &str,
        _superclass: Option<&str>,
        _interfaces: &[String],
    ) -> Option<&mut dyn DexClassVisitor> {
        None
    }

    fn visit_end(&mut self) {}
}

pub trait DexClassVisitor {
    fn visit_source(&mut self, _file: &str) {}

    fn visit_annotation(
        &mut self,
        _type_descriptor: &str,
        _visibility: Visibility,
    ) -> Option<&mut dyn DexAnnotationVisitor> {
        None
    }

    fn visit_field(
        &mut self,
        _access_flags: AccessFlags,
        _field: &FieldRef,
        _value: Option<&EncodedValue>,
    ) -> Option<&mut dyn DexFieldVisitor> {
        None
    }

    fn visit_method(
        &mut self,
        _access_flags: AccessFlags,
        _method: &MethodRef,
    ) -> Option<&mut dyn DexMethodVisitor> {
        None
    }

    fn visit_end(&mut self) {}
}

pub trait DexFieldVisitor {
    fn visit_annotation(
        &mut self,
        _type_descriptor: &str,
        _visibility: Visibility,
    ) -> Option<&mut dyn DexAnnotationVisitor> {
        None
    }

    fn visit_end(&mut self) {}
}

pub trait DexMethodVisitor {
    fn visit_annotation(
        &mut self,
        _type_descriptor: &str,
        _visibility: Visibility,
    ) -> Option<&mut dyn DexAnnotationVisitor> {
        None
    }

    /// One call per annotation on the parameter at `index`.
    fn visit_parameter_annotation(
        &mut self,
        _index: usize,
        _type_descriptor: &str,
        _visibility: Visibility,
    ) -> Option<&mut dyn DexAnnotationVisitor> {
        None
    }

    fn visit_code(&mut self) -> Option<&mut dyn DexCodeVisitor> {
        None
    }

    fn visit_end(&mut self) {}
}

pub trait DexAnnotationVisitor {
    /// One named element; nested annotations and arrays arrive as
    /// [`EncodedValue`] subtrees.
    fn visit_element(&mut self, _name: &str, _value: &EncodedValue) {}

    fn visit_end(&mut self) {}
}

pub trait DexCodeVisitor {
    fn visit_register(&mut self, _registers: u16) {}

    fn visit_label(&mut self, _label: Label) {}

    fn visit_try_catch(&mut self, _start: Label, _end: Label, _handlers: &[CatchHandler]) {}

    /// `return-void`, `nop`
    fn visit_stmt0r(&mut self, _op: Op) {}

    /// One-register statements (`return`, `throw`, `move-result`, …)
    fn visit_stmt1r(&mut self, _op: Op, _a: u16) {}

    /// Two-register statements (`move`, unops, `/2addr` binops, …)
    fn visit_stmt2r(&mut self, _op: Op, _a: u16, _b: u16) {}

    /// Three-register statements (binops, array accesses, compares)
    fn visit_stmt3r(&mut self, _op: Op, _a: u16, _b: u16, _c: u16) {}

    /// Two registers and an inline literal (`…/lit8`, `…/lit16`)
    fn visit_stmt2r1n(&mut self, _op: Op, _a: u16, _b: u16, _literal: i32) {}

    fn visit_const_stmt(&mut self, _op: Op, _register: u16, _value: &ConstValue) {}

    /// Field access; `object_register` is `None` for static ops.
    fn visit_field_stmt(
        &mut self,
        _op: Op,
        _value_register: u16,
        _object_register: Option<u16>,
        _field: &FieldRef,
    ) {
    }

    /// `check-cast`/`new-instance` carry one register, `instance-of` and
    /// `new-array` a second one.
    fn visit_type_stmt(&mut self, _op: Op, _a: u16, _b: Option<u16>, _type_descriptor: &str) {}

    fn visit_jump_stmt(&mut self, _op: Op, _registers: &[u16], _target: Label) {}

    fn visit_method_stmt(&mut self, _op: Op, _registers: &[u16], _method: &MethodRef) {}

    fn visit_filled_new_array_stmt(&mut self, _op: Op, _registers: &[u16], _type_descriptor: &str) {
    }

    fn visit_fill_array_data_stmt(&mut self, _op: Op, _register: u16, _data: &FillArrayData) {}

    fn visit_packed_switch_stmt(
        &mut self,
        _op: Op,
        _register: u16,
        _first_key: i32,
        _targets: &[Label],
    ) {
    }

    fn visit_sparse_switch_stmt(
        &mut self,
        _op: Op,
        _register: u16,
        _keys: &[i32],
        _targets: &[Label],
    ) {
    }

    /// Placeholder for an instruction that failed decoding; emitted at
    /// the faulty offset so the label stream stays consistent.
    fn visit_bad_op(&mut self, _offset: u32, _opcode: u8) {}

    fn visit_debug(&mut self) -> Option<&mut dyn DexDebugVisitor> {
        None
    }

    fn visit_end(&mut self) {}
}

pub trait DexDebugVisitor {
    /// `name` is `None` when the parameter has no recorded name.
    fn visit_parameter_name(&mut self, _index: usize, _name: Option<&str>) {}

    fn visit_start_local(
        &mut self,
        _register: u16,
        _label: Label,
        _name: Option<&str>,
        _type_descriptor: Option<&str>,
        _signature: Option<&str>,
    ) {
    }

    fn visit_end_local(&mut self, _register: u16, _label: Label) {}

    fn visit_restart_local(&mut self, _register: u16, _label: Label) {}

    fn visit_line_number(&mut self, _line: i32, _label: Label) {}

    fn visit_prologue(&mut self, _label: Label) {}

    fn visit_epilogue(&mut self, _label: Label) {}

    fn visit_end(&mut self) {}
}
