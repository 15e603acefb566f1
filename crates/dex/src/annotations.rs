//! Decoding of `annotations_directory_item`, `annotation_set_item` and
//! `annotation_set_ref_list`.
//!
//! See: <https://source.android.com/docs/core/runtime/dex-format#annotations-directory>

use log::warn;

use crate::dex::Dex;
use crate::encoded_value::read_encoded_value;
use crate::errors::DexError;
use crate::raw;
use crate::visitor::{DexAnnotationVisitor, Visibility};

/// Index-to-offset maps of one class's annotations directory.
#[derive(Debug, Default)]
pub(crate) struct AnnotationDirectory {
    pub(crate) class_set_off: u32,
    fields: Vec<(u32, u32)>,
    methods: Vec<(u32, u32)>,
    parameters: Vec<(u32, u32)>,
}

impl AnnotationDirectory {
    pub(crate) fn read(dex: &Dex, offset: u32) -> Result<AnnotationDirectory, DexError> {
        if offset == 0 {
            return Ok(AnnotationDirectory::default());
        }

        let mut input = raw::slice_at(&dex.data, offset as usize)?;
        let class_set_off = raw::read_u32(&mut input)?;
        let fields_size = raw::read_u32(&mut input)?;
        let methods_size = raw::read_u32(&mut input)?;
        let parameters_size = raw::read_u32(&mut input)?;

        let mut read_pairs = |count: u32| -> Result<Vec<(u32, u32)>, DexError> {
            let mut pairs = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let index = raw::read_u32(&mut input)?;
                let annotations_off = raw::read_u32(&mut input)?;
                pairs.push((index, annotations_off));
            }
            Ok(pairs)
        };

        let fields = read_pairs(fields_size)?;
        let methods = read_pairs(methods_size)?;
        let parameters = read_pairs(parameters_size)?;

        Ok(AnnotationDirectory {
            class_set_off,
            fields,
            methods,
            parameters,
        })
    }

    pub(crate) fn field_set(&self, field_index: u32) -> Option<u32> {
        lookup(&self.fields, field_index)
    }

    pub(crate) fn method_set(&self, method_index: u32) -> Option<u32> {
        lookup(&self.methods, method_index)
    }

    pub(crate) fn parameter_list(&self, method_index: u32) -> Option<u32> {
        lookup(&self.parameters, method_index)
    }
}

fn lookup(pairs: &[(u32, u32)], index: u32) -> Option<u32> {
    pairs
        .iter()
        .find(|(entry, _)| *entry == index)
        .map(|(_, offset)| *offset)
}

/// Item offsets of an `annotation_set_item`; offset `0` is the empty set.
pub(crate) fn read_set_offsets(dex: &Dex, set_off: u32) -> Result<Vec<u32>, DexError> {
    if set_off == 0 {
        return Ok(Vec::new());
    }

    let mut input = raw::slice_at(&dex.data, set_off as usize)?;
    let size = raw::read_u32(&mut input)?;

    let mut offsets = Vec::with_capacity(size as usize);
    for _ in 0..size {
        offsets.push(raw::read_u32(&mut input)?);
    }

    Ok(offsets)
}

/// Per-parameter set offsets of an `annotation_set_ref_list`; a `0` entry
/// means the parameter has no annotations.
pub(crate) fn read_set_ref_list(dex: &Dex, offset: u32) -> Result<Vec<u32>, DexError> {
    // same wire shape as a set, different indirection level
    read_set_offsets(dex, offset)
}

/// One `annotation_item` with its elements not yet decoded, so a `None`
/// from the visitor factory skips them entirely.
pub(crate) struct AnnotationItem<'a> {
    pub(crate) visibility: Visibility,
    pub(crate) type_descriptor: String,
    element_count: u32,
    input: &'a [u8],
}

pub(crate) fn open_annotation(dex: &Dex, item_off: u32) -> Result<AnnotationItem<'_>, DexError> {
    let mut input = raw::slice_at(&dex.data, item_off as usize)?;

    let visibility = match raw::read_u8(&mut input)? {
        0x00 => Visibility::Build,
        0x01 => Visibility::Runtime,
        0x02 => Visibility::System,
        other => {
            warn!("unknown annotation visibility {other:#04x}, treating as build");
            Visibility::Build
        }
    };

    let type_index = raw::uleb128(&mut input)?;
    let element_count = raw::uleb128(&mut input)?;

    Ok(AnnotationItem {
        visibility,
        type_descriptor: dex.type_at(type_index)?.into_owned(),
        element_count,
        input,
    })
}

impl AnnotationItem<'_> {
    pub(crate) fn accept_elements(
        mut self,
        dex: &Dex,
        av: &mut dyn DexAnnotationVisitor,
    ) -> Result<(), DexError> {
        for _ in 0..self.element_count {
            let name_index = raw::uleb128(&mut self.input)?;
            let name = dex.string_at(name_index)?;
            let value = read_encoded_value(dex, &mut self.input)?;
            av.visit_element(&name, &value);
        }
        av.visit_end();

        Ok(())
    }
}
