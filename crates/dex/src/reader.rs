//! Per-class orchestration: walks the class definition table, the
//! delta-encoded `class_data_item` arrays and the annotation directory,
//! and applies the error policy.

use std::borrow::Cow;

use log::{error, warn};

use crate::annotations::{self, AnnotationDirectory};
use crate::code::accept_code;
use crate::dex::{AccessFlags, ClassItem, Dex, NO_INDEX};
use crate::encoded_value::{EncodedValue, read_encoded_array};
use crate::errors::DexError;
use crate::raw;
use crate::visitor::{Config, DexClassVisitor, DexFileVisitor};

impl Dex {
    /// Drive the visitor over every class in the image.
    ///
    /// May be called any number of times; lookups never mutate the image.
    pub fn accept(&self, dv: &mut dyn DexFileVisitor, config: Config) -> Result<(), DexError> {
        self.accept_classes(dv, config)?;
        dv.visit_end();

        Ok(())
    }

    /// As [`Dex::accept`] but without the final `visit_end`, for callers
    /// concatenating several images into the same visitor.
    pub fn accept_classes(
        &self,
        dv: &mut dyn DexFileVisitor,
        config: Config,
    ) -> Result<(), DexError> {
        for (index, class_def) in self.class_defs.iter().enumerate() {
            if let Err(source) = self.accept_class(class_def, dv, config) {
                let name = self
                    .get_type(class_def.class_idx)
                    .ok()
                    .flatten()
                    .map(Cow::into_owned)
                    .unwrap_or_else(|| format!("type#{}", class_def.class_idx));
                let wrapped = DexError::Class {
                    index: index as u32,
                    name,
                    source: Box::new(source),
                };

                if config.contains(Config::IGNORE_READ_EXCEPTION) {
                    error!("{wrapped}");
                } else {
                    return Err(wrapped);
                }
            }
        }

        Ok(())
    }

    fn accept_class(
        &self,
        class_def: &ClassItem,
        dv: &mut dyn DexFileVisitor,
        config: Config,
    ) -> Result<(), DexError> {
        let name = self.type_at(class_def.class_idx)?;
        let superclass = self.get_type(class_def.superclass_idx)?;
        let interfaces = self.get_type_list(class_def.interfaces_off)?;

        let Some(cv) = dv.visit_class(
            class_def.access_flags,
            &name,
            superclass.as_deref(),
            &interfaces,
        ) else {
            return Ok(());
        };

        if !config.contains(Config::SKIP_DEBUG) && class_def.source_file_idx != NO_INDEX {
            cv.visit_source(&self.string_at(class_def.source_file_idx)?);
        }

        let directory = if config.contains(Config::SKIP_ANNOTATION) {
            AnnotationDirectory::default()
        } else {
            AnnotationDirectory::read(self, class_def.annotations_off)?
        };

        if directory.class_set_off != 0 {
            for item_off in annotations::read_set_offsets(self, directory.class_set_off)? {
                let item = annotations::open_annotation(self, item_off)?;
                if let Some(av) = cv.visit_annotation(&item.type_descriptor, item.visibility) {
                    item.accept_elements(self, av)?;
                }
            }
        }

        if class_def.class_data_off != 0 {
            self.accept_class_data(class_def, &directory, cv, config)?;
        }

        cv.visit_end();

        Ok(())
    }

    fn accept_class_data(
        &self,
        class_def: &ClassItem,
        directory: &AnnotationDirectory,
        cv: &mut dyn DexClassVisitor,
        config: Config,
    ) -> Result<(), DexError> {
        let mut input = raw::slice_at(&self.data, class_def.class_data_off as usize)?;

        let static_fields_size = raw::uleb128(&mut input)?;
        let instance_fields_size = raw::uleb128(&mut input)?;
        let direct_methods_size = raw::uleb128(&mut input)?;
        let virtual_methods_size = raw::uleb128(&mut input)?;

        // element i of the static values array belongs to static field i;
        // missing values mean zero/null, extra values are discarded
        let static_values = if class_def.static_values_off != 0
            && !config.contains(Config::SKIP_FIELD_CONSTANT)
        {
            let mut values_input = raw::slice_at(&self.data, class_def.static_values_off as usize)?;
            read_encoded_array(self, &mut values_input)?
        } else {
            Vec::new()
        };

        let mut field_index = 0u32;
        for position in 0..static_fields_size {
            field_index = field_index.wrapping_add(raw::uleb128(&mut input)?);
            let access_flags = AccessFlags::from_bits_truncate(raw::uleb128(&mut input)?);
            self.accept_field(
                field_index,
                access_flags,
                static_values.get(position as usize),
                directory,
                cv,
            )?;
        }

        let mut field_index = 0u32;
        for _ in 0..instance_fields_size {
            field_index = field_index.wrapping_add(raw::uleb128(&mut input)?);
            let access_flags = AccessFlags::from_bits_truncate(raw::uleb128(&mut input)?);
            self.accept_field(field_index, access_flags, None, directory, cv)?;
        }

        self.accept_method_group(direct_methods_size, &mut input, directory, cv, config)?;
        self.accept_method_group(virtual_methods_size, &mut input, directory, cv, config)?;

        Ok(())
    }

    fn accept_field(
        &self,
        index: u32,
        access_flags: AccessFlags,
        value: Option<&EncodedValue>,
        directory: &AnnotationDirectory,
        cv: &mut dyn DexClassVisitor,
    ) -> Result<(), DexError> {
        let field = self.get_field(index)?;
        let Some(fv) = cv.visit_field(access_flags, &field, value) else {
            return Ok(());
        };

        if let Some(set_off) = directory.field_set(index) {
            for item_off in annotations::read_set_offsets(self, set_off)? {
                let item = annotations::open_annotation(self, item_off)?;
                if let Some(av) = fv.visit_annotation(&item.type_descriptor, item.visibility) {
                    item.accept_elements(self, av)?;
                }
            }
        }

        fv.visit_end();

        Ok(())
    }

    fn accept_method_group(
        &self,
        count: u32,
        input: &mut &[u8],
        directory: &AnnotationDirectory,
        cv: &mut dyn DexClassVisitor,
        config: Config,
    ) -> Result<(), DexError> {
        let mut method_index = 0u32;

        for position in 0..count {
            let diff = raw::uleb128(input)?;
            let access_flags = AccessFlags::from_bits_truncate(raw::uleb128(input)?);
            let code_off = raw::uleb128(input)?;
            method_index = method_index.wrapping_add(diff);

            // a zero diff after the first entry repeats the previous
            // method id
            if position > 0 && diff == 0 {
                warn!("duplicated method (index {method_index}) in class data");
                if !config.contains(Config::KEEP_ALL_METHODS) {
                    continue;
                }
            }

            self.accept_method(method_index, access_flags, code_off, directory, cv, config)?;
        }

        Ok(())
    }

    fn accept_method(
        &self,
        index: u32,
        access_flags: AccessFlags,
        code_off: u32,
        directory: &AnnotationDirectory,
        cv: &mut dyn DexClassVisitor,
        config: Config,
    ) -> Result<(), DexError> {
        let method = self.get_method(index)?;

        if (method.name == "<init>" || method.name == "<clinit>")
            && !access_flags.is_constructor()
        {
            warn!(
                "method {}->{} is named like a constructor but lacks ACC_CONSTRUCTOR",
                method.owner, method.name
            );
        }

        let Some(mv) = cv.visit_method(access_flags, &method) else {
            return Ok(());
        };

        if let Some(set_off) = directory.method_set(index) {
            for item_off in annotations::read_set_offsets(self, set_off)? {
                let item = annotations::open_annotation(self, item_off)?;
                if let Some(av) = mv.visit_annotation(&item.type_descriptor, item.visibility) {
                    item.accept_elements(self, av)?;
                }
            }
        }

        if let Some(list_off) = directory.parameter_list(index) {
            let set_offsets = annotations::read_set_ref_list(self, list_off)?;
            for (parameter, set_off) in set_offsets.iter().enumerate() {
                if *set_off == 0 {
                    continue;
                }
                for item_off in annotations::read_set_offsets(self, *set_off)? {
                    let item = annotations::open_annotation(self, item_off)?;
                    if let Some(av) =
                        mv.visit_parameter_annotation(parameter, &item.type_descriptor, item.visibility)
                    {
                        item.accept_elements(self, av)?;
                    }
                }
            }
        }

        if code_off != 0 {
            let skip_code = config.contains(Config::SKIP_CODE)
                && !(config.contains(Config::KEEP_CLINIT) && method.name == "<clinit>");
            if !skip_code {
                if let Some(dcv) = mv.visit_code() {
                    accept_code(
                        self,
                        config,
                        code_off,
                        &method,
                        access_flags.is_static(),
                        dcv,
                    )
                    .map_err(|source| DexError::Method {
                        owner: method.owner.clone(),
                        name: method.name.clone(),
                        code_off,
                        source: Box::new(source),
                    })?;
                }
            }
        }

        mv.visit_end();

        Ok(())
    }
}
