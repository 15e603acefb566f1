use std::path::PathBuf;

use anyhow::{Context, Result};
use dexpipe::{
    AccessFlags, CatchHandler, Config, ConstValue, DexAnnotationVisitor, DexClassVisitor,
    DexCodeVisitor, DexContainer, DexDebugVisitor, DexFieldVisitor, DexFileVisitor,
    DexMethodVisitor, EncodedValue, FieldRef, FillArrayData, Label, MethodRef, Op, Visibility,
};

/// Prints the whole event stream in a smali-ish layout.
struct Printer;

fn flags(access_flags: AccessFlags) -> String {
    access_flags
        .iter_names()
        .map(|(name, _)| name.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

impl DexFileVisitor for Printer {
    fn visit_class(
        &mut self,
        access_flags: AccessFlags,
        name: &str,
        superclass: Option<&str>,
        interfaces: &[String],
    ) -> Option<&mut dyn DexClassVisitor> {
        println!(".class {} {}", flags(access_flags), name);
        if let Some(superclass) = superclass {
            println!(".super {superclass}");
        }
        for interface in interfaces {
            println!(".implements {interface}");
        }
        Some(self)
    }
}

impl DexClassVisitor for Printer {
    fn visit_source(&mut self, file: &str) {
        println!(".source \"{file}\"");
    }

    fn visit_annotation(
        &mut self,
        type_descriptor: &str,
        visibility: Visibility,
    ) -> Option<&mut dyn DexAnnotationVisitor> {
        println!("  .annotation {visibility:?} {type_descriptor}");
        Some(self)
    }

    fn visit_field(
        &mut self,
        access_flags: AccessFlags,
        field: &FieldRef,
        value: Option<&EncodedValue>,
    ) -> Option<&mut dyn DexFieldVisitor> {
        match value {
            Some(value) => println!(
                "  .field {} {}:{} = {value:?}",
                flags(access_flags),
                field.name,
                field.descriptor
            ),
            None => println!(
                "  .field {} {}:{}",
                flags(access_flags),
                field.name,
                field.descriptor
            ),
        }
        Some(self)
    }

    fn visit_method(
        &mut self,
        access_flags: AccessFlags,
        method: &MethodRef,
    ) -> Option<&mut dyn DexMethodVisitor> {
        println!(
            "  .method {} {}({}){}",
            flags(access_flags),
            method.name,
            method.parameter_types.join(""),
            method.return_type
        );
        Some(self)
    }

    fn visit_end(&mut self) {
        println!(".end class");
        println!();
    }
}

impl DexFieldVisitor for Printer {
    fn visit_annotation(
        &mut self,
        type_descriptor: &str,
        visibility: Visibility,
    ) -> Option<&mut dyn DexAnnotationVisitor> {
        println!("    .annotation {visibility:?} {type_descriptor}");
        Some(self)
    }
}

impl DexMethodVisitor for Printer {
    fn visit_annotation(
        &mut self,
        type_descriptor: &str,
        visibility: Visibility,
    ) -> Option<&mut dyn DexAnnotationVisitor> {
        println!("    .annotation {visibility:?} {type_descriptor}");
        Some(self)
    }

    fn visit_parameter_annotation(
        &mut self,
        index: usize,
        type_descriptor: &str,
        visibility: Visibility,
    ) -> Option<&mut dyn DexAnnotationVisitor> {
        println!("    .param {index} .annotation {visibility:?} {type_descriptor}");
        Some(self)
    }

    fn visit_code(&mut self) -> Option<&mut dyn DexCodeVisitor> {
        Some(self)
    }

    fn visit_end(&mut self) {
        println!("  .end method");
    }
}

impl DexAnnotationVisitor for Printer {
    fn visit_element(&mut self, name: &str, value: &EncodedValue) {
        println!("      {name} = {value:?}");
    }
}

impl DexCodeVisitor for Printer {
    fn visit_register(&mut self, registers: u16) {
        println!("    .registers {registers}");
    }

    fn visit_label(&mut self, label: Label) {
        println!("    :L{:04x}", label.0);
    }

    fn visit_try_catch(&mut self, start: Label, end: Label, handlers: &[CatchHandler]) {
        for handler in handlers {
            println!(
                "    .catch {} {{ :L{:04x} .. :L{:04x} }} :L{:04x}",
                handler.exception_type.as_deref().unwrap_or("<any>"),
                start.0,
                end.0,
                handler.handler.0
            );
        }
    }

    fn visit_stmt0r(&mut self, op: Op) {
        println!("      {op}");
    }

    fn visit_stmt1r(&mut self, op: Op, a: u16) {
        println!("      {op} v{a}");
    }

    fn visit_stmt2r(&mut self, op: Op, a: u16, b: u16) {
        println!("      {op} v{a}, v{b}");
    }

    fn visit_stmt3r(&mut self, op: Op, a: u16, b: u16, c: u16) {
        println!("      {op} v{a}, v{b}, v{c}");
    }

    fn visit_stmt2r1n(&mut self, op: Op, a: u16, b: u16, literal: i32) {
        println!("      {op} v{a}, v{b}, #{literal}");
    }

    fn visit_const_stmt(&mut self, op: Op, register: u16, value: &ConstValue) {
        println!("      {op} v{register}, {value:?}");
    }

    fn visit_field_stmt(
        &mut self,
        op: Op,
        value_register: u16,
        object_register: Option<u16>,
        field: &FieldRef,
    ) {
        match object_register {
            Some(object) => println!(
                "      {op} v{value_register}, v{object}, {}->{}:{}",
                field.owner, field.name, field.descriptor
            ),
            None => println!(
                "      {op} v{value_register}, {}->{}:{}",
                field.owner, field.name, field.descriptor
            ),
        }
    }

    fn visit_type_stmt(&mut self, op: Op, a: u16, b: Option<u16>, type_descriptor: &str) {
        match b {
            Some(b) => println!("      {op} v{a}, v{b}, {type_descriptor}"),
            None => println!("      {op} v{a}, {type_descriptor}"),
        }
    }

    fn visit_jump_stmt(&mut self, op: Op, registers: &[u16], target: Label) {
        let rendered: Vec<String> = registers.iter().map(|r| format!("v{r}")).collect();
        println!("      {op} {} :L{:04x}", rendered.join(", "), target.0);
    }

    fn visit_method_stmt(&mut self, op: Op, registers: &[u16], method: &MethodRef) {
        let rendered: Vec<String> = registers.iter().map(|r| format!("v{r}")).collect();
        println!(
            "      {op} {{{}}}, {}->{}({}){}",
            rendered.join(", "),
            method.owner,
            method.name,
            method.parameter_types.join(""),
            method.return_type
        );
    }

    fn visit_filled_new_array_stmt(&mut self, op: Op, registers: &[u16], type_descriptor: &str) {
        let rendered: Vec<String> = registers.iter().map(|r| format!("v{r}")).collect();
        println!("      {op} {{{}}}, {type_descriptor}", rendered.join(", "));
    }

    fn visit_fill_array_data_stmt(&mut self, op: Op, register: u16, data: &FillArrayData) {
        println!("      {op} v{register}, {data:?}");
    }

    fn visit_packed_switch_stmt(
        &mut self,
        op: Op,
        register: u16,
        first_key: i32,
        targets: &[Label],
    ) {
        let rendered: Vec<String> = targets.iter().map(|l| format!(":L{:04x}", l.0)).collect();
        println!(
            "      {op} v{register}, first={first_key}, [{}]",
            rendered.join(", ")
        );
    }

    fn visit_sparse_switch_stmt(&mut self, op: Op, register: u16, keys: &[i32], targets: &[Label]) {
        let rendered: Vec<String> = keys
            .iter()
            .zip(targets)
            .map(|(key, label)| format!("{key} -> :L{:04x}", label.0))
            .collect();
        println!("      {op} v{register}, [{}]", rendered.join(", "));
    }

    fn visit_bad_op(&mut self, offset: u32, opcode: u8) {
        println!("      <bad opcode {opcode:#04x} at unit {offset:#x}>");
    }

    fn visit_debug(&mut self) -> Option<&mut dyn DexDebugVisitor> {
        Some(self)
    }
}

impl DexDebugVisitor for Printer {
    fn visit_parameter_name(&mut self, index: usize, name: Option<&str>) {
        println!("    .param {index}, {}", name.unwrap_or("<unnamed>"));
    }

    fn visit_start_local(
        &mut self,
        register: u16,
        label: Label,
        name: Option<&str>,
        type_descriptor: Option<&str>,
        _signature: Option<&str>,
    ) {
        println!(
            "    .local v{register} {}:{} at :L{:04x}",
            name.unwrap_or("?"),
            type_descriptor.unwrap_or("?"),
            label.0
        );
    }

    fn visit_end_local(&mut self, register: u16, label: Label) {
        println!("    .end local v{register} at :L{:04x}", label.0);
    }

    fn visit_restart_local(&mut self, register: u16, label: Label) {
        println!("    .restart local v{register} at :L{:04x}", label.0);
    }

    fn visit_line_number(&mut self, line: i32, label: Label) {
        println!("    .line {line} at :L{:04x}", label.0);
    }

    fn visit_prologue(&mut self, label: Label) {
        println!("    .prologue at :L{:04x}", label.0);
    }

    fn visit_epilogue(&mut self, label: Label) {
        println!("    .epilogue at :L{:04x}", label.0);
    }
}

pub(crate) fn command_dump(path: &PathBuf, config: Config) -> Result<()> {
    let container = DexContainer::from_path(path)
        .with_context(|| format!("got error while opening {:?}", path))?;

    container
        .accept(&mut Printer, config)
        .with_context(|| format!("got error while reading {:?}", path))?;

    Ok(())
}
