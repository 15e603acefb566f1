#![no_main]

use dexpipe_dex::{
    AccessFlags, Config, Dex, DexClassVisitor, DexCodeVisitor, DexFileVisitor, DexMethodVisitor,
    EncodedValue, FieldRef, MethodRef,
};
use libfuzzer_sys::fuzz_target;

/// Visits everything so the whole decoding surface runs.
struct Sink;

impl DexFileVisitor for Sink {
    fn visit_class(
        &mut self,
        _access_flags: AccessFlags,
        _name: &str,
        _superclass: Option<&str>,
        _interfaces: &[String],
    ) -> Option<&mut dyn DexClassVisitor> {
        Some(self)
    }
}

impl DexClassVisitor for Sink {
    fn visit_field(
        &mut self,
        _access_flags: AccessFlags,
        _field: &FieldRef,
        _value: Option<&EncodedValue>,
    ) -> Option<&mut dyn dexpipe_dex::DexFieldVisitor> {
        None
    }

    fn visit_method(
        &mut self,
        _access_flags: AccessFlags,
        _method: &MethodRef,
    ) -> Option<&mut dyn DexMethodVisitor> {
        Some(self)
    }
}

impl DexMethodVisitor for Sink {
    fn visit_code(&mut self) -> Option<&mut dyn DexCodeVisitor> {
        Some(self)
    }
}

impl DexCodeVisitor for Sink {}

fuzz_target!(|data: &[u8]| {
    // must provide at least a header
    if data.len() < 0x70 {
        return;
    }

    if let Ok(dex) = Dex::new(data.to_vec()) {
        let _ = dex.accept(&mut Sink, Config::IGNORE_READ_EXCEPTION);
    }
});
