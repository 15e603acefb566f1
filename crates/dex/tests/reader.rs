//! End-to-end tests over synthetic dex images.
//!
//! The builder lays the data section out right after the header, so every
//! blob knows its absolute offset the moment it is appended and the id
//! tables can be serialized last.

use dexpipe_dex::{
    AccessFlags, Config, ConstValue, Dex, DexAnnotationVisitor, DexClassVisitor, DexCodeVisitor,
    DexDebugVisitor, DexError, DexFieldVisitor, DexFileVisitor, DexMethodVisitor, EncodedValue,
    FieldRef, Label, MethodRef, Op, Visibility,
};
use simd_adler32::Adler32;

const HEADER_SIZE: usize = 0x70;

#[derive(Default)]
struct DexBuilder {
    strings: Vec<(String, u32)>,
    types: Vec<u32>,
    protos: Vec<[u32; 3]>,
    fields: Vec<(u16, u16, u32)>,
    methods: Vec<(u16, u16, u32)>,
    classes: Vec<[u32; 8]>,
    data: Vec<u8>,
}

fn push_uleb(data: &mut Vec<u8>, mut value: u32) {
    loop {
        let chunk = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            data.push(chunk);
            break;
        }
        data.push(chunk | 0x80);
    }
}

fn shorty_char(descriptor: &str) -> char {
    match descriptor.chars().next().unwrap() {
        'L' | '[' => 'L',
        other => other,
    }
}

impl DexBuilder {
    /// Absolute file offset of the next appended data byte.
    fn cursor(&self) -> u32 {
        (HEADER_SIZE + self.data.len()) as u32
    }

    fn align4(&mut self) {
        while (HEADER_SIZE + self.data.len()) % 4 != 0 {
            self.data.push(0);
        }
    }

    /// Append raw bytes to the data section.
    fn blob(&mut self, bytes: &[u8]) -> u32 {
        let offset = self.cursor();
        self.data.extend_from_slice(bytes);
        offset
    }

    /// Intern a string, appending its `string_data_item` (tests stick to
    /// ascii, where mutf-8 equals utf-8).
    fn string(&mut self, text: &str) -> u32 {
        if let Some(index) = self.strings.iter().position(|(s, _)| s == text) {
            return index as u32;
        }
        let offset = self.cursor();
        push_uleb(&mut self.data, text.encode_utf16().count() as u32);
        self.data.extend_from_slice(text.as_bytes());
        self.data.push(0);
        self.strings.push((text.to_owned(), offset));
        (self.strings.len() - 1) as u32
    }

    fn type_(&mut self, descriptor: &str) -> u32 {
        let string_index = self.string(descriptor);
        if let Some(index) = self.types.iter().position(|idx| *idx == string_index) {
            return index as u32;
        }
        self.types.push(string_index);
        (self.types.len() - 1) as u32
    }

    fn type_list(&mut self, descriptors: &[&str]) -> u32 {
        if descriptors.is_empty() {
            return 0;
        }
        let indices: Vec<u32> = descriptors.iter().map(|d| self.type_(d)).collect();
        self.align4();
        let offset = self.cursor();
        self.data
            .extend_from_slice(&(indices.len() as u32).to_le_bytes());
        for index in indices {
            self.data.extend_from_slice(&(index as u16).to_le_bytes());
        }
        offset
    }

    fn proto(&mut self, return_type: &str, parameters: &[&str]) -> u32 {
        let mut shorty = String::new();
        shorty.push(shorty_char(return_type));
        for parameter in parameters {
            shorty.push(shorty_char(parameter));
        }
        let shorty_idx = self.string(&shorty);
        let return_idx = self.type_(return_type);
        let parameters_off = self.type_list(parameters);

        let record = [shorty_idx, return_idx, parameters_off];
        if let Some(index) = self.protos.iter().position(|p| *p == record) {
            return index as u32;
        }
        self.protos.push(record);
        (self.protos.len() - 1) as u32
    }

    fn field(&mut self, owner: &str, name: &str, descriptor: &str) -> u32 {
        let owner_idx = self.type_(owner) as u16;
        let type_idx = self.type_(descriptor) as u16;
        let name_idx = self.string(name);
        self.fields.push((owner_idx, type_idx, name_idx));
        (self.fields.len() - 1) as u32
    }

    fn method(&mut self, owner: &str, name: &str, return_type: &str, parameters: &[&str]) -> u32 {
        let owner_idx = self.type_(owner) as u16;
        let proto_idx = self.proto(return_type, parameters) as u16;
        let name_idx = self.string(name);
        self.methods.push((owner_idx, proto_idx, name_idx));
        (self.methods.len() - 1) as u32
    }

    fn code(&mut self, registers: u16, ins: u16, units: &[u16], debug_info_off: u32) -> u32 {
        self.align4();
        let offset = self.cursor();
        self.data.extend_from_slice(&registers.to_le_bytes());
        self.data.extend_from_slice(&ins.to_le_bytes());
        self.data.extend_from_slice(&0u16.to_le_bytes()); // outs_size
        self.data.extend_from_slice(&0u16.to_le_bytes()); // tries_size
        self.data.extend_from_slice(&debug_info_off.to_le_bytes());
        self.data
            .extend_from_slice(&(units.len() as u32).to_le_bytes());
        for unit in units {
            self.data.extend_from_slice(&unit.to_le_bytes());
        }
        offset
    }

    /// `class_data_item` from absolute member indices; methods are
    /// `(method_idx, access_flags, code_off)`.
    fn class_data(
        &mut self,
        static_fields: &[(u32, u32)],
        instance_fields: &[(u32, u32)],
        direct_methods: &[(u32, u32, u32)],
        virtual_methods: &[(u32, u32, u32)],
    ) -> u32 {
        let offset = self.cursor();
        let mut body = Vec::new();

        push_uleb(&mut body, static_fields.len() as u32);
        push_uleb(&mut body, instance_fields.len() as u32);
        push_uleb(&mut body, direct_methods.len() as u32);
        push_uleb(&mut body, virtual_methods.len() as u32);

        for group in [static_fields, instance_fields] {
            let mut previous = 0;
            for (index, flags) in group {
                push_uleb(&mut body, index - previous);
                push_uleb(&mut body, *flags);
                previous = *index;
            }
        }
        for group in [direct_methods, virtual_methods] {
            let mut previous = 0;
            for (index, flags, code_off) in group {
                push_uleb(&mut body, index - previous);
                push_uleb(&mut body, *flags);
                push_uleb(&mut body, *code_off);
                previous = *index;
            }
        }

        self.data.extend_from_slice(&body);
        offset
    }

    #[allow(clippy::too_many_arguments)]
    fn class(
        &mut self,
        name: &str,
        superclass: Option<&str>,
        access_flags: u32,
        interfaces_off: u32,
        source_file: Option<&str>,
        annotations_off: u32,
        class_data_off: u32,
        static_values_off: u32,
    ) {
        let class_idx = self.type_(name);
        let superclass_idx = superclass.map(|s| self.type_(s)).unwrap_or(u32::MAX);
        let source_file_idx = source_file.map(|s| self.string(s)).unwrap_or(u32::MAX);
        self.classes.push([
            class_idx,
            access_flags,
            superclass_idx,
            interfaces_off,
            source_file_idx,
            annotations_off,
            class_data_off,
            static_values_off,
        ]);
    }

    fn build(self) -> Vec<u8> {
        let mut out = vec![0u8; HEADER_SIZE];
        out.extend_from_slice(&self.data);
        while out.len() % 4 != 0 {
            out.push(0);
        }

        let string_ids_off = out.len() as u32;
        for (_, offset) in &self.strings {
            out.extend_from_slice(&offset.to_le_bytes());
        }
        let type_ids_off = out.len() as u32;
        for string_index in &self.types {
            out.extend_from_slice(&string_index.to_le_bytes());
        }
        let proto_ids_off = out.len() as u32;
        for [shorty, ret, parameters] in &self.protos {
            out.extend_from_slice(&shorty.to_le_bytes());
            out.extend_from_slice(&ret.to_le_bytes());
            out.extend_from_slice(&parameters.to_le_bytes());
        }
        let field_ids_off = out.len() as u32;
        for (owner, descriptor, name) in &self.fields {
            out.extend_from_slice(&owner.to_le_bytes());
            out.extend_from_slice(&descriptor.to_le_bytes());
            out.extend_from_slice(&name.to_le_bytes());
        }
        let method_ids_off = out.len() as u32;
        for (owner, proto, name) in &self.methods {
            out.extend_from_slice(&owner.to_le_bytes());
            out.extend_from_slice(&proto.to_le_bytes());
            out.extend_from_slice(&name.to_le_bytes());
        }
        let class_defs_off = out.len() as u32;
        for record in &self.classes {
            for word in record {
                out.extend_from_slice(&word.to_le_bytes());
            }
        }

        out[0..8].copy_from_slice(b"dex\n035\0");
        let file_size = out.len() as u32;

        let mut write_u32 = |position: usize, value: u32| {
            out[position..position + 4].copy_from_slice(&value.to_le_bytes());
        };
        write_u32(32, file_size);
        write_u32(36, HEADER_SIZE as u32);
        write_u32(40, 0x12345678);
        write_u32(56, self.strings.len() as u32);
        write_u32(60, string_ids_off);
        write_u32(64, self.types.len() as u32);
        write_u32(68, type_ids_off);
        write_u32(72, self.protos.len() as u32);
        write_u32(76, proto_ids_off);
        write_u32(80, self.fields.len() as u32);
        write_u32(84, field_ids_off);
        write_u32(88, self.methods.len() as u32);
        write_u32(92, method_ids_off);
        write_u32(96, self.classes.len() as u32);
        write_u32(100, class_defs_off);
        write_u32(104, self.data.len() as u32);
        write_u32(108, HEADER_SIZE as u32);

        let mut adler = Adler32::new();
        adler.write(&out[12..]);
        let checksum = adler.finish();
        out[8..12].copy_from_slice(&checksum.to_le_bytes());

        out
    }
}

/// Flattens the whole visitor stream into one event list.
#[derive(Default)]
struct Recorder {
    events: Vec<String>,
}

impl DexFileVisitor for Recorder {
    fn visit_class(
        &mut self,
        _access_flags: AccessFlags,
        name: &str,
        superclass: Option<&str>,
        interfaces: &[String],
    ) -> Option<&mut dyn DexClassVisitor> {
        self.events
            .push(format!("class {name} super={superclass:?} ifaces={interfaces:?}"));
        Some(self)
    }

    fn visit_end(&mut self) {
        self.events.push("end-file".to_owned());
    }
}

impl DexClassVisitor for Recorder {
    fn visit_source(&mut self, file: &str) {
        self.events.push(format!("source {file}"));
    }

    fn visit_annotation(
        &mut self,
        type_descriptor: &str,
        visibility: Visibility,
    ) -> Option<&mut dyn DexAnnotationVisitor> {
        self.events
            .push(format!("annotation {visibility:?} {type_descriptor}"));
        Some(self)
    }

    fn visit_field(
        &mut self,
        _access_flags: AccessFlags,
        field: &FieldRef,
        value: Option<&EncodedValue>,
    ) -> Option<&mut dyn DexFieldVisitor> {
        self.events.push(format!("field {} {value:?}", field.name));
        Some(self)
    }

    fn visit_method(
        &mut self,
        _access_flags: AccessFlags,
        method: &MethodRef,
    ) -> Option<&mut dyn DexMethodVisitor> {
        self.events.push(format!("method {}", method.name));
        Some(self)
    }

    fn visit_end(&mut self) {
        self.events.push("end-class".to_owned());
    }
}

impl DexFieldVisitor for Recorder {
    fn visit_annotation(
        &mut self,
        type_descriptor: &str,
        visibility: Visibility,
    ) -> Option<&mut dyn DexAnnotationVisitor> {
        self.events
            .push(format!("annotation {visibility:?} {type_descriptor}"));
        Some(self)
    }

    fn visit_end(&mut self) {
        self.events.push("end-field".to_owned());
    }
}

impl DexMethodVisitor for Recorder {
    fn visit_code(&mut self) -> Option<&mut dyn DexCodeVisitor> {
        self.events.push("code".to_owned());
        Some(self)
    }

    fn visit_end(&mut self) {
        self.events.push("end-method".to_owned());
    }
}

impl DexAnnotationVisitor for Recorder {
    fn visit_element(&mut self, name: &str, value: &EncodedValue) {
        self.events.push(format!("element {name} {value:?}"));
    }

    fn visit_end(&mut self) {
        self.events.push("end-annotation".to_owned());
    }
}

impl DexCodeVisitor for Recorder {
    fn visit_register(&mut self, registers: u16) {
        self.events.push(format!("registers {registers}"));
    }

    fn visit_label(&mut self, label: Label) {
        self.events.push(format!("label {}", label.0));
    }

    fn visit_stmt0r(&mut self, op: Op) {
        self.events.push(op.mnemonic().to_owned());
    }

    fn visit_const_stmt(&mut self, op: Op, register: u16, value: &ConstValue) {
        self.events
            .push(format!("{} v{register} {value:?}", op.mnemonic()));
    }

    fn visit_debug(&mut self) -> Option<&mut dyn DexDebugVisitor> {
        Some(self)
    }

    fn visit_end(&mut self) {
        self.events.push("end-code".to_owned());
    }
}

impl DexDebugVisitor for Recorder {
    fn visit_line_number(&mut self, line: i32, label: Label) {
        self.events.push(format!("line {line} at {}", label.0));
    }
}

/// One class with a constant static field, an annotated static field, an
/// instance field, `<init>`, and a duplicated virtual method with code
/// and a line table.
fn sample_dex() -> Vec<u8> {
    let mut b = DexBuilder::default();

    let anno_type = b.type_("La/Anno;");
    let value_name = b.string("value");

    // debug_info: line_start 7, no parameters, one special opcode
    // (adjusted 4: line += 0, address += 0), end
    let foo_debug = b.blob(&[0x07, 0x00, 0x0a + 4, 0x00]);

    let init_code = b.code(1, 1, &[0x000e], 0);
    let foo_code = b.code(1, 1, &[0x0012, 0x000e], foo_debug);

    let f_count = b.field("La/B;", "COUNT", "I");
    let f_name = b.field("La/B;", "name", "Ljava/lang/String;");
    let m_init = b.method("La/B;", "<init>", "V", &[]);
    let m_foo = b.method("La/B;", "foo", "V", &[]);

    // encoded_array [ Int(7) ]
    let static_values = b.blob(&[0x01, 0x04, 0x07]);

    // annotation_item: runtime, La/Anno;, value = Int(3)
    let item = b.blob(&[
        0x01,
        anno_type as u8,
        0x01,
        value_name as u8,
        0x04,
        0x03,
    ]);

    b.align4();
    let set = b.cursor();
    let mut set_bytes = Vec::new();
    set_bytes.extend_from_slice(&1u32.to_le_bytes());
    set_bytes.extend_from_slice(&item.to_le_bytes());
    b.blob(&set_bytes);

    b.align4();
    let directory = b.cursor();
    let mut dir_bytes = Vec::new();
    dir_bytes.extend_from_slice(&set.to_le_bytes()); // class annotations
    dir_bytes.extend_from_slice(&1u32.to_le_bytes()); // one annotated field
    dir_bytes.extend_from_slice(&0u32.to_le_bytes());
    dir_bytes.extend_from_slice(&0u32.to_le_bytes());
    dir_bytes.extend_from_slice(&f_count.to_le_bytes());
    dir_bytes.extend_from_slice(&set.to_le_bytes());
    b.blob(&dir_bytes);

    let interfaces = b.type_list(&["La/Iface;"]);

    let class_data = b.class_data(
        &[(f_count, 0x9)],
        &[(f_name, 0x1)],
        &[(m_init, 0x10001, init_code)],
        &[(m_foo, 0x1, foo_code), (m_foo, 0x1, foo_code)],
    );

    b.class(
        "La/B;",
        Some("Ljava/lang/Object;"),
        0x1,
        interfaces,
        Some("B.java"),
        directory,
        class_data,
        static_values,
    );

    b.build()
}

fn record(config: Config) -> Vec<String> {
    let dex = Dex::new(sample_dex()).unwrap();
    let mut recorder = Recorder::default();
    dex.accept(&mut recorder, config).unwrap();
    recorder.events
}

#[test]
fn full_event_stream() {
    let events = record(Config::empty());
    assert_eq!(
        events,
        vec![
            "class La/B; super=Some(\"Ljava/lang/Object;\") ifaces=[\"La/Iface;\"]",
            "source B.java",
            "annotation Runtime La/Anno;",
            "element value Int(3)",
            "end-annotation",
            "field COUNT Some(Int(7))",
            "annotation Runtime La/Anno;",
            "element value Int(3)",
            "end-annotation",
            "end-field",
            "field name None",
            "end-field",
            "method <init>",
            "code",
            "registers 1",
            "return-void",
            "end-code",
            "end-method",
            "method foo",
            "code",
            "registers 1",
            "line 7 at 0",
            "label 0",
            "const/4 v0 Int(0)",
            "return-void",
            "end-code",
            "end-method",
            "end-class",
            "end-file",
        ]
    );
}

#[test]
fn duplicate_methods_are_skipped_by_default() {
    let default_methods = record(Config::empty())
        .iter()
        .filter(|event| *event == "method foo")
        .count();
    let kept_methods = record(Config::KEEP_ALL_METHODS)
        .iter()
        .filter(|event| *event == "method foo")
        .count();

    assert_eq!(default_methods, 1);
    assert_eq!(kept_methods, 2);
    assert!(default_methods < kept_methods);
}

#[test]
fn skip_code_keeps_the_member_list() {
    let full = record(Config::empty());
    let skipped = record(Config::SKIP_CODE);

    let methods = |events: &[String]| -> Vec<String> {
        events
            .iter()
            .filter(|event| event.starts_with("method "))
            .cloned()
            .collect()
    };
    assert_eq!(methods(&full), methods(&skipped));
    assert!(!skipped.iter().any(|event| event == "code"));
}

#[test]
fn skip_debug_drops_source_and_lines() {
    let events = record(Config::SKIP_DEBUG);

    assert!(!events.iter().any(|event| event.starts_with("source")));
    assert!(!events.iter().any(|event| event.starts_with("line")));
    // code is still decoded
    assert!(events.iter().any(|event| event == "const/4 v0 Int(0)"));
}

#[test]
fn skip_annotation_drops_annotations() {
    let events = record(Config::SKIP_ANNOTATION);
    assert!(!events.iter().any(|event| event.starts_with("annotation")));
}

#[test]
fn skip_field_constant_zips_nothing() {
    let events = record(Config::SKIP_FIELD_CONSTANT);
    assert!(events.iter().any(|event| event == "field COUNT None"));
}

#[test]
fn accepting_twice_yields_the_same_stream() {
    let dex = Dex::new(sample_dex()).unwrap();

    let mut first = Recorder::default();
    dex.accept(&mut first, Config::empty()).unwrap();
    let mut second = Recorder::default();
    dex.accept(&mut second, Config::empty()).unwrap();

    assert_eq!(first.events, second.events);
}

#[test]
fn rejects_tiny_images() {
    assert!(matches!(
        Dex::new(vec![0x00, 0x00, 0x00]),
        Err(DexError::FileTooSmall)
    ));
}

#[test]
fn rejects_foreign_magic() {
    let mut data = vec![0u8; 0x70];
    data[0..4].copy_from_slice(b"RIF\x00");
    assert!(matches!(Dex::new(data), Err(DexError::NotDex)));
}
