use std::path::PathBuf;

use anyhow::{Context, Result};
use dexpipe::{
    AccessFlags, Config, DexClassVisitor, DexContainer, DexFieldVisitor, DexFileVisitor,
    DexMethodVisitor, EncodedValue, FieldRef, MethodRef,
};
use walkdir::WalkDir;

#[derive(Default)]
struct Counter {
    classes: usize,
    fields: usize,
    methods: usize,
}

impl DexFileVisitor for Counter {
    fn visit_class(
        &mut self,
        _access_flags: AccessFlags,
        _name: &str,
        _superclass: Option<&str>,
        _interfaces: &[String],
    ) -> Option<&mut dyn DexClassVisitor> {
        self.classes += 1;
        Some(self)
    }
}

impl DexClassVisitor for Counter {
    fn visit_field(
        &mut self,
        _access_flags: AccessFlags,
        _field: &FieldRef,
        _value: Option<&EncodedValue>,
    ) -> Option<&mut dyn DexFieldVisitor> {
        self.fields += 1;
        None
    }

    fn visit_method(
        &mut self,
        _access_flags: AccessFlags,
        _method: &MethodRef,
    ) -> Option<&mut dyn DexMethodVisitor> {
        self.methods += 1;
        None
    }
}

pub(crate) fn command_show(paths: &[PathBuf]) -> Result<()> {
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.path().is_file())
                .filter(|e| {
                    matches!(
                        e.path().extension().and_then(|s| s.to_str()),
                        Some("apk") | Some("dex")
                    )
                })
            {
                show(&entry.path().to_path_buf())?
            }
        } else if path.is_file() {
            show(path)?
        }
    }

    Ok(())
}

fn show(path: &PathBuf) -> Result<()> {
    let container = DexContainer::from_path(path)
        .with_context(|| format!("got error while opening {:?}", path))?;

    let mut counter = Counter::default();
    container
        .accept(&mut counter, Config::SKIP_CODE | Config::SKIP_DEBUG)
        .with_context(|| format!("got error while reading {:?}", path))?;

    println!(
        "{} ({} dex): {} classes, {} fields, {} methods",
        path.display(),
        container.dex_count(),
        counter.classes,
        counter.fields,
        counter.methods
    );

    Ok(())
}
