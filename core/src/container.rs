use std::fs;
use std::path::Path;

use dexpipe_dex::{Config, Dex, DexFileVisitor};
use dexpipe_zip::ZipEntry;
use log::debug;

use crate::errors::ContainerError;

/// The input surface: a bare dex image, or an APK/zip whose `*.dex`
/// members are parsed as independent sub-readers and concatenated into
/// the same visitor in archive order.
#[derive(Debug)]
pub struct DexContainer {
    dexes: Vec<Dex>,
}

impl DexContainer {
    pub fn new(input: Vec<u8>) -> Result<DexContainer, ContainerError> {
        if input.len() < 3 {
            return Err(ContainerError::FileTooSmall);
        }

        if input.starts_with(b"dex\n") {
            return Ok(DexContainer {
                dexes: vec![Dex::new(input)?],
            });
        }

        if input.starts_with(b"PK") {
            let zip = ZipEntry::new(input)?;
            let members: Vec<String> = zip
                .namelist()
                .filter(|name| name.ends_with(".dex"))
                .map(str::to_owned)
                .collect();

            if members.is_empty() {
                return Err(ContainerError::NoDexFound);
            }

            let mut dexes = Vec::with_capacity(members.len());
            for member in members {
                debug!("reading archive member {member}");
                let (data, _) = zip.read(&member)?;
                dexes.push(Dex::new(data)?);
            }

            return Ok(DexContainer { dexes });
        }

        Err(ContainerError::NotDexOrZip)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<DexContainer, ContainerError> {
        Self::new(fs::read(path)?)
    }

    /// Number of dex images behind this container.
    pub fn dex_count(&self) -> usize {
        self.dexes.len()
    }

    /// The parsed images, in archive order.
    pub fn dexes(&self) -> &[Dex] {
        &self.dexes
    }

    /// Pipe every image through the visitor; `visit_end` fires once.
    ///
    /// Calling this again with another visitor yields an equivalent
    /// event stream, the underlying images are never mutated.
    pub fn accept(
        &self,
        dv: &mut dyn DexFileVisitor,
        config: Config,
    ) -> Result<(), ContainerError> {
        for dex in &self.dexes {
            dex.accept_classes(dv, config)?;
        }
        dv.visit_end();

        Ok(())
    }
}
