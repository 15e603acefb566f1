use dexpipe::{Config, ContainerError, DexContainer, DexFileVisitor};

/// A header-only dex image with empty id tables.
fn empty_dex() -> Vec<u8> {
    let mut out = vec![0u8; 0x70];
    out[0..8].copy_from_slice(b"dex\n035\0");

    let mut write_u32 = |position: usize, value: u32| {
        out[position..position + 4].copy_from_slice(&value.to_le_bytes());
    };
    write_u32(32, 0x70); // file_size
    write_u32(36, 0x70); // header_size
    write_u32(40, 0x12345678); // endian_tag

    out
}

fn stored_zip(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut locals = Vec::new();

    for (name, content) in files {
        locals.push(out.len() as u32);
        out.extend_from_slice(b"PK\x03\x04");
        out.extend_from_slice(&20u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // stored
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // crc32
        out.extend_from_slice(&(content.len() as u32).to_le_bytes());
        out.extend_from_slice(&(content.len() as u32).to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(content);
    }

    let central_dir_offset = out.len() as u32;
    for ((name, content), local_offset) in files.iter().zip(&locals) {
        out.extend_from_slice(b"PK\x01\x02");
        out.extend_from_slice(&20u16.to_le_bytes());
        out.extend_from_slice(&20u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&(content.len() as u32).to_le_bytes());
        out.extend_from_slice(&(content.len() as u32).to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&local_offset.to_le_bytes());
        out.extend_from_slice(name.as_bytes());
    }
    let central_dir_size = out.len() as u32 - central_dir_offset;

    out.extend_from_slice(b"PK\x05\x06");
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&(files.len() as u16).to_le_bytes());
    out.extend_from_slice(&(files.len() as u16).to_le_bytes());
    out.extend_from_slice(&central_dir_size.to_le_bytes());
    out.extend_from_slice(&central_dir_offset.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());

    out
}

#[derive(Default)]
struct Ends(usize);

impl DexFileVisitor for Ends {
    fn visit_end(&mut self) {
        self.0 += 1;
    }
}

#[test]
fn tiny_input_is_too_small() {
    let error = DexContainer::new(vec![0x00, 0x00, 0x00]).unwrap_err();
    assert!(matches!(error, ContainerError::FileTooSmall));
    assert_eq!(error.to_string(), "File too small");
}

#[test]
fn foreign_magic_is_rejected() {
    let error = DexContainer::new(b"RIFF....wave".to_vec()).unwrap_err();
    assert!(matches!(error, ContainerError::NotDexOrZip));
    assert_eq!(error.to_string(), "the file is not a .dex or zip file");
}

#[test]
fn bare_dex_image() {
    let container = DexContainer::new(empty_dex()).unwrap();
    assert_eq!(container.dex_count(), 1);
}

#[test]
fn archive_members_concatenate_in_order() {
    let dex = empty_dex();
    let archive = stored_zip(&[
        ("classes.dex", dex.as_slice()),
        ("resources.arsc", b"junk"),
        ("classes2.dex", dex.as_slice()),
    ]);

    let container = DexContainer::new(archive).unwrap();
    assert_eq!(container.dex_count(), 2);

    // one visit_end for the whole stream, no matter how many members
    let mut ends = Ends::default();
    container.accept(&mut ends, Config::empty()).unwrap();
    assert_eq!(ends.0, 1);
}

#[test]
fn archive_without_dex_members() {
    let archive = stored_zip(&[("a.txt", b"hello".as_slice())]);
    assert!(matches!(
        DexContainer::new(archive),
        Err(ContainerError::NoDexFound)
    ));
}

#[test]
fn accept_twice_is_legal() {
    let container = DexContainer::new(empty_dex()).unwrap();

    let mut first = Ends::default();
    container.accept(&mut first, Config::empty()).unwrap();
    let mut second = Ends::default();
    container.accept(&mut second, Config::empty()).unwrap();

    assert_eq!(first.0, second.0);
}
