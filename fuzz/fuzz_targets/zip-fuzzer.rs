#![no_main]

use dexpipe_zip::ZipEntry;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // must provide at least 8 bytes
    if data.len() < 8 {
        return;
    }

    if let Ok(zip) = ZipEntry::new(data.to_vec()) {
        let names: Vec<String> = zip.namelist().map(str::to_owned).collect();
        for name in names {
            let _ = zip.read(&name);
        }
    }
});
