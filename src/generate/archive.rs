//! Zip packaging of a generation run's output files.

use crate::error::GenerateResult;
use crate::generate::GeneratedFile;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Pack generated files into one deflate-compressed zip archive, in order.
pub fn write_zip(files: &[GeneratedFile]) -> GenerateResult<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for file in files {
        writer.start_file(file.name.as_str(), options)?;
        writer.write_all(&file.bytes)?;
    }
    Ok(writer.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn sample_files() -> Vec<GeneratedFile> {
        vec![
            GeneratedFile {
                name: "orders_1.xml".into(),
                bytes: b"<orders/>".to_vec(),
            },
            GeneratedFile {
                name: "orders_2.xml".into(),
                bytes: b"<orders></orders>".to_vec(),
            },
        ]
    }

    #[test]
    fn test_zip_round_trip() {
        let bytes = write_zip(&sample_files()).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);

        let mut entry = archive.by_name("orders_1.xml").unwrap();
        let mut content = Vec::new();
        entry.read_to_end(&mut content).unwrap();
        assert_eq!(content, b"<orders/>");
    }

    #[test]
    fn test_zip_preserves_order() {
        let bytes = write_zip(&sample_files()).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.by_index(0).unwrap().name(), "orders_1.xml");
        assert_eq!(archive.by_index(1).unwrap().name(), "orders_2.xml");
    }

    #[test]
    fn test_empty_run_yields_empty_archive() {
        let bytes = write_zip(&[]).unwrap();
        let archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 0);
    }
}
