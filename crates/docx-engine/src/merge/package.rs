//! Reading and writing the zip container of a `.docx`

use std::io::{Cursor, Read, Write};

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::EngineError;

/// One entry of a package, in archive order
#[derive(Debug, Clone)]
pub(crate) struct PackageEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub is_dir: bool,
}

pub(crate) fn read_package(bytes: &[u8]) -> Result<Vec<PackageEntry>, EngineError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        let mut data = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut data)
            .map_err(|e| EngineError::Generation(format!("reading {}: {}", file.name(), e)))?;
        entries.push(PackageEntry {
            name: file.name().to_string(),
            is_dir: file.is_dir(),
            data,
        });
    }
    Ok(entries)
}

pub(crate) fn write_entries(entries: &[PackageEntry]) -> Result<Vec<u8>, EngineError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    for entry in entries {
        if entry.is_dir {
            writer.add_directory(entry.name.as_str(), options)?;
            continue;
        }
        writer.start_file(entry.name.as_str(), options)?;
        writer
            .write_all(&entry.data)
            .map_err(|e| EngineError::Generation(format!("writing {}: {}", entry.name, e)))?;
    }
    Ok(writer.finish()?.into_inner())
}

/// Build a package from `(name, contents)` pairs
pub fn write_package<N, D>(parts: &[(N, D)]) -> Result<Vec<u8>, EngineError>
where
    N: AsRef<str>,
    D: AsRef<[u8]>,
{
    let entries: Vec<PackageEntry> = parts
        .iter()
        .map(|(name, data)| PackageEntry {
            name: name.as_ref().to_string(),
            data: data.as_ref().to_vec(),
            is_dir: false,
        })
        .collect();
    write_entries(&entries)
}

/// Read one part of a package as UTF-8, `None` when absent
pub fn read_part(docx: &[u8], name: &str) -> Result<Option<String>, EngineError> {
    let mut archive = ZipArchive::new(Cursor::new(docx))?;
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut text = String::new();
    file.read_to_string(&mut text)
        .map_err(|e| EngineError::Generation(format!("reading {}: {}", name, e)))?;
    Ok(Some(text))
}
