use bincode::{deserialize_from, serialize_into};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{BufReader, BufWriter, Error, ErrorKind};
use std::path::Path;

use crate::workbook::Workbook;

/// Persist a workbook as gzip-compressed bincode
///
/// The file is written next to its final location and renamed into place, so a
/// crash mid-write leaves the previous workbook intact.
pub fn save_workbook(workbook: &Workbook, path: impl AsRef<Path>) -> std::io::Result<()> {
    let path = path.as_ref();
    let staging = path.with_extension("tmp");

    let file = File::create(&staging)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut writer = BufWriter::new(encoder);

    serialize_into(&mut writer, workbook).map_err(|e| Error::new(ErrorKind::Other, e))?;

    let encoder = writer.into_inner().map_err(|e| e.into_error())?;
    encoder.finish()?.sync_all()?;

    std::fs::rename(&staging, path)
}

pub fn load_workbook(path: impl AsRef<Path>) -> std::io::Result<Workbook> {
    let file = File::open(path)?;
    let decoder = GzDecoder::new(file);
    let mut reader = BufReader::new(decoder);

    let workbook: Workbook =
        deserialize_from(&mut reader).map_err(|e| Error::new(ErrorKind::InvalidData, e))?;

    Ok(workbook)
}
