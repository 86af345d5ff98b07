//! Capture file location and archive unpacking.
//!
//! Captures are often shipped gzip-compressed. Given a capture path, the
//! capture itself is used when present; otherwise a `.gz` archive of it is
//! unpacked next to the archive.

use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;

use super::AcquisitionLog;
use crate::domain::CaptureError;

const ARCHIVE_EXTENSION: &str = "gz";

/// Resolve `path` to a readable, uncompressed capture file.
///
/// - `path` exists and is not an archive → used as is
/// - `path` is an existing `.gz` archive → unpacked beside it
/// - `path.gz` exists → unpacked to `path`
///
/// # Errors
/// [`CaptureError::CaptureNotFound`] if neither the capture nor an archive
/// exists; [`CaptureError::ArchiveUnpackFailed`] if decompression fails.
pub fn locate_capture(path: &Path, log: &mut AcquisitionLog) -> Result<PathBuf, CaptureError> {
    let is_archive = path.extension().is_some_and(|ext| ext == ARCHIVE_EXTENSION);

    if path.is_file() && !is_archive {
        log.record(format!("Using capture {}", path.display()));
        return Ok(path.to_path_buf());
    }

    if path.is_file() && is_archive {
        let target = path.with_extension("");
        unpack(path, &target, log)?;
        return Ok(target);
    }

    let archive = archive_path_for(path);
    if archive.is_file() {
        unpack(&archive, path, log)?;
        return Ok(path.to_path_buf());
    }

    log.record(format!("No capture at {} and no archive {}", path.display(), archive.display()));
    Err(CaptureError::CaptureNotFound(path.to_path_buf()))
}

/// `capture.json` → `capture.json.gz`
fn archive_path_for(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".");
    name.push(ARCHIVE_EXTENSION);
    PathBuf::from(name)
}

fn unpack(archive: &Path, target: &Path, log: &mut AcquisitionLog) -> Result<(), CaptureError> {
    log.record(format!("Unpacking {} -> {}", archive.display(), target.display()));

    let failed = |error: std::io::Error| CaptureError::ArchiveUnpackFailed {
        archive: archive.to_path_buf(),
        error: error.to_string(),
    };

    let input = File::open(archive).map_err(failed)?;
    let mut output = BufWriter::new(File::create(target).map_err(failed)?);

    match decompress(BufReader::new(input), &mut output) {
        Ok(bytes) => {
            log.record(format!("Unpacked {bytes} bytes"));
            Ok(())
        }
        Err(error) => {
            // Do not leave a truncated capture behind for the next run to pick up
            drop(output);
            let _ = std::fs::remove_file(target);
            Err(failed(error))
        }
    }
}

/// Decompress gzip `input` into `output` and flush it.
///
/// Only returns `Ok` once every byte has reached `output`'s sink.
fn decompress<R: Read, W: Write>(input: R, output: &mut W) -> io::Result<u64> {
    let bytes = io::copy(&mut GzDecoder::new(input), output)?;
    output.flush()?;
    Ok(bytes)
}
