//! Assembly of the per-group downloads into a single model input file.

use anyhow::{Context, Result};
use std::fs::File;
use std::io;
use std::path::Path;
use tracing::info;

/// Concatenate GRIB files byte-for-byte into `target`.
///
/// GRIB2 streams are sequences of self-delimiting messages, so plain
/// concatenation yields a decodable file regardless of source boundaries.
/// Returns the total number of bytes written.
pub fn concatenate(inputs: &[&Path], target: &Path) -> Result<u64> {
    let mut out = File::create(target).with_context(|| format!("create {}", target.display()))?;
    let mut total = 0u64;
    for input in inputs {
        let mut file = File::open(input).with_context(|| format!("open {}", input.display()))?;
        total +=
            io::copy(&mut file, &mut out).with_context(|| format!("append {}", input.display()))?;
    }
    info!("assembled {} bytes into {}", total, target.display());
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn output_length_is_sum_of_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.grib2");
        let b = dir.path().join("b.grib2");
        let out = dir.path().join("init.grib2");
        fs::write(&a, b"GRIB-surface-payload").unwrap();
        fs::write(&b, b"GRIB-pressure").unwrap();

        let written = concatenate(&[&a, &b], &out).unwrap();

        let expected = fs::metadata(&a).unwrap().len() + fs::metadata(&b).unwrap().len();
        assert_eq!(written, expected);
        assert_eq!(fs::metadata(&out).unwrap().len(), expected);
        assert_eq!(fs::read(&out).unwrap(), b"GRIB-surface-payloadGRIB-pressure");
    }

    #[test]
    fn missing_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.grib2");
        let out = dir.path().join("init.grib2");
        let err = concatenate(&[&missing], &out).unwrap_err();
        assert!(err.to_string().contains("absent.grib2"));
    }
}
