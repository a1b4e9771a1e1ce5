use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::depth::Prediction;

const NPY_MAGIC: &[u8] = b"\x93NUMPY";
/// NPY v1.0 pads the header so data starts on this boundary.
const NPY_ALIGN: usize = 64;

/// Encode a little-endian `f32` array as NPY v1.0.
pub fn encode_npy(shape: &[usize], data: &[f32]) -> Result<Vec<u8>> {
    let expected: usize = shape.iter().product();
    if expected != data.len() {
        return Err(anyhow!(
            "array shape {:?} needs {} values, received {}",
            shape,
            expected,
            data.len()
        ));
    }
    let dims = match shape {
        [single] => format!("({},)", single),
        _ => format!(
            "({})",
            shape
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    };
    let mut header = format!(
        "{{'descr': '<f4', 'fortran_order': False, 'shape': {}, }}",
        dims
    );
    // magic + version + u16 length + header + trailing newline
    let unpadded = NPY_MAGIC.len() + 2 + 2 + header.len() + 1;
    let padding = (NPY_ALIGN - unpadded % NPY_ALIGN) % NPY_ALIGN;
    header.push_str(&" ".repeat(padding));
    header.push('\n');
    let header_len =
        u16::try_from(header.len()).map_err(|_| anyhow!("npy header too large"))?;

    let mut out = Vec::with_capacity(unpadded + padding + data.len() * 4);
    out.extend_from_slice(NPY_MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&header_len.to_le_bytes());
    out.extend_from_slice(header.as_bytes());
    for value in data {
        out.extend_from_slice(&value.to_le_bytes());
    }
    Ok(out)
}

/// Write `depth`, `extrinsics` and `intrinsics` arrays as an uncompressed npz.
pub fn write_npz(prediction: &Prediction, path: &Path) -> Result<()> {
    let views = prediction.views();
    let (width, height) = match prediction.depth.first() {
        Some(map) => (map.width as usize, map.height as usize),
        None => return Err(anyhow!("cannot export an empty prediction")),
    };
    if prediction
        .depth
        .iter()
        .any(|map| map.width as usize != width || map.height as usize != height)
    {
        return Err(anyhow!("npz export needs depth maps of equal size"));
    }

    let depth: Vec<f32> = prediction
        .depth
        .iter()
        .flat_map(|map| map.values.iter().copied())
        .collect();
    let extrinsics: Vec<f32> = prediction
        .extrinsics
        .iter()
        .flat_map(|m| m.iter().flatten().copied())
        .collect();
    let intrinsics: Vec<f32> = prediction
        .intrinsics
        .iter()
        .flat_map(|m| m.iter().flatten().copied())
        .collect();

    let entries = [
        ("depth.npy", encode_npy(&[views, height, width], &depth)?),
        (
            "extrinsics.npy",
            encode_npy(&[prediction.extrinsics.len(), 3, 4], &extrinsics)?,
        ),
        (
            "intrinsics.npy",
            encode_npy(&[prediction.intrinsics.len(), 3, 3], &intrinsics)?,
        ),
    ];
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut archive = ZipWriter::new(file);
    // numpy.savez stores members uncompressed
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, data) in &entries {
        archive
            .start_file(*name, options)
            .with_context(|| format!("failed to add {} to {}", name, path.display()))?;
        archive
            .write_all(data)
            .with_context(|| format!("failed to write {} to {}", name, path.display()))?;
    }
    archive
        .finish()
        .with_context(|| format!("failed to finish {}", path.display()))?;
    Ok(())
}
