use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde_json::json;

const GLB_MAGIC: u32 = 0x4654_6c67; // "glTF"
const GLB_VERSION: u32 = 2;
const CHUNK_JSON: u32 = 0x4e4f_534a;
const CHUNK_BIN: u32 = 0x004e_4942;
const GL_FLOAT: u32 = 5126;
const GL_ARRAY_BUFFER: u32 = 34962;
const MODE_POINTS: u32 = 0;

/// Write world-space points as a binary glTF with a single POINTS primitive.
pub fn write_glb(points: &[[f32; 3]], path: &Path) -> Result<()> {
    let bytes = encode_glb(points)?;
    fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
}

fn encode_glb(points: &[[f32; 3]]) -> Result<Vec<u8>> {
    let mut bin = Vec::with_capacity(points.len() * 12);
    let mut min = [f32::INFINITY; 3];
    let mut max = [f32::NEG_INFINITY; 3];
    for point in points {
        for ((lo, hi), value) in min.iter_mut().zip(max.iter_mut()).zip(point) {
            *lo = lo.min(*value);
            *hi = hi.max(*value);
            bin.extend_from_slice(&value.to_le_bytes());
        }
    }
    if points.is_empty() {
        min = [0.0; 3];
        max = [0.0; 3];
    }

    let mut accessor = json!({
        "bufferView": 0,
        "componentType": GL_FLOAT,
        "count": points.len(),
        "type": "VEC3",
        "min": min,
        "max": max,
    });
    let mut document = json!({
        "asset": { "version": "2.0", "generator": "stereo-depth" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "mesh": 0 }],
        "meshes": [{
            "primitives": [{ "attributes": { "POSITION": 0 }, "mode": MODE_POINTS }]
        }],
        "buffers": [{ "byteLength": bin.len() }],
        "bufferViews": [{
            "buffer": 0,
            "byteOffset": 0,
            "byteLength": bin.len(),
            "target": GL_ARRAY_BUFFER
        }],
    });
    // Zero-length buffer views are invalid glTF; an empty cloud has no accessor data.
    if points.is_empty() {
        accessor
            .as_object_mut()
            .ok_or_else(|| anyhow!("accessor is not an object"))?
            .remove("bufferView");
        if let Some(doc) = document.as_object_mut() {
            doc.remove("bufferViews");
            doc.remove("buffers");
        }
    }
    document["accessors"] = json!([accessor]);

    let mut json_chunk = serde_json::to_vec(&document)?;
    pad_to_four(&mut json_chunk, b' ');
    pad_to_four(&mut bin, 0);

    let mut total = 12 + 8 + json_chunk.len();
    if !bin.is_empty() {
        total += 8 + bin.len();
    }
    let total = u32::try_from(total).map_err(|_| anyhow!("glb exceeds 4 GiB"))?;

    let mut out = Vec::with_capacity(total as usize);
    out.extend_from_slice(&GLB_MAGIC.to_le_bytes());
    out.extend_from_slice(&GLB_VERSION.to_le_bytes());
    out.extend_from_slice(&total.to_le_bytes());
    out.extend_from_slice(&(json_chunk.len() as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_JSON.to_le_bytes());
    out.extend_from_slice(&json_chunk);
    if !bin.is_empty() {
        out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        out.extend_from_slice(&CHUNK_BIN.to_le_bytes());
        out.extend_from_slice(&bin);
    }
    Ok(out)
}

fn pad_to_four(bytes: &mut Vec<u8>, fill: u8) {
    while bytes.len() % 4 != 0 {
        bytes.push(fill);
    }
}
