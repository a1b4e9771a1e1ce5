use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

/// Write world-space points as an ASCII PLY vertex list.
pub fn write_ply(points: &[[f32; 3]], path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    write_points(&mut writer, points)
        .and_then(|()| writer.flush())
        .with_context(|| format!("failed to write {}", path.display()))
}

fn write_points<W: Write>(writer: &mut W, points: &[[f32; 3]]) -> std::io::Result<()> {
    writeln!(writer, "ply")?;
    writeln!(writer, "format ascii 1.0")?;
    writeln!(writer, "comment stereo_depth point cloud")?;
    writeln!(writer, "element vertex {}", points.len())?;
    writeln!(writer, "property float x")?;
    writeln!(writer, "property float y")?;
    writeln!(writer, "property float z")?;
    writeln!(writer, "end_header")?;
    for [x, y, z] in points {
        writeln!(writer, "{} {} {}", x, y, z)?;
    }
    Ok(())
}
