use anyhow::{anyhow, Result};

/// 3×4 world-to-camera transform `[R | t]`.
pub type Extrinsics = [[f32; 4]; 3];
/// 3×3 pinhole camera matrix.
pub type Intrinsics = [[f32; 3]; 3];

pub const IDENTITY_EXTRINSICS: Extrinsics = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
];

/// Row-major depth map for a single view.
#[derive(Clone, Debug, PartialEq)]
pub struct DepthMap {
    pub width: u32,
    pub height: u32,
    pub values: Vec<f32>,
}

impl DepthMap {
    pub fn new(width: u32, height: u32, values: Vec<f32>) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| anyhow!("depth map dimensions overflow"))?;
        if values.len() != expected {
            return Err(anyhow!(
                "depth map {}x{} expects {} values, received {}",
                width,
                height,
                expected,
                values.len()
            ));
        }
        Ok(Self {
            width,
            height,
            values,
        })
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.values[y as usize * self.width as usize + x as usize]
    }
}

/// Model output for one multi-view forward pass.
///
/// For a stereo pair every vector holds two entries, one per view, in input order.
#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
    pub depth: Vec<DepthMap>,
    pub extrinsics: Vec<Extrinsics>,
    pub intrinsics: Vec<Intrinsics>,
}

impl Prediction {
    pub fn views(&self) -> usize {
        self.depth.len()
    }

    /// Check that the prediction covers exactly `views` input images.
    pub fn validate(&self, views: usize) -> Result<()> {
        if self.depth.len() != views {
            return Err(anyhow!(
                "prediction has {} depth maps for {} views",
                self.depth.len(),
                views
            ));
        }
        if self.extrinsics.len() != views {
            return Err(anyhow!(
                "prediction has {} extrinsics for {} views",
                self.extrinsics.len(),
                views
            ));
        }
        if self.intrinsics.len() != views {
            return Err(anyhow!(
                "prediction has {} intrinsics for {} views",
                self.intrinsics.len(),
                views
            ));
        }
        for (idx, map) in self.depth.iter().enumerate() {
            if map.values.len() != map.width as usize * map.height as usize {
                return Err(anyhow!("depth map {} has inconsistent size", idx));
            }
        }
        Ok(())
    }

    /// Unproject every finite, positive depth sample into world coordinates.
    pub fn world_points(&self) -> Result<Vec<[f32; 3]>> {
        let mut points = Vec::new();
        for ((map, extr), intr) in self
            .depth
            .iter()
            .zip(&self.extrinsics)
            .zip(&self.intrinsics)
        {
            let (fx, fy, cx, cy) = (intr[0][0], intr[1][1], intr[0][2], intr[1][2]);
            if fx == 0.0 || fy == 0.0 {
                return Err(anyhow!("intrinsics have zero focal length"));
            }
            for y in 0..map.height {
                for x in 0..map.width {
                    let d = map.get(x, y);
                    if !d.is_finite() || d <= 0.0 {
                        continue;
                    }
                    let cam = [
                        (x as f32 + 0.5 - cx) / fx * d,
                        (y as f32 + 0.5 - cy) / fy * d,
                        d,
                    ];
                    points.push(camera_to_world(extr, cam));
                }
            }
        }
        Ok(points)
    }
}

/// Invert `p_cam = R * p_world + t` for an orthonormal `R`.
fn camera_to_world(extr: &Extrinsics, cam: [f32; 3]) -> [f32; 3] {
    let shifted = [cam[0] - extr[0][3], cam[1] - extr[1][3], cam[2] - extr[2][3]];
    let mut world = [0.0f32; 3];
    for (col, out) in world.iter_mut().enumerate() {
        *out = (0..3).map(|row| extr[row][col] * shifted[row]).sum();
    }
    world
}

/// Pinhole matrix with a square focal length and centred principal point.
pub fn default_intrinsics(width: u32, height: u32) -> Intrinsics {
    let focal = width.max(height) as f32;
    [
        [focal, 0.0, width as f32 / 2.0],
        [0.0, focal, height as f32 / 2.0],
        [0.0, 0.0, 1.0],
    ]
}
