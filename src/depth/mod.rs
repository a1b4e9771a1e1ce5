mod backend;
mod backends;
mod loader;
mod prediction;

pub use backend::{DepthBackend, Device, InferenceRequest, ModelLoader, ModelSpec};
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use loader::{BackendLoader, MODEL_FILE_NAME};
pub use prediction::{
    default_intrinsics, DepthMap, Extrinsics, Intrinsics, Prediction, IDENTITY_EXTRINSICS,
};
