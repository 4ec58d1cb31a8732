pub mod buffer;
#[cfg(feature = "camera-nokhwa")]
pub mod camera;
pub mod classifier;
pub mod detector;
pub mod normalizer;
pub mod preprocess;
pub mod session;

// Re-exports for convenience
#[cfg(feature = "camera-nokhwa")]
pub use camera::{CameraStream, available_cameras, start_camera_stream};
pub use classifier::OrtSignClassifier;
pub use detector::{LandmarkDetector, OrtLandmarkDetector, start_capture_worker};
pub use session::GestureSession;
