pub mod artifact;
pub mod pipeline;
pub mod retention;

pub use pipeline::UploadPipeline;
pub use retention::LocalDirCleanup;
