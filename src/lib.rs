pub mod assembly;
pub mod config;
pub mod error;
pub mod http;
pub mod session;

pub use assembly::{
    Assembler, AssemblyManifest, FfmpegEncoder, FfmpegSettings, FinishedVideo, ManifestEntry,
    Resolution, VideoEncoder,
};
pub use config::Config;
pub use error::AssemblyError;
pub use http::{create_router, AppState, HttpSettings};
pub use session::{Frame, SessionId, SessionState, SessionStats, SessionStore};
