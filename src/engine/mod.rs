//! External download engine interface
//!
//! The engine performs the actual media fetching and muxing; the core only
//! consumes this narrow capability set and its progress stream.

pub mod models;
pub mod traits;

pub use models::{
    EngineStatus, Metadata, PlaylistEntry, ProgressEvent, StartOptions, VideoFormat,
};
pub use traits::EngineClient;
