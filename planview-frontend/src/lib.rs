pub mod cli;
pub mod errors;
pub mod loader;
pub mod report;
pub mod svg;

pub use cli::{RenderRequest, run_extract, run_info, run_lod, run_render};
pub use errors::FrontendError;
pub use loader::{LoadedScene, load_scene};
