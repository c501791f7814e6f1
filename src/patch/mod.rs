pub mod loader;
pub mod types;
pub mod validate;

pub use loader::{load_from_path, load_from_str, LoadError, PatchFormat};
pub use types::{EditFileChunk, Hunk, Patch};
pub use validate::{ordered_chunks, InvalidHunkError, InvalidPatchError, PatchIssue};
