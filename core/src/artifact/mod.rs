//! Generated artifacts: the declared-file manifest, the file dependency
//! graph, path safety, and the write → verify → repair loop.

mod dependency;
mod fix_loop;
mod fix_ops;
mod manifest;
mod paths;
mod verifier;

pub use dependency::{ArtifactGraph, DependencyGraphSpec, FileDependencies};
pub use fix_loop::{ArtifactState, FileTask, FixLoop, FixOutcome};
pub use fix_ops::{FixOperation, FIX_TAG};
pub use manifest::{DeclaredOutput, VirtualDirectory};
pub use paths::{extension, normalize_path, PathPolicy};
pub use verifier::{Verifier, VerifyOutcome};
