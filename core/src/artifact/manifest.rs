use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::BuildError;

use super::paths::normalize_path;

/// Declared output structure as produced by a structure stage:
/// `{"Paths": ["relative/path", ...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredOutput {
    #[serde(rename = "Paths", alias = "paths")]
    pub paths: Vec<String>,
}

/// The set of file paths a generation stage may reference or create.
///
/// Established once per run; afterwards only additive merges are possible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VirtualDirectory {
    paths: BTreeSet<String>,
}

impl VirtualDirectory {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let paths = paths
            .into_iter()
            .map(|p| normalize_path(p.as_ref()))
            .filter(|p| !p.is_empty())
            .collect();
        Self { paths }
    }

    pub fn from_declared(declared: &DeclaredOutput) -> Self {
        Self::new(&declared.paths)
    }

    pub fn from_json(text: &str) -> Result<Self, BuildError> {
        let declared: DeclaredOutput = serde_json::from_str(text)?;
        Ok(Self::from_declared(&declared))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(&normalize_path(path))
    }

    /// Paths from `candidates` that are not declared, in input order and
    /// without duplicates. Empty means valid.
    pub fn validate<I, S>(&self, candidates: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = BTreeSet::new();
        candidates
            .into_iter()
            .map(|p| normalize_path(p.as_ref()))
            .filter(|p| !self.paths.contains(p))
            .filter(|p| seen.insert(p.clone()))
            .collect()
    }

    /// Add framework-provided paths.
    pub fn merge_framework<I, S>(&mut self, paths: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.paths.extend(
            paths
                .into_iter()
                .map(|p| normalize_path(p.as_ref()))
                .filter(|p| !p.is_empty()),
        );
    }

    pub fn paths(&self) -> impl Iterator<Item = &String> {
        self.paths.iter()
    }

    pub fn to_declared(&self) -> DeclaredOutput {
        DeclaredOutput {
            paths: self.paths.iter().cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
