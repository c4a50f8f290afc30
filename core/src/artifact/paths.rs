use std::collections::HashSet;
use std::path::{Path, PathBuf};

use glob::Pattern;

use crate::config::PathsConfig;
use crate::error::BuildError;

/// Canonical relative form: forward slashes, no leading `/` or `./`, `.` and
/// `..` segments collapsed. `..` that would climb above the root is kept so
/// that [`PathPolicy::check`] can reject it.
pub fn normalize_path(raw: &str) -> String {
    let unified = raw.trim().replace('\\', "/");
    let mut parts: Vec<&str> = Vec::new();
    for seg in unified.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                if matches!(parts.last(), Some(last) if *last != "..") {
                    parts.pop();
                } else {
                    parts.push("..");
                }
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Extension of the last path segment. Dotfiles such as `.env` have none.
pub fn extension(path: &str) -> Option<&str> {
    let name = file_name(path);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
        _ => None,
    }
}

fn parent_dir(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(dir, _)| dir)
}

fn compile(patterns: &[String]) -> Result<Vec<Pattern>, BuildError> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p)
                .map_err(|e| BuildError::invalid_parameter(format!("bad path pattern '{p}': {e}")))
        })
        .collect()
}

/// Where generated files may go, and how dependency tokens resolve.
#[derive(Debug, Clone)]
pub struct PathPolicy {
    root: PathBuf,
    framework: Vec<Pattern>,
    protected_files: HashSet<String>,
    forbidden_dirs: HashSet<String>,
    secrets: Vec<Pattern>,
    index_stem: String,
}

impl PathPolicy {
    pub fn new(root: impl Into<PathBuf>, cfg: &PathsConfig) -> Result<Self, BuildError> {
        Ok(Self {
            root: root.into(),
            framework: compile(&cfg.framework_paths)?,
            protected_files: cfg.protected_files.iter().cloned().collect(),
            forbidden_dirs: cfg.forbidden_dirs.iter().cloned().collect(),
            secrets: compile(&cfg.secret_patterns)?,
            index_stem: cfg.index_stem.clone(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Framework-provided paths are assumed to exist and are exempt from
    /// graph membership and manifest validation.
    pub fn is_framework(&self, path: &str) -> bool {
        let raw = path.trim();
        let normalized = normalize_path(raw);
        self.framework
            .iter()
            .any(|p| p.matches(raw) || p.matches(&normalized))
    }

    /// Resolve a dependency token written in `from`.
    ///
    /// A leading `/` anchors the token at the project root; anything else is
    /// relative to `from`'s directory. A token without an extension names a
    /// directory and resolves to its index file, using `from`'s extension.
    pub fn resolve(&self, from: &str, token: &str) -> String {
        let token = token.trim().replace('\\', "/");
        let from = normalize_path(from);

        let joined = match token.strip_prefix('/') {
            Some(anchored) => anchored.to_string(),
            None => match parent_dir(&from) {
                Some(dir) => format!("{dir}/{token}"),
                None => token,
            },
        };
        let path = normalize_path(&joined);
        if extension(&path).is_some() {
            return path;
        }

        let index = match extension(&from) {
            Some(ext) => format!("{}.{ext}", self.index_stem),
            None => self.index_stem.clone(),
        };
        if path.is_empty() {
            index
        } else {
            format!("{path}/{index}")
        }
    }

    /// Validate a relative path for writing and return its canonical form.
    pub fn check(&self, raw: &str) -> Result<String, BuildError> {
        let path = normalize_path(raw);
        if path.is_empty() {
            return Err(BuildError::path_rejected(format!("'{raw}' is empty")));
        }
        if path.split('/').any(|s| s == "..") {
            return Err(BuildError::path_rejected(format!(
                "'{raw}' escapes the project root"
            )));
        }
        if let Some(dir) = path.split('/').find(|s| self.forbidden_dirs.contains(*s)) {
            return Err(BuildError::path_rejected(format!(
                "'{raw}' is inside forbidden directory '{dir}'"
            )));
        }

        let name = file_name(&path);
        if self.protected_files.contains(name) {
            return Err(BuildError::path_rejected(format!(
                "'{raw}' is a protected project file"
            )));
        }
        if self.secrets.iter().any(|p| p.matches(name)) {
            return Err(BuildError::path_rejected(format!(
                "'{raw}' looks like a secrets file"
            )));
        }
        Ok(path)
    }

    /// Absolute location of a checked relative path.
    pub fn absolute(&self, raw: &str) -> Result<PathBuf, BuildError> {
        let rel = self.check(raw)?;
        Ok(self.root.join(rel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NonRetryableKind;

    fn policy() -> PathPolicy {
        PathPolicy::new("/tmp/project", &PathsConfig::default()).unwrap()
    }

    #[test]
    fn normalization_collapses_segments() {
        assert_eq!(normalize_path("./src//a/../b.ts"), "src/b.ts");
        assert_eq!(normalize_path("\\src\\main.rs"), "src/main.rs");
        assert_eq!(normalize_path("../x"), "../x");
    }

    #[test]
    fn tokens_resolve_relative_to_the_referencing_file() {
        let p = policy();
        assert_eq!(p.resolve("src/App.tsx", "./components/Nav.tsx"), "src/components/Nav.tsx");
        assert_eq!(p.resolve("src/pages/Home.tsx", "../api.ts"), "src/api.ts");
        assert_eq!(p.resolve("src/pages/Home.tsx", "/lib/db.ts"), "lib/db.ts");
    }

    #[test]
    fn extensionless_token_is_a_directory_index() {
        let p = policy();
        assert_eq!(p.resolve("src/App.tsx", "./components"), "src/components/index.tsx");
        assert_eq!(p.resolve("main.go", "."), "index.go");
    }

    #[test]
    fn framework_paths_match_raw_and_normalized() {
        let p = policy();
        assert!(p.is_framework("src/components/ui/button.tsx"));
        assert!(p.is_framework("@/components/ui/card"));
        assert!(!p.is_framework("src/components/Header.tsx"));
    }

    #[test]
    fn unsafe_targets_are_rejected() {
        let p = policy();
        for bad in [
            "../outside.ts",
            "node_modules/x/index.js",
            "package.json",
            "config/.env.local",
            "",
        ] {
            let err = p.check(bad).unwrap_err();
            assert!(
                matches!(
                    err,
                    BuildError::NonRetryable {
                        kind: NonRetryableKind::PathRejected,
                        ..
                    }
                ),
                "{bad} should be rejected"
            );
        }
        assert_eq!(p.check("/src/app.ts").unwrap(), "src/app.ts");
    }
}
