// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module identifier canonicalization

use crate::error::{LoadError, Result};
use crate::module_system::ModuleId;

/// Converts a raw identifier into a canonical id relative to a base module.
///
/// Must be pure: the same inputs always yield the same id.
pub trait PathResolver: Send + Sync {
    /// Resolve `raw` as written inside the module `base`
    fn resolve(&self, raw: &str, base: &ModuleId) -> Result<ModuleId>;
}

/// URL-style resolver.
///
/// Relative identifiers are joined to the directory of the base id,
/// `.` and `..` segments are collapsed, and the configured extension is
/// appended once.
#[derive(Debug, Clone)]
pub struct UrlResolver {
    extension: String,
}

impl UrlResolver {
    /// Create a resolver appending `extension` (e.g. `".js"`)
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
        }
    }

    /// The extension appended to every id
    pub fn extension(&self) -> &str {
        &self.extension
    }

    fn with_extension(&self, path: &str) -> String {
        if self.extension.is_empty() {
            return path.to_string();
        }
        let stem = path.strip_suffix(self.extension.as_str()).unwrap_or(path);
        format!("{}{}", stem, self.extension)
    }
}

impl Default for UrlResolver {
    fn default() -> Self {
        Self::new(".js")
    }
}

impl PathResolver for UrlResolver {
    fn resolve(&self, raw: &str, base: &ModuleId) -> Result<ModuleId> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(LoadError::resolve(raw, "empty module identifier"));
        }

        if raw.starts_with('/') {
            return Err(LoadError::resolve(raw, "root-relative paths are not supported"));
        }

        let joined = if raw.contains("://") {
            raw.to_string()
        } else {
            let base = base.as_str();
            let dir = base.rfind('/').map(|pos| &base[..=pos]).unwrap_or("");
            format!("{}{}", dir, raw)
        };

        let normalized = normalize(&joined).ok_or_else(|| {
            LoadError::resolve(raw, format!("escapes the root of '{}'", base))
        })?;

        Ok(ModuleId::from(self.with_extension(&normalized)))
    }
}

/// Collapse `.`, `..` and empty segments. Returns `None` if `..` climbs
/// above the root (or above the authority of a URL).
fn normalize(path: &str) -> Option<String> {
    let (prefix, rest) = match path.find("://") {
        Some(scheme_end) => {
            let after = scheme_end + 3;
            match path[after..].find('/') {
                Some(slash) => (&path[..after + slash], &path[after + slash + 1..]),
                None => (path, ""),
            }
        }
        None => ("", path),
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in rest.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            s => segments.push(s),
        }
    }

    let joined = segments.join("/");
    Some(match (prefix.is_empty(), joined.is_empty()) {
        (true, _) => joined,
        (false, true) => prefix.to_string(),
        (false, false) => format!("{}/{}", prefix, joined),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(raw: &str, base: &str) -> Result<ModuleId> {
        UrlResolver::default().resolve(raw, &ModuleId::from(base))
    }

    #[test]
    fn test_relative_to_base_directory() {
        assert_eq!(resolve("./a", "app/main.js").unwrap(), "app/a.js");
        assert_eq!(resolve("modules/a", "app/main.js").unwrap(), "app/modules/a.js");
    }

    #[test]
    fn test_parent_segments() {
        assert_eq!(resolve("../lib/x", "app/sub/main.js").unwrap(), "app/lib/x.js");
        assert_eq!(resolve("../../x", "app/sub/main.js").unwrap(), "x.js");
        assert_eq!(resolve("a/../b", "main.js").unwrap(), "b.js");
    }

    #[test]
    fn test_climbing_above_root_fails() {
        assert!(matches!(
            resolve("../x", "main.js"),
            Err(LoadError::Resolve { .. })
        ));
    }

    #[test]
    fn test_root_path_rejected() {
        let err = resolve("/abs/x", "app/main.js").unwrap_err();
        assert!(err.to_string().contains("root-relative"));
    }

    #[test]
    fn test_extension_not_doubled() {
        assert_eq!(resolve("a.js", "app/main.js").unwrap(), "app/a.js");
        let resolver = UrlResolver::new("");
        assert_eq!(
            resolver.resolve("a", &ModuleId::from("app/main")).unwrap(),
            "app/a"
        );
    }

    #[test]
    fn test_url_base() {
        assert_eq!(
            resolve("../x", "http://localhost/app/main.js").unwrap(),
            "http://localhost/x.js"
        );
        assert_eq!(
            resolve("http://cdn.example/lib/y.js", "app/main.js").unwrap(),
            "http://cdn.example/lib/y.js"
        );
        assert!(resolve("../../x", "http://localhost/app/main.js").is_err());
    }

    #[test]
    fn test_empty_identifier() {
        assert!(resolve("  ", "app/main.js").is_err());
    }
}
