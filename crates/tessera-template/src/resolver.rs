/*
 * resolver.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template name resolution.
//!
//! This module provides the trait and the search-path implementation used to
//! turn a template name (`"layouts/base"`, `"card.html"`) into a file path.

use crate::error::{TemplateError, TemplateResult};
use std::path::{Path, PathBuf};

/// Trait for locating templates by name.
///
/// Used for the entry template of a render as well as every `extends` and
/// `include` target.
pub trait TemplateResolver: Send + Sync {
    /// Resolve a template name to the path of an existing file.
    fn resolve(&self, name: &str) -> TemplateResult<PathBuf>;

    /// Read the source of a resolved template.
    fn read(&self, path: &Path) -> TemplateResult<String> {
        std::fs::read_to_string(path).map_err(|e| TemplateError::cache_io(path, e))
    }
}

/// Resolver that searches an ordered list of root directories.
///
/// Resolution rules:
/// - If the name has no extension, the default extension is appended
/// - Roots are tried in configuration order; the first existing file wins
/// - The returned path is canonicalized when possible
#[derive(Debug, Clone)]
pub struct SearchPathResolver {
    roots: Vec<PathBuf>,
    extension: String,
}

impl SearchPathResolver {
    /// Create a resolver over `roots` (order preserved) with a default extension.
    pub fn new(
        roots: impl IntoIterator<Item = impl Into<PathBuf>>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
            extension: extension.into().trim_start_matches('.').to_string(),
        }
    }

    /// The configured search roots, in precedence order.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// The default template extension (without the leading dot).
    pub fn extension(&self) -> &str {
        &self.extension
    }
}

impl TemplateResolver for SearchPathResolver {
    fn resolve(&self, name: &str) -> TemplateResult<PathBuf> {
        let file_name = with_default_extension(name, &self.extension);

        for root in &self.roots {
            let candidate = root.join(&file_name);
            if candidate.is_file() {
                let resolved = candidate.canonicalize().unwrap_or(candidate);
                tracing::trace!(name, path = %resolved.display(), "Resolved template");
                return Ok(resolved);
            }
        }

        Err(TemplateError::TemplateNotFound {
            name: name.to_string(),
            searched: self.roots.clone(),
        })
    }
}

/// Append `extension` to `name` unless the name already has one.
///
/// # Examples
///
/// ```ignore
/// // "page" + html → "page.html"
/// // "page.txt" + html → "page.txt"
/// // "inc/header" + html → "inc/header.html"
/// ```
pub fn with_default_extension(name: &str, extension: &str) -> PathBuf {
    let path = Path::new(name);
    if path.extension().is_some() || extension.is_empty() {
        path.to_path_buf()
    } else {
        PathBuf::from(format!("{}.{}", name, extension))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use std::fs;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_default_extension() {
        assert_eq!(with_default_extension("page", "html"), PathBuf::from("page.html"));
        assert_eq!(with_default_extension("page.txt", "html"), PathBuf::from("page.txt"));
        assert_eq!(
            with_default_extension("inc/header", "html"),
            PathBuf::from("inc/header.html")
        );
        assert_eq!(with_default_extension("page", ""), PathBuf::from("page"));
    }

    #[test]
    fn test_leading_dot_in_extension_ignored() {
        let resolver = SearchPathResolver::new(Vec::<PathBuf>::new(), ".tpl");
        assert_eq!(resolver.extension(), "tpl");
    }

    #[test]
    fn test_resolves_in_root() {
        let dir = tempfile::tempdir().unwrap();
        let expected = write(dir.path(), "inc/header.html", "h");
        let resolver = SearchPathResolver::new([dir.path()], "html");

        let resolved = resolver.resolve("inc/header").unwrap();
        assert_eq!(resolved, expected.canonicalize().unwrap());
        assert!(resolved.is_absolute());
    }

    #[test]
    fn test_first_root_wins() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        write(first.path(), "page.html", "first");
        write(second.path(), "page.html", "second");
        write(second.path(), "only.html", "second only");

        let resolver = SearchPathResolver::new([first.path(), second.path()], "html");
        let page = resolver.resolve("page").unwrap();
        assert_eq!(fs::read_to_string(page).unwrap(), "first");

        // Falls through to later roots.
        let only = resolver.resolve("only").unwrap();
        assert_eq!(fs::read_to_string(only).unwrap(), "second only");

        let reversed = SearchPathResolver::new([second.path(), first.path()], "html");
        let page = reversed.resolve("page").unwrap();
        assert_eq!(fs::read_to_string(page).unwrap(), "second");
    }

    #[test]
    fn test_directories_do_not_match() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("page.html")).unwrap();
        let resolver = SearchPathResolver::new([dir.path()], "html");
        assert!(resolver.resolve("page").is_err());
    }

    #[test]
    fn test_not_found_lists_roots() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let resolver = SearchPathResolver::new([a.path(), b.path()], "html");

        let err = resolver.resolve("missing").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Resolution);
        let message = err.to_string();
        assert!(message.contains("missing"));
        assert!(message.contains(&a.path().display().to_string()));
        assert!(message.contains(&b.path().display().to_string()));
    }
}
