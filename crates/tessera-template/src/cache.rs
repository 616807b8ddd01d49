/*
 * cache.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Compiled-artifact cache.
//!
//! One artifact per template path, stored as `<stem>_<hash>.<ext>` under the
//! cache directory. Artifacts are rebuilt when their template changes:
//!
//! - no artifact: compile
//! - debug mode: compile when the source is newer than the artifact
//! - production mode: trust an artifact younger than the check interval,
//!   otherwise compare modification times as in debug mode
//!
//! Modification times are a heuristic. Clock skew or edits within the
//! filesystem's timestamp resolution can hide a change; hashing the source
//! would be exact but costs a full read per request.

use crate::compiler::compile;
use crate::config::EngineConfig;
use crate::error::{TemplateError, TemplateResult};
use crate::parser::ParsedTemplate;
use crate::resolver::TemplateResolver;
use rustc_hash::FxHasher;
use std::hash::Hasher;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Hook for an in-memory cache of loaded programs.
///
/// Called after an artifact has been rewritten so that stale copies held by
/// the executing side are dropped.
pub trait ExecutionCache: Send + Sync {
    fn invalidate(&self, artifact_path: &Path);
}

/// Result of [`ArtifactCache::ensure_compiled`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLookup {
    /// Path of the ready-to-execute artifact.
    pub path: PathBuf,
    /// Whether the artifact was (re)written by this call.
    pub recompiled: bool,
}

/// Why an artifact is being rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Staleness {
    Missing,
    UnknownAge,
    SourceNewer,
}

impl Staleness {
    fn as_str(self) -> &'static str {
        match self {
            Staleness::Missing => "no artifact",
            Staleness::UnknownAge => "artifact modification time unavailable",
            Staleness::SourceNewer => "source newer than artifact",
        }
    }
}

/// Maps template paths to compiled artifacts, compiling on demand.
pub struct ArtifactCache {
    cache_dir: PathBuf,
    artifact_extension: String,
    debug: bool,
    check_interval: Duration,
    resolver: Arc<dyn TemplateResolver>,
    execution_cache: Option<Arc<dyn ExecutionCache>>,
}

impl std::fmt::Debug for ArtifactCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactCache")
            .field("cache_dir", &self.cache_dir)
            .field("artifact_extension", &self.artifact_extension)
            .field("debug", &self.debug)
            .field("check_interval", &self.check_interval)
            .finish_non_exhaustive()
    }
}

impl ArtifactCache {
    /// Create a cache using the directory, mode and interval from `config`.
    ///
    /// `resolver` resolves the `extends`/`include` targets of compiled templates.
    pub fn new(config: &EngineConfig, resolver: Arc<dyn TemplateResolver>) -> Self {
        Self {
            cache_dir: config.cache_dir.clone(),
            artifact_extension: config.artifact_extension.trim_start_matches('.').to_string(),
            debug: config.debug,
            check_interval: config.check_interval(),
            resolver,
            execution_cache: None,
        }
    }

    /// Register the cache to invalidate whenever an artifact is rewritten.
    pub fn with_execution_cache(mut self, cache: Arc<dyn ExecutionCache>) -> Self {
        self.execution_cache = Some(cache);
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Artifact location for a template path.
    ///
    /// The name combines the template's file stem with a hash of the full
    /// path (separators normalized to `/`), e.g. `page_3f2a9c0d1b4e5f60.json`.
    pub fn artifact_path(&self, template_path: &Path) -> PathBuf {
        let normalized = template_path.to_string_lossy().replace('\\', "/");
        let mut hasher = FxHasher::default();
        hasher.write(normalized.as_bytes());
        let hash = hasher.finish();

        let stem = template_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "template".to_string());

        self.cache_dir
            .join(format!("{}_{:016x}.{}", stem, hash, self.artifact_extension))
    }

    /// Path of a ready-to-execute artifact for `template_path`.
    pub fn get_compiled_path(&self, template_path: &Path) -> TemplateResult<PathBuf> {
        self.ensure_compiled(template_path).map(|lookup| lookup.path)
    }

    /// Make sure the artifact for `template_path` is fresh, compiling if needed.
    pub fn ensure_compiled(&self, template_path: &Path) -> TemplateResult<CacheLookup> {
        let artifact = self.artifact_path(template_path);

        let Some(reason) = self.staleness(template_path, &artifact)? else {
            return Ok(CacheLookup {
                path: artifact,
                recompiled: false,
            });
        };

        tracing::debug!(
            template = %template_path.display(),
            artifact = %artifact.display(),
            reason = reason.as_str(),
            "Recompiling template"
        );
        self.recompile(template_path, &artifact)?;

        Ok(CacheLookup {
            path: artifact,
            recompiled: true,
        })
    }

    fn staleness(
        &self,
        template_path: &Path,
        artifact: &Path,
    ) -> TemplateResult<Option<Staleness>> {
        let artifact_meta = match std::fs::metadata(artifact) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Some(Staleness::Missing));
            }
            Err(e) => return Err(TemplateError::cache_io(artifact, e)),
        };
        let artifact_mtime = match artifact_meta.modified() {
            Ok(mtime) => mtime,
            Err(e) => {
                tracing::warn!(
                    artifact = %artifact.display(),
                    error = %e,
                    "Artifact has no readable modification time; recompiling"
                );
                return Ok(Some(Staleness::UnknownAge));
            }
        };

        if !self.debug {
            // A future-dated artifact counts as just written.
            let age = SystemTime::now()
                .duration_since(artifact_mtime)
                .unwrap_or(Duration::ZERO);
            if age < self.check_interval {
                return Ok(None);
            }
        }

        let source_mtime = std::fs::metadata(template_path)
            .and_then(|meta| meta.modified())
            .map_err(|e| TemplateError::cache_io(template_path, e))?;

        Ok((source_mtime > artifact_mtime).then_some(Staleness::SourceNewer))
    }

    fn recompile(&self, template_path: &Path, artifact: &Path) -> TemplateResult<()> {
        let parsed = ParsedTemplate::parse_file(template_path, &*self.resolver)?;
        let code = compile(&parsed)?.to_code()?;

        std::fs::create_dir_all(&self.cache_dir)
            .map_err(|e| TemplateError::cache_io(&self.cache_dir, e))?;

        // Write beside the target and rename, so readers see either the old
        // artifact or the complete new one.
        let mut file = tempfile::NamedTempFile::new_in(&self.cache_dir)
            .map_err(|e| TemplateError::cache_io(&self.cache_dir, e))?;
        file.write_all(code.as_bytes())
            .map_err(|e| TemplateError::cache_io(file.path(), e))?;
        file.persist(artifact)
            .map_err(|e| TemplateError::cache_io(artifact, e.error))?;

        if let Some(cache) = &self.execution_cache {
            cache.invalidate(artifact);
        }
        Ok(())
    }

    /// Remove every artifact in the cache directory.
    ///
    /// Only files named like artifacts are touched. Stops at the first file
    /// that cannot be removed. Returns the number of removed artifacts.
    pub fn clear(&self) -> TemplateResult<usize> {
        let entries = match std::fs::read_dir(&self.cache_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(TemplateError::cache_io(&self.cache_dir, e)),
        };

        let mut artifacts = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| TemplateError::cache_io(&self.cache_dir, e))?;
            let name = entry.file_name();
            if is_artifact_name(&name.to_string_lossy(), &self.artifact_extension) {
                artifacts.push(entry.path());
            }
        }
        artifacts.sort();

        let mut removed = 0;
        for path in artifacts {
            std::fs::remove_file(&path).map_err(|source| TemplateError::CacheClear {
                path: path.clone(),
                source,
            })?;
            if let Some(cache) = &self.execution_cache {
                cache.invalidate(&path);
            }
            removed += 1;
        }

        tracing::info!(
            cache_dir = %self.cache_dir.display(),
            removed,
            "Cleared compiled templates"
        );
        Ok(removed)
    }
}

/// `<stem>_<16 hex digits>.<extension>`
fn is_artifact_name(name: &str, extension: &str) -> bool {
    let Some(base) = name
        .strip_suffix(extension)
        .and_then(|base| base.strip_suffix('.'))
    else {
        return false;
    };
    match base.rsplit_once('_') {
        Some((stem, hash)) => {
            !stem.is_empty() && hash.len() == 16 && hash.bytes().all(|b| b.is_ascii_hexdigit())
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::resolver::SearchPathResolver;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::sync::Mutex;

    struct Fixture {
        templates: tempfile::TempDir,
        cache_dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                templates: tempfile::tempdir().unwrap(),
                cache_dir: tempfile::tempdir().unwrap(),
            }
        }

        fn write(&self, name: &str, content: &str) -> PathBuf {
            let path = self.templates.path().join(name);
            fs::write(&path, content).unwrap();
            path
        }

        fn cache(&self, debug: bool) -> ArtifactCache {
            let config = EngineConfig::new()
                .with_search_paths([self.templates.path()])
                .with_cache_dir(self.cache_dir.path())
                .with_debug(debug);
            let resolver = SearchPathResolver::new(config.search_paths.clone(), "html");
            ArtifactCache::new(&config, Arc::new(resolver))
        }
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    fn shift(offset_secs: i64) -> SystemTime {
        let now = SystemTime::now();
        if offset_secs >= 0 {
            now + Duration::from_secs(offset_secs as u64)
        } else {
            now - Duration::from_secs(offset_secs.unsigned_abs())
        }
    }

    #[derive(Default)]
    struct RecordingCache(Mutex<Vec<PathBuf>>);

    impl ExecutionCache for RecordingCache {
        fn invalidate(&self, artifact_path: &Path) {
            self.0.lock().unwrap().push(artifact_path.to_path_buf());
        }
    }

    // ========================================================================
    // Key derivation
    // ========================================================================

    #[test]
    fn test_artifact_name_shape() {
        let fixture = Fixture::new();
        let cache = fixture.cache(false);
        let path = cache.artifact_path(Path::new("/site/templates/page.html"));

        assert_eq!(path.parent(), Some(fixture.cache_dir.path()));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("page_"), "{}", name);
        assert!(name.ends_with(".json"), "{}", name);
        assert!(is_artifact_name(&name, "json"));
    }

    #[test]
    fn test_same_stem_different_paths() {
        let fixture = Fixture::new();
        let cache = fixture.cache(false);
        let a = cache.artifact_path(Path::new("/a/page.html"));
        let b = cache.artifact_path(Path::new("/b/page.html"));
        assert_ne!(a, b);
        assert_eq!(a, cache.artifact_path(Path::new("/a/page.html")));
    }

    #[test]
    fn test_separators_normalized() {
        let fixture = Fixture::new();
        let cache = fixture.cache(false);
        assert_eq!(
            cache.artifact_path(Path::new("a\\page.html")),
            cache.artifact_path(Path::new("a/page.html"))
        );
    }

    #[test]
    fn test_is_artifact_name() {
        assert!(is_artifact_name("page_0123456789abcdef.json", "json"));
        assert!(is_artifact_name("my_page_0123456789abcdef.json", "json"));
        assert!(!is_artifact_name("page_0123456789abcdef.txt", "json"));
        assert!(!is_artifact_name("page_0123.json", "json"));
        assert!(!is_artifact_name("page_0123456789abcdeg.json", "json"));
        assert!(!is_artifact_name("_0123456789abcdef.json", "json"));
        assert!(!is_artifact_name("notes.json", "json"));
    }

    // ========================================================================
    // Staleness
    // ========================================================================

    #[test]
    fn test_first_call_compiles() {
        let fixture = Fixture::new();
        let template = fixture.write("page.html", "Hello {{ name }}");
        let cache = fixture.cache(false);

        let lookup = cache.ensure_compiled(&template).unwrap();
        assert!(lookup.recompiled);
        let code = fs::read_to_string(&lookup.path).unwrap();
        assert!(code.contains("Hello "));

        let again = cache.ensure_compiled(&template).unwrap();
        assert!(!again.recompiled);
        assert_eq!(again.path, lookup.path);
    }

    #[test]
    fn test_production_trusts_young_artifact() {
        let fixture = Fixture::new();
        let template = fixture.write("page.html", "v1");
        let cache = fixture.cache(false);
        let artifact = cache.get_compiled_path(&template).unwrap();

        set_mtime(&template, shift(3600));
        assert!(!cache.ensure_compiled(&template).unwrap().recompiled);

        // Interval elapsed: the newer source is now noticed.
        set_mtime(&artifact, shift(-120));
        assert!(cache.ensure_compiled(&template).unwrap().recompiled);
    }

    #[test]
    fn test_production_old_artifact_unchanged_source() {
        let fixture = Fixture::new();
        let template = fixture.write("page.html", "v1");
        let cache = fixture.cache(false);
        let artifact = cache.get_compiled_path(&template).unwrap();

        set_mtime(&template, shift(-600));
        set_mtime(&artifact, shift(-300));
        assert!(!cache.ensure_compiled(&template).unwrap().recompiled);
    }

    #[test]
    fn test_debug_checks_every_call() {
        let fixture = Fixture::new();
        let template = fixture.write("page.html", "v1");
        set_mtime(&template, shift(-10));
        let cache = fixture.cache(true);
        let artifact = cache.get_compiled_path(&template).unwrap();
        assert!(!cache.ensure_compiled(&template).unwrap().recompiled);

        fs::write(&template, "v2").unwrap();
        set_mtime(&template, shift(3600));
        assert!(cache.ensure_compiled(&template).unwrap().recompiled);
        assert!(fs::read_to_string(artifact).unwrap().contains("v2"));
    }

    #[test]
    fn test_recompile_invalidates_execution_cache() {
        let fixture = Fixture::new();
        let template = fixture.write("page.html", "x");
        let recorder = Arc::new(RecordingCache::default());
        let cache = fixture.cache(true).with_execution_cache(recorder.clone());

        let path = cache.get_compiled_path(&template).unwrap();
        cache.get_compiled_path(&template).unwrap();
        assert_eq!(*recorder.0.lock().unwrap(), vec![path]);
    }

    // ========================================================================
    // Failures
    // ========================================================================

    #[test]
    fn test_missing_source_is_cache_io() {
        let fixture = Fixture::new();
        let cache = fixture.cache(false);
        let err = cache
            .ensure_compiled(&fixture.templates.path().join("gone.html"))
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::CacheIo);
        assert!(err.to_string().contains("gone.html"));
    }

    #[test]
    fn test_syntax_error_leaves_no_artifact() {
        let fixture = Fixture::new();
        let template = fixture.write("bad.html", "{% if x %}open");
        let cache = fixture.cache(false);

        let err = cache.ensure_compiled(&template).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Syntax);
        assert!(!cache.artifact_path(&template).exists());
    }

    #[test]
    fn test_unwritable_cache_dir() {
        let fixture = Fixture::new();
        let template = fixture.write("page.html", "x");
        let blocker = fixture.cache_dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();

        let config = EngineConfig::new().with_cache_dir(blocker.join("sub"));
        let resolver = SearchPathResolver::new([fixture.templates.path()], "html");
        let cache = ArtifactCache::new(&config, Arc::new(resolver));

        let err = cache.ensure_compiled(&template).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::CacheIo);
        assert!(err.to_string().contains("blocker"));
    }

    // ========================================================================
    // Clearing
    // ========================================================================

    #[test]
    fn test_clear_removes_only_artifacts() {
        let fixture = Fixture::new();
        let a = fixture.write("a.html", "a");
        let b = fixture.write("b.html", "b");
        let cache = fixture.cache(false);
        cache.get_compiled_path(&a).unwrap();
        cache.get_compiled_path(&b).unwrap();
        let keep = fixture.cache_dir.path().join("README.txt");
        fs::write(&keep, "keep").unwrap();

        assert_eq!(cache.clear().unwrap(), 2);
        assert!(keep.exists());
        assert!(!cache.artifact_path(&a).exists());
        assert_eq!(cache.clear().unwrap(), 0);
    }

    #[test]
    fn test_clear_missing_dir() {
        let config = EngineConfig::new().with_cache_dir("/nonexistent/tessera/cache");
        let resolver = SearchPathResolver::new(Vec::<PathBuf>::new(), "html");
        let cache = ArtifactCache::new(&config, Arc::new(resolver));
        assert_eq!(cache.clear().unwrap(), 0);
    }

    #[test]
    fn test_clear_stops_at_first_failure() {
        let fixture = Fixture::new();
        let cache = fixture.cache(false);
        // A directory named like an artifact cannot be removed with remove_file.
        let stuck = fixture.cache_dir.path().join("a_0123456789abcdef.json");
        fs::create_dir(&stuck).unwrap();
        let later = fixture.cache_dir.path().join("z_0123456789abcdef.json");
        fs::write(&later, "{}").unwrap();

        let err = cache.clear().unwrap_err();
        assert!(matches!(err, TemplateError::CacheClear { ref path, .. } if *path == stuck));
        assert!(later.exists());
    }
}
