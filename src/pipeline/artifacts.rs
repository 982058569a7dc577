//! Artifact persistence
//!
//! One fit produces four parameter artifacts and a manifest, all stamped with
//! the same `fit_id` and stored together under `fits/<fit_id>/`. A fit is
//! written to a staging directory, renamed into place, and published by
//! atomically replacing the `CURRENT` pointer, so a failed fit never touches
//! the previously persisted set. An OS advisory lock on `.fit.lock` keeps a
//! second fit out of the same directory.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use chrono::Utc;
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::classifier::ClassifierParams;
use super::config::PipelineConfig;
use super::context::ScoringContext;
use super::error::{Result, ScoringError};
use super::orchestrator::FitReport;
use super::projector::ProjectorParams;
use super::segmenter::SegmenterParams;
use super::standardizer::StandardizerParams;

/// Bumped whenever the on-disk layout of any artifact changes.
pub const FORMAT_VERSION: u32 = 2;
pub const LOCK_FILE: &str = ".fit.lock";
/// Names the fit directory readers load.
pub const CURRENT_FILE: &str = "CURRENT";
pub const FITS_DIR: &str = "fits";
const STAGING_PREFIX: &str = ".staging-";
const POINTER_TEMP_PREFIX: &str = ".CURRENT-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Standardizer,
    Projector,
    Segmenter,
    Classifier,
    Manifest,
}

impl ArtifactKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            ArtifactKind::Standardizer => "standardizer.json",
            ArtifactKind::Projector => "projector.json",
            ArtifactKind::Segmenter => "segmenter.json",
            ArtifactKind::Classifier => "classifier.json",
            ArtifactKind::Manifest => "manifest.json",
        }
    }
}

/// Common wrapper around every persisted artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<P> {
    pub kind: ArtifactKind,
    pub format_version: u32,
    pub fit_id: String,
    pub created_at: String,
    pub params: P,
}

/// Fit-level metadata stored next to the parameter artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub crate_version: String,
    /// Effective configuration the artifacts were fitted under.
    pub config: PipelineConfig,
    pub report: FitReport,
}

/// Everything read back from an artifact directory.
#[derive(Debug, Clone)]
pub struct LoadedArtifacts {
    pub fit_id: String,
    pub created_at: String,
    pub manifest: Manifest,
    pub standardizer: StandardizerParams,
    pub projector: ProjectorParams,
    pub segmenter: SegmenterParams,
    pub classifier: ClassifierParams,
}

/// New identifier for one fit run: UTC timestamp plus a random suffix.
pub fn new_fit_id() -> String {
    format!(
        "{}-{:08x}",
        Utc::now().format("%Y%m%dT%H%M%SZ"),
        rand::random::<u32>()
    )
}

/// Held for the duration of a fit.
///
/// The OS lock goes away with the file handle, so a fit that is dropped or
/// whose process dies leaves nothing to clean up.
#[derive(Debug)]
pub struct FitLock {
    path: PathBuf,
    file: File,
}

impl FitLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FitLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            log::warn!("could not release fit lock {}: {}", self.path.display(), e);
        }
    }
}

/// Directory-backed artifact store.
///
/// Each fit lives in `fits/<fit_id>/`; the `CURRENT` file names the fit that
/// readers load.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn fits_dir(&self) -> PathBuf {
        self.root.join(FITS_DIR)
    }

    fn fit_dir(&self, fit_id: &str) -> PathBuf {
        self.fits_dir().join(fit_id)
    }

    fn pointer_path(&self) -> PathBuf {
        self.root.join(CURRENT_FILE)
    }

    /// The fit id `CURRENT` points at.
    pub fn current_fit_id(&self) -> Result<String> {
        let path = self.pointer_path();
        let text = fs::read_to_string(&path).map_err(|e| ScoringError::io(&path, e))?;
        let fit_id = text.trim();
        if fit_id.is_empty() || fit_id.contains(&['/', '\\'][..]) || fit_id.starts_with('.') {
            return Err(ScoringError::ArtifactVersionMismatch(format!(
                "{} does not name a fit",
                path.display()
            )));
        }
        Ok(fit_id.to_string())
    }

    /// Path of `kind` in the current fit.
    pub fn path_of(&self, kind: ArtifactKind) -> Result<PathBuf> {
        Ok(self.fit_dir(&self.current_fit_id()?).join(kind.file_name()))
    }

    /// True when the current fit has a manifest.
    pub fn exists(&self) -> bool {
        self.path_of(ArtifactKind::Manifest)
            .map(|path| path.is_file())
            .unwrap_or(false)
    }

    /// Take the single-writer fit lock without waiting.
    pub fn lock(&self) -> Result<FitLock> {
        fs::create_dir_all(&self.root).map_err(|e| ScoringError::io(&self.root, e))?;
        let path = self.root.join(LOCK_FILE);

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| ScoringError::io(&path, e))?;

        if let Err(e) = FileExt::try_lock_exclusive(&file) {
            let contended = e.kind() == ErrorKind::WouldBlock
                || e.raw_os_error() == fs2::lock_contended_error().raw_os_error();
            if !contended {
                return Err(ScoringError::io(&path, e));
            }
            let holder = fs::read_to_string(&path).unwrap_or_default();
            log::warn!(
                "fit lock {} is held ({})",
                path.display(),
                holder.trim()
            );
            return Err(ScoringError::FitInProgress(self.root.clone()));
        }

        file.set_len(0).map_err(|e| ScoringError::io(&path, e))?;
        writeln!(file, "pid={} since={}", std::process::id(), Utc::now().to_rfc3339())
            .map_err(|e| ScoringError::io(&path, e))?;

        Ok(FitLock { path, file })
    }

    /// Persist a fitted context and its report as one artifact set.
    ///
    /// Requires the fit lock of this store. The new set becomes visible in a
    /// single rename of `CURRENT`; until then readers keep the previous one.
    pub fn save(&self, lock: &FitLock, context: &ScoringContext, report: &FitReport) -> Result<()> {
        if lock.path.parent() != Some(self.root.as_path()) {
            return Err(ScoringError::InvalidState(format!(
                "fit lock {} does not guard {}",
                lock.path.display(),
                self.root.display()
            )));
        }

        let fit_id = context.fit_id();
        let created_at = Utc::now().to_rfc3339();
        let fits = self.fits_dir();
        let staging = fits.join(format!("{}{}", STAGING_PREFIX, fit_id));
        let target = self.fit_dir(fit_id);
        fs::create_dir_all(&staging).map_err(|e| ScoringError::io(&staging, e))?;

        let written = self
            .write_staged(&staging, fit_id, &created_at, context, report)
            .and_then(|()| fs::rename(&staging, &target).map_err(|e| ScoringError::io(&target, e)));
        if let Err(e) = written {
            remove_dir_quietly(&staging);
            return Err(e);
        }

        let previous = self.current_fit_id().ok();
        if let Err(e) = self.switch_current(fit_id) {
            remove_dir_quietly(&target);
            return Err(e);
        }
        self.prune(&[Some(fit_id), previous.as_deref()]);

        log::info!("persisted artifact set {} to {}", fit_id, self.root.display());
        Ok(())
    }

    fn switch_current(&self, fit_id: &str) -> Result<()> {
        let pointer = self.pointer_path();
        let temp = self.root.join(format!("{}{}", POINTER_TEMP_PREFIX, fit_id));

        let result = File::create(&temp)
            .and_then(|mut file| {
                writeln!(file, "{}", fit_id)?;
                file.sync_all()
            })
            .map_err(|e| ScoringError::io(&temp, e))
            .and_then(|()| fs::rename(&temp, &pointer).map_err(|e| ScoringError::io(&pointer, e)));
        if result.is_err() {
            let _ = fs::remove_file(&temp);
        }
        result
    }

    /// Remove every fit directory other than `keep`, staging leftovers included.
    fn prune(&self, keep: &[Option<&str>]) {
        let entries = match fs::read_dir(self.fits_dir()) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("could not list {}: {}", self.fits_dir().display(), e);
                return;
            }
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if keep.iter().flatten().any(|kept| *kept == name) {
                continue;
            }
            remove_dir_quietly(&entry.path());
        }
    }

    fn write_staged(
        &self,
        staging: &Path,
        fit_id: &str,
        created_at: &str,
        context: &ScoringContext,
        report: &FitReport,
    ) -> Result<()> {
        let envelope = |kind| (kind, fit_id.to_string(), created_at.to_string());

        write_envelope(staging, envelope(ArtifactKind::Standardizer), context.standardizer())?;
        write_envelope(staging, envelope(ArtifactKind::Projector), context.projector())?;
        write_envelope(staging, envelope(ArtifactKind::Segmenter), context.segmenter())?;
        write_envelope(staging, envelope(ArtifactKind::Classifier), context.classifier())?;

        let manifest = Manifest {
            crate_version: env!("CARGO_PKG_VERSION").to_string(),
            config: context.config().clone(),
            report: report.clone(),
        };
        write_envelope(staging, envelope(ArtifactKind::Manifest), &manifest)
    }

    /// Read every artifact of the current fit and check they belong to it.
    pub fn load(&self) -> Result<LoadedArtifacts> {
        let fit_id = self.current_fit_id()?;
        let dir = self.fit_dir(&fit_id);

        let manifest: Envelope<Manifest> = read_envelope(&dir, ArtifactKind::Manifest)?;
        let standardizer: Envelope<StandardizerParams> =
            read_envelope(&dir, ArtifactKind::Standardizer)?;
        let projector: Envelope<ProjectorParams> = read_envelope(&dir, ArtifactKind::Projector)?;
        let segmenter: Envelope<SegmenterParams> = read_envelope(&dir, ArtifactKind::Segmenter)?;
        let classifier: Envelope<ClassifierParams> = read_envelope(&dir, ArtifactKind::Classifier)?;

        for (kind, other) in [
            (ArtifactKind::Manifest, &manifest.fit_id),
            (ArtifactKind::Standardizer, &standardizer.fit_id),
            (ArtifactKind::Projector, &projector.fit_id),
            (ArtifactKind::Segmenter, &segmenter.fit_id),
            (ArtifactKind::Classifier, &classifier.fit_id),
        ] {
            if *other != fit_id {
                return Err(ScoringError::ArtifactVersionMismatch(format!(
                    "{} belongs to fit {} but {} points at fit {}",
                    kind.file_name(),
                    other,
                    CURRENT_FILE,
                    fit_id
                )));
            }
        }

        Ok(LoadedArtifacts {
            fit_id,
            created_at: manifest.created_at,
            manifest: manifest.params,
            standardizer: standardizer.params,
            projector: projector.params,
            segmenter: segmenter.params,
            classifier: classifier.params,
        })
    }

    /// Load a scoring context, refusing artifacts fitted under a different
    /// configuration than `config`.
    pub fn load_context(&self, config: &PipelineConfig) -> Result<ScoringContext> {
        let loaded = self.load()?;
        if loaded.manifest.config != *config {
            return Err(ScoringError::ArtifactVersionMismatch(format!(
                "configuration changed since fit {}; re-fit to use the new settings",
                loaded.fit_id
            )));
        }

        let context = ScoringContext::new(
            loaded.fit_id,
            loaded.manifest.config,
            loaded.standardizer,
            loaded.projector,
            loaded.segmenter,
            loaded.classifier,
        )?;
        log::info!(
            "loaded artifact set {} from {}",
            context.fit_id(),
            self.root.display()
        );
        Ok(context)
    }
}

fn remove_dir_quietly(dir: &Path) {
    if let Err(e) = fs::remove_dir_all(dir) {
        log::warn!("could not remove {}: {}", dir.display(), e);
    }
}

fn read_envelope<P: DeserializeOwned>(dir: &Path, kind: ArtifactKind) -> Result<Envelope<P>> {
    let path = dir.join(kind.file_name());
    let text = fs::read_to_string(&path).map_err(|e| ScoringError::io(&path, e))?;
    let envelope: Envelope<P> =
        serde_json::from_str(&text).map_err(|e| ScoringError::format(&path, e))?;

    if envelope.kind != kind {
        return Err(ScoringError::ArtifactVersionMismatch(format!(
            "{} holds a {:?} artifact",
            path.display(),
            envelope.kind
        )));
    }
    if envelope.format_version != FORMAT_VERSION {
        return Err(ScoringError::ArtifactVersionMismatch(format!(
            "{} has format version {}, expected {}",
            path.display(),
            envelope.format_version,
            FORMAT_VERSION
        )));
    }
    Ok(envelope)
}

fn write_envelope<P: Serialize>(
    dir: &Path,
    (kind, fit_id, created_at): (ArtifactKind, String, String),
    params: &P,
) -> Result<()> {
    let path = dir.join(kind.file_name());
    let envelope = Envelope {
        kind,
        format_version: FORMAT_VERSION,
        fit_id,
        created_at,
        params,
    };
    let json = serde_json::to_string_pretty(&envelope).map_err(|e| ScoringError::format(&path, e))?;
    fs::write(&path, json).map_err(|e| ScoringError::io(&path, e))
}

/// Process-wide memo of loaded contexts, keyed by artifact directory.
#[derive(Debug, Default)]
pub struct ContextCache {
    contexts: Mutex<HashMap<PathBuf, Arc<ScoringContext>>>,
}

impl ContextCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cache shared by the whole process.
    pub fn global() -> &'static ContextCache {
        static CACHE: OnceLock<ContextCache> = OnceLock::new();
        CACHE.get_or_init(ContextCache::new)
    }

    /// Return the cached context for `store`, loading it on first use.
    pub fn get_or_load(
        &self,
        store: &ArtifactStore,
        config: &PipelineConfig,
    ) -> Result<Arc<ScoringContext>> {
        let mut contexts = self.contexts.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(context) = contexts.get(store.root()) {
            if context.config() != config {
                return Err(ScoringError::ArtifactVersionMismatch(format!(
                    "configuration changed since fit {}; re-fit to use the new settings",
                    context.fit_id()
                )));
            }
            return Ok(Arc::clone(context));
        }

        let context = Arc::new(store.load_context(config)?);
        contexts.insert(store.root().to_path_buf(), Arc::clone(&context));
        Ok(context)
    }

    /// Forget the context for `root`, e.g. after a new fit was persisted there.
    pub fn invalidate(&self, root: &Path) {
        let mut contexts = self.contexts.lock().unwrap_or_else(|e| e.into_inner());
        contexts.remove(root);
    }

    pub fn len(&self) -> usize {
        self.contexts.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_is_exclusive_and_released_on_drop() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());

        let lock = store.lock().unwrap();
        assert!(lock.path().exists());
        assert!(matches!(store.lock(), Err(ScoringError::FitInProgress(_))));

        drop(lock);
        assert!(store.lock().is_ok());
    }

    #[test]
    fn test_leftover_lock_file_does_not_block() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        fs::write(
            dir.path().join(LOCK_FILE),
            "pid=4242 since=2026-01-01T00:00:00+00:00\n",
        )
        .unwrap();

        let lock = store.lock().unwrap();
        let contents = fs::read_to_string(lock.path()).unwrap();
        assert!(contents.starts_with(&format!("pid={} ", std::process::id())));
    }

    #[test]
    fn test_missing_store_fails_to_load() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path().join("nothing-here"));
        assert!(!store.exists());
        assert!(matches!(store.load(), Err(ScoringError::ArtifactIo { .. })));
    }

    #[test]
    fn test_pointer_must_name_a_fit() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        fs::write(dir.path().join(CURRENT_FILE), "../elsewhere\n").unwrap();

        assert!(!store.exists());
        assert!(matches!(
            store.current_fit_id(),
            Err(ScoringError::ArtifactVersionMismatch(_))
        ));
    }

    #[test]
    fn test_wrong_kind_is_rejected() {
        let dir = TempDir::new().unwrap();
        write_envelope(
            dir.path(),
            (ArtifactKind::Segmenter, "fit-a".to_string(), "now".to_string()),
            &serde_json::json!({}),
        )
        .unwrap();
        fs::rename(
            dir.path().join("segmenter.json"),
            dir.path().join("projector.json"),
        )
        .unwrap();

        let err = read_envelope::<serde_json::Value>(dir.path(), ArtifactKind::Projector)
            .unwrap_err();
        assert!(matches!(err, ScoringError::ArtifactVersionMismatch(_)));
    }

    #[test]
    fn test_fit_ids_are_distinct() {
        assert_ne!(new_fit_id(), new_fit_id());
    }
}
