//! Incremental engine sessions
//!
//! A session remembers, per file, the content digest the engine last analyzed and the
//! issues it reported. It is keyed by the engine's configuration fingerprint: when the
//! fingerprint changes the whole session is dropped and rebuilt.
//!
//! Per-file engines (linters, formatters) only re-run files whose digest changed.
//! Whole-program engines (type checkers) can be affected by any file, so they reuse
//! their cached result only when the file set and every digest are unchanged.
//!
//! Sessions live inside their adapter behind a mutex. With a cache directory
//! configured they are also written to `<cache_dir>/<engine>.json` so that the next
//! process can pick them up.

use crate::quality::{EngineKind, Issue};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// How an engine can absorb changes incrementally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Incremental {
  /// Each file is analyzed independently
  PerFile,
  /// Any change can affect every file
  WholeProgram,
}

/// How much of a session an invocation could reuse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionUse {
  /// No prior state; everything analyzed from scratch
  #[default]
  Cold,
  /// Everything served from the session; the tool was not invoked
  Warm,
  /// Some files served from the session, the rest re-analyzed
  Incremental,
  /// Prior state existed but had to be thrown away
  Rebuilt,
}

impl SessionUse {
  /// Merge the reuse classification of two batches
  pub fn combine(self, other: SessionUse) -> SessionUse {
    match (self, other) {
      (a, b) if a == b => a,
      (SessionUse::Rebuilt, _) | (_, SessionUse::Rebuilt) => SessionUse::Rebuilt,
      _ => SessionUse::Incremental,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileEntry {
  digest: String,
  issues: Vec<Issue>,
}

/// Engine-owned incremental state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSession {
  fingerprint: String,
  files: BTreeMap<PathBuf, FileEntry>,
}

/// What to run and what to reuse for one invocation
#[derive(Debug)]
pub struct SessionPlan {
  pub to_run: Vec<PathBuf>,
  pub reused: Vec<Issue>,
  pub reuse: SessionUse,
}

impl EngineSession {
  pub fn new(fingerprint: impl Into<String>) -> Self {
    Self {
      fingerprint: fingerprint.into(),
      files: BTreeMap::new(),
    }
  }

  pub fn fingerprint(&self) -> &str {
    &self.fingerprint
  }

  pub fn is_empty(&self) -> bool {
    self.files.is_empty()
  }

  /// Decide which files need the tool and which issues can be served from cache
  pub fn plan(&self, files: &[PathBuf], digests: &BTreeMap<PathBuf, String>, mode: Incremental) -> SessionPlan {
    let fresh = |file: &PathBuf| match (self.files.get(file), digests.get(file)) {
      (Some(entry), Some(digest)) => entry.digest == *digest,
      _ => false,
    };

    match mode {
      Incremental::WholeProgram => {
        let requested: BTreeSet<&PathBuf> = files.iter().collect();
        let cached: BTreeSet<&PathBuf> = self.files.keys().collect();
        if !files.is_empty() && requested == cached && files.iter().all(fresh) {
          SessionPlan {
            to_run: Vec::new(),
            reused: self.files.values().flat_map(|e| e.issues.iter().cloned()).collect(),
            reuse: SessionUse::Warm,
          }
        } else {
          SessionPlan {
            to_run: files.to_vec(),
            reused: Vec::new(),
            reuse: if self.is_empty() {
              SessionUse::Cold
            } else {
              SessionUse::Rebuilt
            },
          }
        }
      }
      Incremental::PerFile => {
        let mut to_run = Vec::new();
        let mut reused = Vec::new();
        for file in files {
          if fresh(file) {
            reused.extend(self.files[file].issues.iter().cloned());
          } else {
            to_run.push(file.clone());
          }
        }
        let reuse = if to_run.is_empty() {
          SessionUse::Warm
        } else if to_run.len() == files.len() {
          SessionUse::Cold
        } else {
          SessionUse::Incremental
        };
        SessionPlan { to_run, reused, reuse }
      }
    }
  }

  /// Remember what the tool reported for the files it just analyzed
  pub fn record(&mut self, ran: &[PathBuf], digests: &BTreeMap<PathBuf, String>, issues: &[Issue], mode: Incremental) {
    if mode == Incremental::WholeProgram {
      self.files.clear();
    }
    for file in ran {
      match digests.get(file) {
        Some(digest) => {
          let file_issues = issues.iter().filter(|i| i.file == *file).cloned().collect();
          self.files.insert(
            file.clone(),
            FileEntry {
              digest: digest.clone(),
              issues: file_issues,
            },
          );
        }
        None => {
          self.files.remove(file);
        }
      }
    }
  }

  /// Issues last seen for `file`, if they still describe its current contents
  pub fn issues_if_current(&self, file: &Path, digest: &str) -> Option<&[Issue]> {
    self
      .files
      .get(file)
      .filter(|e| e.digest == digest)
      .map(|e| e.issues.as_slice())
  }

  /// Forget files the engine just rewrote
  pub fn invalidate(&mut self, files: &[PathBuf]) {
    for file in files {
      self.files.remove(file);
    }
  }
}

/// SHA-256 of a file's contents, or `None` when it cannot be read
pub fn digest_file(path: &Path) -> Option<String> {
  let bytes = fs::read(path).ok()?;
  let mut hasher = Sha256::new();
  hasher.update(&bytes);
  Some(format!("{:x}", hasher.finalize()))
}

pub fn digest_files(files: &[PathBuf]) -> BTreeMap<PathBuf, String> {
  files
    .iter()
    .filter_map(|f| digest_file(f).map(|d| (f.clone(), d)))
    .collect()
}

/// On-disk home for sessions between processes
#[derive(Debug, Clone)]
pub struct SessionStore {
  dir: PathBuf,
}

impl SessionStore {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  fn path_for(&self, kind: EngineKind) -> PathBuf {
    self.dir.join(format!("{}.json", kind.as_str()))
  }

  /// Load a persisted session; unreadable or corrupt files count as absent
  pub fn load(&self, kind: EngineKind) -> Option<EngineSession> {
    let path = self.path_for(kind);
    let bytes = fs::read(&path).ok()?;
    match serde_json::from_slice(&bytes) {
      Ok(session) => Some(session),
      Err(e) => {
        debug!(engine = %kind, path = %path.display(), error = %e, "ignoring corrupt session cache");
        None
      }
    }
  }

  /// Persist a session; failures are logged and otherwise ignored
  pub fn save(&self, kind: EngineKind, session: &EngineSession) {
    let path = self.path_for(kind);
    let result = fs::create_dir_all(&self.dir)
      .and_then(|_| serde_json::to_vec(session).map_err(std::io::Error::other))
      .and_then(|bytes| fs::write(&path, bytes));
    if let Err(e) = result {
      debug!(engine = %kind, path = %path.display(), error = %e, "failed to persist session cache");
    }
  }
}

struct SlotState {
  fingerprint: String,
  session: Option<EngineSession>,
  /// A session existed under a different fingerprint and was discarded
  discarded: bool,
}

/// Lazily-created, fingerprint-checked session owned by one adapter
pub struct SessionSlot {
  kind: EngineKind,
  store: Option<SessionStore>,
  state: Mutex<SlotState>,
}

impl SessionSlot {
  pub fn new(kind: EngineKind, fingerprint: impl Into<String>, store: Option<SessionStore>) -> Self {
    Self {
      kind,
      store,
      state: Mutex::new(SlotState {
        fingerprint: fingerprint.into(),
        session: None,
        discarded: false,
      }),
    }
  }

  /// Point the slot at a new configuration fingerprint
  pub fn rebind(&self, fingerprint: impl Into<String>) {
    let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
    state.fingerprint = fingerprint.into();
  }

  /// Run `f` against the session, creating or rebuilding it first if needed.
  ///
  /// The flag passed to `f` is true when prior state was discarded on the way.
  pub fn with<R>(&self, f: impl FnOnce(&mut EngineSession, bool) -> R) -> R {
    let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
    let fingerprint = state.fingerprint.clone();

    let stale = state.session.as_ref().is_some_and(|s| s.fingerprint() != fingerprint);
    if stale {
      debug!(engine = %self.kind, "configuration fingerprint changed, rebuilding session");
      state.session = None;
      state.discarded = true;
    }

    if state.session.is_none() {
      let loaded = self.store.as_ref().and_then(|s| s.load(self.kind));
      let session = match loaded {
        Some(session) if session.fingerprint() == fingerprint => {
          debug!(engine = %self.kind, "reusing persisted session");
          session
        }
        Some(_) => {
          state.discarded = true;
          EngineSession::new(fingerprint)
        }
        None => EngineSession::new(fingerprint),
      };
      state.session = Some(session);
    }

    let discarded = std::mem::take(&mut state.discarded);
    let session = state.session.get_or_insert_with(|| EngineSession::new(String::new()));
    f(session, discarded)
  }

  /// Write the current session to the store, if one is configured
  pub fn persist(&self) {
    let Some(store) = &self.store else {
      return;
    };
    let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(session) = &state.session {
      store.save(self.kind, session);
    }
  }
}
