//! Shared test helpers: in-memory port fakes and context setup

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use drivemirror_core::config::UploadStrategy;
use drivemirror_core::domain::{ExclusionSet, FileName, RemoteFile, RemoteId, SyncFolderPair};
use drivemirror_core::ports::{IProcessTable, IRemoteStore, Pid, RemoteAuthError};
use drivemirror_sync::context::SyncContext;

pub const FOLDER_ID: &str = "folder-test-001";

#[derive(Debug, Clone)]
pub struct StoredFile {
    pub id: RemoteId,
    pub name: FileName,
    pub content: Vec<u8>,
}

type ListHook = Box<dyn FnOnce() + Send>;

/// In-memory remote folder that counts every call
#[derive(Default)]
pub struct FakeRemoteStore {
    files: Mutex<Vec<StoredFile>>,
    next_id: AtomicU32,
    pub lists: AtomicU32,
    pub lookups: AtomicU32,
    pub uploads: AtomicU32,
    pub updates: AtomicU32,
    pub downloads: AtomicU32,
    pub deletes: AtomicU32,
    pub fail_list: AtomicBool,
    pub reject_credentials: AtomicBool,
    failing_downloads: Mutex<HashSet<String>>,
    during_next_list: Mutex<Option<ListHook>>,
}

impl FakeRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a remote file directly, bypassing the call counters
    pub fn seed(&self, name: &str, content: &[u8]) -> RemoteId {
        let id = self.allocate_id();
        self.files.lock().unwrap().push(StoredFile {
            id: id.clone(),
            name: FileName::new(name.to_string()).unwrap(),
            content: content.to_vec(),
        });
        id
    }

    pub fn fail_download_of(&self, name: &str) {
        self.failing_downloads.lock().unwrap().insert(name.to_string());
    }

    /// Runs `hook` inside the next `list` call, before the listing is taken
    pub fn during_next_list(&self, hook: impl FnOnce() + Send + 'static) {
        *self.during_next_list.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .files
            .lock()
            .unwrap()
            .iter()
            .map(|f| f.name.to_string())
            .collect();
        names.sort();
        names
    }

    pub fn content_of(&self, id: &RemoteId) -> Option<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .iter()
            .find(|f| &f.id == id)
            .map(|f| f.content.clone())
    }

    pub fn count(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }

    /// Upload, update, download and delete calls so far
    pub fn transfers(&self) -> u32 {
        Self::count(&self.uploads)
            + Self::count(&self.updates)
            + Self::count(&self.downloads)
            + Self::count(&self.deletes)
    }

    fn allocate_id(&self) -> RemoteId {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        RemoteId::new(format!("id-{n}")).unwrap()
    }

    fn check_credentials(&self) -> Result<()> {
        if self.reject_credentials.load(Ordering::SeqCst) {
            return Err(anyhow::Error::new(RemoteAuthError("invalid_grant".into())));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl IRemoteStore for FakeRemoteStore {
    async fn list(&self, folder_id: &RemoteId) -> Result<Vec<RemoteFile>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        let hook = self.during_next_list.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
        self.check_credentials()?;
        assert_eq!(folder_id.as_str(), FOLDER_ID);
        if self.fail_list.load(Ordering::SeqCst) {
            anyhow::bail!("503 backend unavailable");
        }
        Ok(self
            .files
            .lock()
            .unwrap()
            .iter()
            .map(|f| RemoteFile::new(f.id.clone(), f.name.clone()))
            .collect())
    }

    async fn find_by_name(&self, _folder_id: &RemoteId, name: &FileName) -> Result<Vec<RemoteFile>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.check_credentials()?;
        Ok(self
            .files
            .lock()
            .unwrap()
            .iter()
            .filter(|f| &f.name == name)
            .map(|f| RemoteFile::new(f.id.clone(), f.name.clone()))
            .collect())
    }

    async fn upload(&self, _folder_id: &RemoteId, name: &FileName, local_path: &Path) -> Result<RemoteId> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.check_credentials()?;
        let content = tokio::fs::read(local_path).await?;
        let id = self.allocate_id();
        self.files.lock().unwrap().push(StoredFile {
            id: id.clone(),
            name: name.clone(),
            content,
        });
        Ok(id)
    }

    async fn update(&self, id: &RemoteId, local_path: &Path) -> Result<RemoteId> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.check_credentials()?;
        let content = tokio::fs::read(local_path).await?;
        let mut files = self.files.lock().unwrap();
        let file = files
            .iter_mut()
            .find(|f| &f.id == id)
            .ok_or_else(|| anyhow::anyhow!("no file {id}"))?;
        file.content = content;
        Ok(id.clone())
    }

    async fn download(&self, id: &RemoteId, dest: &Path) -> Result<u64> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.check_credentials()?;
        let file = self
            .files
            .lock()
            .unwrap()
            .iter()
            .find(|f| &f.id == id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no file {id}"))?;
        let fails = self
            .failing_downloads
            .lock()
            .unwrap()
            .contains(file.name.as_str());
        if fails {
            tokio::fs::write(dest, b"partial").await?;
            anyhow::bail!("connection reset while downloading {}", file.name);
        }
        tokio::fs::write(dest, &file.content).await?;
        Ok(file.content.len() as u64)
    }

    async fn delete(&self, id: &RemoteId) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.check_credentials()?;
        let mut files = self.files.lock().unwrap();
        let before = files.len();
        files.retain(|f| &f.id != id);
        anyhow::ensure!(files.len() < before, "no file {id}");
        Ok(())
    }
}

/// Process table with one process holding a configurable set of files
#[derive(Default)]
pub struct FakeProcessTable {
    open: Mutex<Vec<PathBuf>>,
}

impl FakeProcessTable {
    pub fn hold(&self, path: &Path) {
        let canonical = std::fs::canonicalize(path).unwrap();
        self.open.lock().unwrap().push(canonical);
    }

    pub fn release_all(&self) {
        self.open.lock().unwrap().clear();
    }
}

impl IProcessTable for FakeProcessTable {
    fn processes(&self) -> Result<Vec<Pid>> {
        Ok(vec![1, 2])
    }

    fn open_files(&self, pid: Pid) -> Result<Vec<PathBuf>> {
        match pid {
            1 => Ok(self.open.lock().unwrap().clone()),
            _ => anyhow::bail!("permission denied"),
        }
    }
}

/// A temp local root plus the fakes wired into a context
pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub root: PathBuf,
    pub store: Arc<FakeRemoteStore>,
    pub processes: Arc<FakeProcessTable>,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = std::fs::canonicalize(dir.path()).unwrap();
        Self {
            dir,
            root,
            store: Arc::new(FakeRemoteStore::new()),
            processes: Arc::new(FakeProcessTable::default()),
        }
    }

    pub fn write_local(&self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.root.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn local_names(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.root)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    pub fn context(&self, exclusions: &[&str], strategy: UploadStrategy) -> Arc<SyncContext> {
        let pair = SyncFolderPair::new(
            self.root.clone(),
            RemoteId::new(FOLDER_ID.to_string()).unwrap(),
        )
        .unwrap();
        let exclusions: ExclusionSet = exclusions.iter().copied().collect();
        Arc::new(
            SyncContext::new(self.store.clone(), pair, self.processes.clone())
                .with_exclusions(exclusions)
                .with_upload_strategy(strategy),
        )
    }
}
