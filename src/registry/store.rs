//! JSON file persistence shared by both registries.
//!
//! The in-memory state is an immutable `Arc<M>` behind a `RwLock`. A write
//! clones the map, mutates the clone, writes it to `<file>.tmp`, fsyncs,
//! renames over the canonical file and only then swaps the clone in.

use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::de::DeserializeOwned;
use tokio::{fs, io::AsyncWriteExt, sync::RwLock};
use tracing::{debug, info, warn};

use super::RegistryError;

pub(crate) type Encoder<M> = fn(&M) -> serde_json::Result<Vec<u8>>;

pub(crate) struct Store<M> {
    path: PathBuf,
    state: Arc<RwLock<Arc<M>>>,
    encode: Encoder<M>,
}

impl<M> std::fmt::Debug for Store<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("path", &self.path).finish()
    }
}

impl<M> Store<M>
where
    M: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(path: PathBuf, initial: M, encode: Encoder<M>) -> Self {
        Self {
            path,
            state: Arc::new(RwLock::new(Arc::new(initial))),
            encode,
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Current state. The read lock is only held for the `Arc` clone.
    pub(crate) async fn read(&self) -> Arc<M> {
        self.state.read().await.clone()
    }

    /// Applies `op` to a copy of the state. When `op` reports a change the copy
    /// is persisted and becomes the new state; on a persistence error nothing
    /// changes, neither in memory nor on disk.
    ///
    /// The write runs on its own task so a caller dropping the future cannot
    /// interrupt it between the rename and the in-memory swap.
    pub(crate) async fn mutate<T, F>(&self, op: F) -> Result<T, RegistryError>
    where
        T: Send + 'static,
        F: FnOnce(&mut M) -> (T, bool) + Send + 'static,
    {
        let state = self.state.clone();
        let path = self.path.clone();
        let encode = self.encode;

        tokio::spawn(async move {
            let mut guard = state.write_owned().await;
            let mut next = M::clone(&guard);
            let (result, changed) = op(&mut next);

            if changed {
                let payload = encode(&next)?;
                write_atomic(&path, &payload)
                    .await
                    .map_err(|source| RegistryError::Persist {
                        path: path.clone(),
                        source,
                    })?;
                *guard = Arc::new(next);
                debug!(path = %path.display(), "📜 Registry persisted");
            }

            Ok::<T, RegistryError>(result)
        })
        .await
        .map_err(|e| RegistryError::Interrupted(e.to_string()))?
    }
}

/// Reads and decodes a registry file. A missing or malformed file yields `None`.
pub(crate) async fn load<R: DeserializeOwned>(path: &Path) -> Option<R> {
    let raw = match fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!(path = %path.display(), "📜 No registry file yet, starting empty");
            return None;
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "📜 ⚠️ Registry file unreadable, starting empty");
            return None;
        }
    };

    match serde_json::from_slice(&raw) {
        Ok(records) => Some(records),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "📜 ⚠️ Registry file malformed, starting empty");
            None
        }
    }
}

pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

async fn write_atomic(path: &Path, payload: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).await?;
    }

    let tmp = temp_path(path);
    let written = async {
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(payload).await?;
        file.sync_all().await?;
        fs::rename(&tmp, path).await
    }
    .await;

    if written.is_err() {
        let _ = fs::remove_file(&tmp).await;
    }

    written
}
