use std::{
    future::Future,
    sync::{Mutex, PoisonError},
    time::Duration,
};

use api_models::{settings::QueueSettings, song::QueuedSong};
use log::{debug, error, info, warn};
use sled::Db;

use crate::{
    codec,
    error::{QueueError, Result},
    keys,
    queue_tx::QueueTx,
    sequence::Sequence,
    slugs::SlugGenerator,
    txn::Store,
};

/// Version of the on-disk record layout. Bump on any incompatible change.
pub const FORMAT_VERSION: u32 = 1;

const MAX_GC_ROUNDS: usize = 16;

/// Persistent song queue. Safe to share between threads; every operation goes
/// through a [`QueueTx`].
pub struct Queue {
    store: Store,
    sequence: Sequence,
    slugs: Mutex<SlugGenerator>,
    settings: QueueSettings,
    released: bool,
}

impl Queue {
    pub fn open(settings: &QueueSettings) -> Result<Self> {
        Self::with_slug_generator(settings, SlugGenerator::new())
    }

    pub fn with_slug_generator(settings: &QueueSettings, slugs: SlugGenerator) -> Result<Self> {
        let store = Store::open(&settings.db_path)?;
        check_version(store.db())?;
        let sequence = Sequence::acquire(store.db(), settings.id_lease_size)?;
        info!("Queue opened at {}", settings.db_path);
        Ok(Self {
            store,
            sequence,
            slugs: Mutex::new(slugs),
            settings: settings.clone(),
            released: false,
        })
    }

    pub fn begin_txn(&self, writable: bool) -> QueueTx<'_> {
        QueueTx::new(self.store.begin(writable), self)
    }

    /// Runs `f` in a read-only transaction. If another transaction commits
    /// while `f` is reading, `f` is run again on a fresh snapshot, up to
    /// `commit_retries` times with exponential backoff.
    pub fn view<T, F>(&self, mut f: F) -> Result<T>
    where
        F: FnMut(&QueueTx<'_>) -> Result<T>,
    {
        let mut attempt = 0;
        loop {
            let tx = self.begin_txn(false);
            let result = f(&tx);
            tx.discard();
            match result {
                Err(e) if e.is_retryable() && attempt < self.settings.commit_retries => {
                    let backoff = self.backoff(attempt);
                    debug!("Stale read, retry {} in {backoff:?}", attempt + 1);
                    std::thread::sleep(backoff);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Runs `f` in a write transaction and commits it. If another writer
    /// commits first, either while `f` reads or before the commit, `f` is run
    /// again on a fresh transaction, up to `commit_retries` times with
    /// exponential backoff.
    pub fn update<T, F>(&self, mut f: F) -> Result<T>
    where
        F: FnMut(&mut QueueTx<'_>) -> Result<T>,
    {
        let mut attempt = 0;
        loop {
            let mut tx = self.begin_txn(true);
            let result = match f(&mut tx) {
                Ok(value) => tx.commit().map(|()| value),
                Err(e) => {
                    tx.discard();
                    Err(e)
                }
            };
            match result {
                Err(e) if e.is_retryable() && attempt < self.settings.commit_retries => {
                    let backoff = self.backoff(attempt);
                    debug!("Commit conflict, retry {} in {backoff:?}", attempt + 1);
                    std::thread::sleep(backoff);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Calls `f` for every pending song in queue order until it returns `false`.
    /// Runs once: a commit landing mid-iteration yields `Conflict` since `f`
    /// may already have seen part of the queue.
    pub fn iterate<F>(&self, f: F) -> Result<()>
    where
        F: FnMut(QueuedSong) -> bool,
    {
        let tx = self.begin_txn(false);
        let result = tx.iterate_from_head(f);
        tx.discard();
        result
    }

    /// Flushes the store until there is nothing left to write. Returns the bytes written.
    pub fn gc(&self) -> Result<usize> {
        let mut total = 0;
        for _ in 0..MAX_GC_ROUNDS {
            match self.store.flush() {
                Ok(0) => break,
                Ok(written) => total += written,
                Err(e) => {
                    error!("Queue gc failed: {e}");
                    return Err(e);
                }
            }
        }
        match self.store.db().size_on_disk() {
            Ok(size) => info!("Queue gc flushed {total} bytes, {size} bytes on disk"),
            Err(_) => info!("Queue gc flushed {total} bytes"),
        }
        Ok(total)
    }

    /// Returns unused ids to the store and flushes it.
    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    /// Waits for the next song and dequeues it. Polls every `poll_interval`
    /// while the queue is empty. Returns `None` once `cancel` completes.
    pub async fn next_song<C>(&self, poll_interval: Duration, cancel: C) -> Result<Option<QueuedSong>>
    where
        C: Future<Output = ()>,
    {
        tokio::pin!(cancel);
        loop {
            if let Some(song) = self.try_dequeue()? {
                return Ok(Some(song));
            }
            tokio::select! {
                () = &mut cancel => return Ok(None),
                () = tokio::time::sleep(poll_interval) => {}
            }
        }
    }

    pub const fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    pub(crate) fn next_id(&self) -> Result<u64> {
        self.sequence.next()
    }

    pub(crate) fn slug_candidate(&self) -> &'static str {
        self.slugs.lock().unwrap_or_else(PoisonError::into_inner).candidate()
    }

    /// One dequeue attempt. An empty queue or a lost race with another writer yields `None`.
    fn try_dequeue(&self) -> Result<Option<QueuedSong>> {
        let mut tx = self.begin_txn(true);
        let result = match tx.dequeue() {
            Ok(song) => tx.commit().map(|()| Some(song)),
            Err(e) => {
                tx.discard();
                Err(e)
            }
        };
        match result {
            Err(QueueError::QueueEmpty) => Ok(None),
            Err(QueueError::Conflict) => {
                debug!("Dequeue lost a race with another writer, polling again");
                Ok(None)
            }
            result => result,
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(16);
        Duration::from_millis(self.settings.retry_backoff_ms.saturating_mul(factor))
    }

    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.sequence.release()?;
        self.store.flush()?;
        info!("Queue closed");
        Ok(())
    }
}

impl Drop for Queue {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Failed to release queue on drop: {e}");
        }
    }
}

/// Stamps a fresh store with [`FORMAT_VERSION`], or checks an existing stamp.
fn check_version(db: &Db) -> Result<()> {
    match db.get(keys::version_key())? {
        Some(value) => {
            let found = codec::decode_version(&value)?;
            if found == FORMAT_VERSION {
                Ok(())
            } else {
                Err(QueueError::VersionMismatch {
                    expected: FORMAT_VERSION,
                    found,
                })
            }
        }
        None => {
            db.insert(keys::version_key(), codec::encode_version(FORMAT_VERSION).to_vec())?;
            db.flush()?;
            info!("Stamped new store with format version {FORMAT_VERSION}");
            Ok(())
        }
    }
}
