use api_models::song::{NewSong, QueuedSong};
use chrono::Utc;

use crate::{
    codec,
    error::{QueueError, Result},
    keys::{self, HEAD_NIL},
    queue::Queue,
    shift::{self, SlotStore},
    slugs,
    song_iterator::SongIterator,
    txn::StoreTxn,
};

/// All queue operations run inside one of these. Nothing is visible to other
/// transactions until [`QueueTx::commit`]; [`QueueTx::discard`] drops the writes.
pub struct QueueTx<'q> {
    pub(crate) txn: StoreTxn<'q>,
    queue: &'q Queue,
}

impl<'q> QueueTx<'q> {
    pub(crate) const fn new(txn: StoreTxn<'q>, queue: &'q Queue) -> Self {
        Self { txn, queue }
    }

    /// Commits all changes made in this transaction.
    pub fn commit(self) -> Result<()> {
        self.txn.commit()
    }

    /// Abandons all changes made in this transaction.
    pub fn discard(self) {
        self.txn.discard();
    }

    /// Adds a song to the end of the queue and returns its slot id.
    pub fn enqueue(&mut self, song: NewSong) -> Result<u64> {
        self.ensure_writable()?;
        let id = self.queue.next_id()?;
        let candidate = self.queue.slug_candidate();
        let slug = self.index_unique_slug(candidate, id)?;
        let user_id = song.user_id.clone();
        let queued = QueuedSong {
            song,
            id,
            slug,
            queued_at: Utc::now(),
            dequeued_at: None,
        };
        self.set_song(&queued)?;
        if self.head_id()?.is_none() {
            self.write_head(Some(id))?;
        }
        self.update_user_stats(&user_id, |stats| stats.queued_count = stats.queued_count.saturating_add(1))?;
        Ok(id)
    }

    /// Takes the head song and moves the head to the next one. The record is
    /// kept with `dequeued_at` set so it can be found as history.
    pub fn dequeue(&mut self) -> Result<QueuedSong> {
        self.ensure_writable()?;
        let mut song = self.head_song()?;
        self.advance_head(song.id)?;
        self.clear_slug(&song.slug, song.id)?;
        song.dequeued_at = Some(Utc::now());
        self.set_song(&song)?;
        self.update_user_stats(&song.song.user_id, |stats| {
            stats.dequeued_count = stats.dequeued_count.saturating_add(1);
        })?;
        Ok(song)
    }

    /// Returns the head song without touching the head pointer.
    pub fn peek(&self) -> Result<QueuedSong> {
        self.head_song()
    }

    /// Deletes a song by id, pending or not.
    pub fn remove(&mut self, id: u64) -> Result<()> {
        self.ensure_writable()?;
        let song = self.find_by_id(id)?;
        if song.is_pending() {
            self.clear_slug(&song.slug, id)?;
        }
        if self.head_id()? == Some(id) {
            self.advance_head(id)?;
        }
        self.txn.delete(keys::song_key(id).to_vec())?;
        self.update_user_stats(&song.song.user_id, |stats| {
            stats.deleted_count = stats.deleted_count.saturating_add(1);
        })
    }

    /// Replaces the payload of a queued song. Id, slug and timestamps stay.
    pub fn update(&mut self, id: u64, song: NewSong) -> Result<()> {
        self.ensure_writable()?;
        let mut queued = self.find_by_id(id)?;
        queued.song = song;
        self.set_song(&queued)
    }

    /// Number of pending songs. Walks the whole queue.
    pub fn count(&self) -> Result<usize> {
        let Some(head) = self.head_id()? else {
            return Ok(0);
        };
        let mut iter = SongIterator::new(&self.txn, false)?;
        iter.seek_id(head)?;
        iter.count()
    }

    /// Calls `f` for every pending song in queue order until it returns `false`.
    pub fn iterate_from_head<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(QueuedSong) -> bool,
    {
        let Some(head) = self.head_id()? else {
            return Ok(());
        };
        let mut iter = SongIterator::new(&self.txn, false)?;
        iter.seek_id(head)?;
        while iter.valid() {
            if !f(iter.song()?) {
                break;
            }
            iter.next()?;
        }
        Ok(())
    }

    pub fn find_by_slug(&self, slug: &str) -> Result<QueuedSong> {
        let value = self.txn.get(&keys::slug_key(slug))?.ok_or(QueueError::NotFound)?;
        self.find_by_id(codec::decode_id(&value)?)
    }

    pub fn find_by_id(&self, id: u64) -> Result<QueuedSong> {
        let value = self.txn.get(&keys::song_key(id))?.ok_or(QueueError::NotFound)?;
        codec::decode_song(&value)
    }

    /// The most recently dequeued song, i.e. the dequeued song with the largest slot id.
    pub fn last_dequeued(&self) -> Result<QueuedSong> {
        let mut iter = SongIterator::new(&self.txn, true)?;
        if let Some(head) = self.head_id()? {
            let Some(before_head) = head.checked_sub(1) else {
                return Err(QueueError::NotFound);
            };
            iter.seek_id(before_head)?;
        }
        while iter.valid() {
            let song = iter.song()?;
            if !song.is_pending() {
                return Ok(song);
            }
            iter.next()?;
        }
        Err(QueueError::NotFound)
    }

    /// Pending songs in queue order, skipping `offset` and returning at most `limit`.
    pub fn list(&self, offset: usize, limit: usize) -> Result<Vec<QueuedSong>> {
        let Some(head) = self.head_id()? else {
            return Ok(Vec::new());
        };
        let mut iter = SongIterator::new(&self.txn, false)?;
        iter.seek_id(head)?;
        for _ in 0..offset {
            if !iter.valid() {
                return Ok(Vec::new());
            }
            iter.next()?;
        }
        let mut songs = Vec::with_capacity(limit.min(25));
        while iter.valid() && songs.len() < limit {
            songs.push(iter.song()?);
            iter.next()?;
        }
        Ok(songs)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.head_id()?.is_none())
    }

    /// Number of pending songs queued by `user_id`.
    pub fn count_by_user(&self, user_id: &str) -> Result<usize> {
        let mut count = 0;
        self.iterate_from_head(|song| {
            if song.song.user_id == user_id {
                count += 1;
            }
            true
        })?;
        Ok(count)
    }

    /// Moves a pending song to `new_position`, counted from the head (0).
    ///
    /// Songs between the old and new position shift one slot to make room.
    /// Slot ids are not renumbered, the payloads move between them.
    pub fn move_song(&mut self, id: u64, new_position: usize) -> Result<()> {
        self.ensure_writable()?;
        if !self.find_by_id(id)?.is_pending() {
            return Err(QueueError::SongDequeued);
        }
        let current_position = self.position_of(id)?;
        if current_position == new_position {
            return Ok(());
        }
        let path = self.slot_path(id, current_position, new_position)?;
        shift::rotate(self, &path)
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.txn.is_writable() {
            Ok(())
        } else {
            Err(QueueError::ReadOnly)
        }
    }

    /// Forward distance of a pending song from the head.
    fn position_of(&self, id: u64) -> Result<usize> {
        let mut position = 0;
        let mut found = false;
        self.iterate_from_head(|song| {
            if song.id == id {
                found = true;
                return false;
            }
            position += 1;
            true
        })?;
        if found {
            Ok(position)
        } else {
            Err(QueueError::NotFound)
        }
    }

    /// Slot ids from `id` to the slot currently at `new_position`, inclusive,
    /// walking toward the target.
    fn slot_path(&self, id: u64, current_position: usize, new_position: usize) -> Result<Vec<u64>> {
        let reverse = new_position < current_position;
        let steps = current_position.abs_diff(new_position);
        let mut iter = SongIterator::new(&self.txn, reverse)?;
        iter.seek_id(id)?;
        let mut path = Vec::with_capacity(steps + 1);
        for _ in 0..=steps {
            path.push(iter.id().ok_or(QueueError::MoveOutOfBounds)?);
            iter.next()?;
        }
        Ok(path)
    }

    fn index_unique_slug(&mut self, candidate: &str, id: u64) -> Result<String> {
        let slug = if self.txn.contains_key(&keys::slug_key(candidate))? {
            let mut prefix = keys::slug_key(candidate);
            prefix.push(b'-');
            let mut cursor = self.txn.cursor(&prefix, false)?;
            let mut max_dedupe = 0;
            while cursor.valid() {
                let dedupe = cursor
                    .key()
                    .and_then(|k| std::str::from_utf8(&k[1..]).ok())
                    .and_then(|slug| slugs::dedupe_number(slug, candidate));
                if let Some(dedupe) = dedupe {
                    max_dedupe = max_dedupe.max(dedupe);
                }
                cursor.next()?;
            }
            format!("{candidate}-{}", max_dedupe + 1)
        } else {
            candidate.to_owned()
        };
        self.set_slug_id(&slug, id)?;
        Ok(slug)
    }

    fn set_slug_id(&mut self, slug: &str, id: u64) -> Result<()> {
        self.txn.set(keys::slug_key(slug), codec::encode_id(id).to_vec())
    }

    /// Drops the slug index entry, if it still points at `id`.
    fn clear_slug(&mut self, slug: &str, id: u64) -> Result<()> {
        let key = keys::slug_key(slug);
        match self.txn.get(&key)? {
            Some(value) if codec::decode_id(&value)? == id => self.txn.delete(key),
            _ => Ok(()),
        }
    }

    fn head_id(&self) -> Result<Option<u64>> {
        match self.txn.get(&keys::head_key())? {
            Some(value) => {
                let head = codec::decode_id(&value)?;
                Ok((head != HEAD_NIL).then_some(head))
            }
            None => Ok(None),
        }
    }

    fn write_head(&mut self, head: Option<u64>) -> Result<()> {
        let value = codec::encode_id(head.unwrap_or(HEAD_NIL));
        self.txn.set(keys::head_key().to_vec(), value.to_vec())
    }

    fn head_song(&self) -> Result<QueuedSong> {
        let head = self.head_id()?.ok_or(QueueError::QueueEmpty)?;
        self.find_by_id(head)
    }

    /// Points the head at the first slot after `head`, or at nothing.
    fn advance_head(&mut self, head: u64) -> Result<()> {
        let next = match head.checked_add(1) {
            Some(from) => {
                let mut iter = SongIterator::new(&self.txn, false)?;
                iter.seek_id(from)?;
                iter.id()
            }
            None => None,
        };
        self.write_head(next)
    }

    fn set_song(&mut self, song: &QueuedSong) -> Result<()> {
        self.txn.set(keys::song_key(song.id).to_vec(), codec::encode_song(song)?)
    }
}

impl SlotStore for QueueTx<'_> {
    type Item = QueuedSong;
    type Error = QueueError;

    fn load(&mut self, slot: u64) -> Result<QueuedSong> {
        self.find_by_id(slot)
    }

    fn store(&mut self, slot: u64, mut song: QueuedSong) -> Result<()> {
        song.id = slot;
        self.set_song(&song)?;
        self.set_slug_id(&song.slug, slot)
    }
}
