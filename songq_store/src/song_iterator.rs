use api_models::song::QueuedSong;

use crate::{
    codec,
    error::{QueueError, Result},
    keys,
    txn::{Cursor, StoreTxn},
};

/// Cursor over the queued song records, ordered by slot id.
pub struct SongIterator<'s> {
    cursor: Cursor<'s>,
}

impl<'s> SongIterator<'s> {
    pub fn new(txn: &StoreTxn<'s>, reverse: bool) -> Result<Self> {
        Ok(Self {
            cursor: txn.cursor(&keys::song_prefix(), reverse)?,
        })
    }

    /// Forward: first slot `>= id`. Reverse: last slot `<= id`.
    pub fn seek_id(&mut self, id: u64) -> Result<()> {
        self.cursor.seek(&keys::song_key(id))
    }

    pub const fn valid(&self) -> bool {
        self.cursor.valid()
    }

    pub fn next(&mut self) -> Result<()> {
        self.cursor.next()
    }

    /// Slot id of the current record, read from the key alone.
    pub fn id(&self) -> Option<u64> {
        self.cursor.key().and_then(keys::song_id_from_key)
    }

    pub fn song(&self) -> Result<QueuedSong> {
        let value = self.cursor.value().ok_or(QueueError::NotFound)?;
        codec::decode_song(value)
    }

    /// Drains the iterator, counting the remaining records.
    pub fn count(mut self) -> Result<usize> {
        let mut count = 0;
        while self.valid() {
            count += 1;
            self.next()?;
        }
        Ok(count)
    }
}
