use std::sync::{Mutex, PoisonError};

use log::debug;
use sled::Db;

use crate::{codec, error::Result, keys};

struct Lease {
    next: u64,
    leased: u64,
}

/// Monotonic id generator persisted in blocks of `bandwidth` ids.
///
/// The stored value is the lease high-water mark and is flushed before any id
/// from the block is handed out, so ids are never handed out twice even if the
/// process dies without releasing.
pub struct Sequence {
    db: Db,
    key: Vec<u8>,
    bandwidth: u64,
    lease: Mutex<Lease>,
}

impl Sequence {
    pub fn acquire(db: &Db, bandwidth: u64) -> Result<Self> {
        let key = keys::sequence_key();
        let start = match db.get(&key)? {
            Some(value) => codec::decode_id(&value)?,
            None => 0,
        };
        let sequence = Self {
            db: db.clone(),
            key,
            bandwidth: bandwidth.max(1),
            lease: Mutex::new(Lease { next: start, leased: start }),
        };
        sequence.renew(&mut sequence.lock())?;
        Ok(sequence)
    }

    pub fn next(&self) -> Result<u64> {
        let mut lease = self.lock();
        if lease.next >= lease.leased {
            self.renew(&mut lease)?;
        }
        let id = lease.next;
        lease.next += 1;
        Ok(id)
    }

    /// Gives back the unused part of the current lease.
    pub fn release(&self) -> Result<()> {
        let mut lease = self.lock();
        self.db.insert(&self.key, codec::encode_id(lease.next).to_vec())?;
        self.db.flush()?;
        lease.leased = lease.next;
        debug!("Released id lease at {}", lease.next);
        Ok(())
    }

    fn renew(&self, lease: &mut Lease) -> Result<()> {
        let leased = lease.next + self.bandwidth;
        self.db.insert(&self.key, codec::encode_id(leased).to_vec())?;
        self.db.flush()?;
        lease.leased = leased;
        debug!("Leased ids {}..{leased}", lease.next);
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Lease> {
        self.lease.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod test {
    use super::Sequence;
    use crate::txn::{Store, IN_MEMORY};

    #[test]
    fn should_hand_out_increasing_ids_across_leases() {
        let store = Store::open(IN_MEMORY).unwrap();
        let sequence = Sequence::acquire(store.db(), 3).unwrap();
        let ids: Vec<u64> = (0..10).map(|_| sequence.next().unwrap()).collect();
        assert_eq!(ids, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn should_skip_unreleased_lease_on_reacquire() {
        let store = Store::open(IN_MEMORY).unwrap();
        let first = Sequence::acquire(store.db(), 100).unwrap();
        assert_eq!(first.next().unwrap(), 0);
        // no release: simulates a crash, the whole block is burned
        let second = Sequence::acquire(store.db(), 100).unwrap();
        assert_eq!(second.next().unwrap(), 100);
    }

    #[test]
    fn should_continue_after_release() {
        let store = Store::open(IN_MEMORY).unwrap();
        let first = Sequence::acquire(store.db(), 100).unwrap();
        first.next().unwrap();
        first.next().unwrap();
        first.release().unwrap();
        let second = Sequence::acquire(store.db(), 100).unwrap();
        assert_eq!(second.next().unwrap(), 2);
    }
}
