use api_models::stat::UserStats;

use crate::{codec, error::Result, keys, queue_tx::QueueTx};

impl QueueTx<'_> {
    /// Lifetime counters for `user_id`, `None` if the user never queued anything.
    pub fn user_stats(&self, user_id: &str) -> Result<Option<UserStats>> {
        self.txn
            .get(&keys::user_stats_key(user_id))?
            .map(|value| codec::decode_user_stats(&value))
            .transpose()
    }

    pub(crate) fn update_user_stats<F>(&mut self, user_id: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut UserStats),
    {
        let mut stats = self.user_stats(user_id)?.unwrap_or_default();
        f(&mut stats);
        self.txn
            .set(keys::user_stats_key(user_id), codec::encode_user_stats(&stats).to_vec())
    }
}
