pub mod codec;
pub mod error;
mod keys;
pub mod queue;
pub mod queue_tx;
mod sequence;
pub mod shift;
pub mod slugs;
mod song_iterator;
mod txn;
mod user_stats;

pub use error::{QueueError, Result};
pub use queue::{Queue, FORMAT_VERSION};
pub use queue_tx::QueueTx;
pub use slugs::SlugGenerator;
