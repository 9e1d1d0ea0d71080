//! Key layout. Every key starts with a one byte record type tag.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    QueuedSong = 0,
    Head = 1,
    Sequence = 2,
    SlugIndex = 3,
    Version = 4,
    UserStats = 5,
}

/// Head value meaning "no pending songs".
pub const HEAD_NIL: u64 = u64::MAX;

pub const SEQUENCE_NAME: &[u8] = b"queue_id";

pub fn song_key(id: u64) -> [u8; 9] {
    let mut key = [RecordType::QueuedSong as u8; 9];
    key[1..].copy_from_slice(&id.to_be_bytes());
    key
}

pub fn song_id_from_key(key: &[u8]) -> Option<u64> {
    let (&tag, id) = key.split_first()?;
    if tag != RecordType::QueuedSong as u8 {
        return None;
    }
    Some(u64::from_be_bytes(id.try_into().ok()?))
}

pub const fn song_prefix() -> [u8; 1] {
    [RecordType::QueuedSong as u8]
}

pub const fn head_key() -> [u8; 1] {
    [RecordType::Head as u8]
}

pub const fn version_key() -> [u8; 1] {
    [RecordType::Version as u8]
}

pub fn sequence_key() -> Vec<u8> {
    tagged(RecordType::Sequence, SEQUENCE_NAME)
}

pub fn slug_key(slug: &str) -> Vec<u8> {
    tagged(RecordType::SlugIndex, slug.as_bytes())
}

pub fn user_stats_key(user_id: &str) -> Vec<u8> {
    tagged(RecordType::UserStats, user_id.as_bytes())
}

fn tagged(record_type: RecordType, suffix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(suffix.len() + 1);
    key.push(record_type as u8);
    key.extend_from_slice(suffix);
    key
}

#[cfg(test)]
mod test {
    use super::{song_id_from_key, song_key, slug_key, RecordType};

    #[test]
    fn song_keys_sort_by_id() {
        let mut keys = vec![song_key(300), song_key(2), song_key(256), song_key(0)];
        keys.sort();
        let ids: Vec<u64> = keys.iter().filter_map(|k| song_id_from_key(k)).collect();
        assert_eq!(ids, vec![0, 2, 256, 300]);
    }

    #[test]
    fn should_not_parse_foreign_keys_as_song_ids() {
        assert_eq!(song_id_from_key(&slug_key("abcdefgh")), None);
        assert_eq!(song_id_from_key(&[RecordType::QueuedSong as u8, 1, 2]), None);
        assert_eq!(song_id_from_key(&song_key(77)), Some(77));
    }
}
