//! Binary record layouts.
//!
//! Queued songs use a fixed layout so decoding needs no reflection:
//!
//! ```text
//! [0..8)    id, u64 BE
//! [8..21)   queued_at
//! [21..34)  dequeued_at
//! [34..42)  duration in nanoseconds, u64 BE
//! [42..)    user_id, title, song_url, thumbnail_url, slug
//!           each as a u32 BE length followed by UTF-8 bytes
//! ```
//!
//! A timestamp is a presence byte, i64 BE seconds and u32 BE nanoseconds.
use std::time::Duration;

use api_models::{
    song::{NewSong, QueuedSong},
    stat::UserStats,
};
use chrono::{DateTime, Utc};

use crate::error::{QueueError, Result};

const TIME_LEN: usize = 13;
const QUEUED_AT_OFFSET: usize = 8;
const DEQUEUED_AT_OFFSET: usize = QUEUED_AT_OFFSET + TIME_LEN;
const DURATION_OFFSET: usize = DEQUEUED_AT_OFFSET + TIME_LEN;
const STRINGS_OFFSET: usize = DURATION_OFFSET + 8;
const USER_STATS_LEN: usize = 6;

/// Fails with `Corrupt` if a string is too long for its u32 length prefix.
pub fn encode_song(song: &QueuedSong) -> Result<Vec<u8>> {
    let strings = [
        song.song.user_id.as_str(),
        song.song.title.as_str(),
        song.song.song_url.as_str(),
        song.song.thumbnail_url.as_str(),
        song.slug.as_str(),
    ];
    let size = STRINGS_OFFSET + strings.iter().map(|s| 4 + s.len()).sum::<usize>();
    let mut buf = Vec::with_capacity(size);
    buf.extend_from_slice(&song.id.to_be_bytes());
    write_time(&mut buf, Some(song.queued_at));
    write_time(&mut buf, song.dequeued_at);
    let nanos = u64::try_from(song.song.duration.as_nanos()).unwrap_or(u64::MAX);
    buf.extend_from_slice(&nanos.to_be_bytes());
    for s in strings {
        buf.extend_from_slice(&length_prefix(s.len())?);
        buf.extend_from_slice(s.as_bytes());
    }
    Ok(buf)
}

pub fn decode_song(data: &[u8]) -> Result<QueuedSong> {
    if data.len() < STRINGS_OFFSET {
        return Err(corrupt(format!("song record too short: {} bytes", data.len())));
    }
    let id = read_u64(&data[..QUEUED_AT_OFFSET]);
    let queued_at =
        read_time(&data[QUEUED_AT_OFFSET..DEQUEUED_AT_OFFSET])?.ok_or_else(|| corrupt("song without queued_at"))?;
    let dequeued_at = read_time(&data[DEQUEUED_AT_OFFSET..DURATION_OFFSET])?;
    let duration = Duration::from_nanos(read_u64(&data[DURATION_OFFSET..STRINGS_OFFSET]));

    let mut reader = StringReader {
        data,
        pos: STRINGS_OFFSET,
    };
    let user_id = reader.next_string()?;
    let title = reader.next_string()?;
    let song_url = reader.next_string()?;
    let thumbnail_url = reader.next_string()?;
    let slug = reader.next_string()?;
    if reader.pos != data.len() {
        return Err(corrupt(format!("{} trailing bytes in song record", data.len() - reader.pos)));
    }

    Ok(QueuedSong {
        song: NewSong {
            user_id,
            title,
            song_url,
            thumbnail_url,
            duration,
        },
        id,
        slug,
        queued_at,
        dequeued_at,
    })
}

#[must_use]
pub fn encode_user_stats(stats: &UserStats) -> [u8; USER_STATS_LEN] {
    let mut buf = [0u8; USER_STATS_LEN];
    buf[0..2].copy_from_slice(&stats.queued_count.to_be_bytes());
    buf[2..4].copy_from_slice(&stats.dequeued_count.to_be_bytes());
    buf[4..6].copy_from_slice(&stats.deleted_count.to_be_bytes());
    buf
}

pub fn decode_user_stats(data: &[u8]) -> Result<UserStats> {
    if data.len() != USER_STATS_LEN {
        return Err(corrupt(format!("invalid user stats length {}", data.len())));
    }
    Ok(UserStats {
        queued_count: u16::from_be_bytes([data[0], data[1]]),
        dequeued_count: u16::from_be_bytes([data[2], data[3]]),
        deleted_count: u16::from_be_bytes([data[4], data[5]]),
    })
}

#[must_use]
pub const fn encode_id(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

pub fn decode_id(data: &[u8]) -> Result<u64> {
    let bytes: [u8; 8] = data
        .try_into()
        .map_err(|_| corrupt(format!("invalid id length {}", data.len())))?;
    Ok(u64::from_be_bytes(bytes))
}

#[must_use]
pub const fn encode_version(version: u32) -> [u8; 4] {
    version.to_be_bytes()
}

pub fn decode_version(data: &[u8]) -> Result<u32> {
    let bytes: [u8; 4] = data
        .try_into()
        .map_err(|_| corrupt(format!("invalid version marker length {}", data.len())))?;
    Ok(u32::from_be_bytes(bytes))
}

fn write_time(buf: &mut Vec<u8>, time: Option<DateTime<Utc>>) {
    match time {
        Some(time) => {
            buf.push(1);
            buf.extend_from_slice(&time.timestamp().to_be_bytes());
            buf.extend_from_slice(&time.timestamp_subsec_nanos().to_be_bytes());
        }
        None => buf.extend_from_slice(&[0u8; TIME_LEN]),
    }
}

fn read_time(data: &[u8]) -> Result<Option<DateTime<Utc>>> {
    match data[0] {
        0 => Ok(None),
        1 => {
            let secs = i64::from_be_bytes(data[1..9].try_into().map_err(|_| corrupt("short timestamp"))?);
            let nanos = u32::from_be_bytes(data[9..13].try_into().map_err(|_| corrupt("short timestamp"))?);
            DateTime::from_timestamp(secs, nanos)
                .map(Some)
                .ok_or_else(|| corrupt(format!("timestamp out of range: {secs}.{nanos}")))
        }
        flag => Err(corrupt(format!("unknown timestamp flag {flag}"))),
    }
}

fn length_prefix(len: usize) -> Result<[u8; 4]> {
    u32::try_from(len)
        .map(u32::to_be_bytes)
        .map_err(|_| corrupt(format!("string of {len} bytes does not fit a song record")))
}

fn read_u64(data: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[..8]);
    u64::from_be_bytes(bytes)
}

struct StringReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl StringReader<'_> {
    fn next_string(&mut self) -> Result<String> {
        let len_end = self.pos + 4;
        let Some(len_bytes) = self.data.get(self.pos..len_end) else {
            return Err(corrupt("truncated string length"));
        };
        let len = u32::from_be_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize;
        let Some(bytes) = self.data.get(len_end..len_end + len) else {
            return Err(corrupt(format!("string of {len} bytes runs past end of record")));
        };
        self.pos = len_end + len;
        String::from_utf8(bytes.to_vec()).map_err(|e| corrupt(e.to_string()))
    }
}

fn corrupt(msg: impl Into<String>) -> QueueError {
    QueueError::Corrupt(msg.into())
}
