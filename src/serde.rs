//! Entry codecs: serialize an [`Entry`] to bytes and back.
//!
//! For handing cached entries to an external process or wire format. None of
//! this crate's `Storage` implementations use a codec —
//! [`crate::storage::InMemoryStorage`] keeps entries as native Rust values —
//! so these are reference adapters for a caller building their own remote
//! `Storage`, not something the orchestrator touches.
//!
//! `Entry::created`/`update_after`/`expires_after` are [`std::time::Instant`]s,
//! which are only meaningful within one process's monotonic clock. Both
//! codecs below re-anchor deadlines as *durations from the moment of
//! encoding* (or, for [`JsonEntryCodec`], absolute Unix timestamps) and
//! reconstruct fresh `Instant`s on decode — so a round trip through a
//! different process, or a long delay between encode and decode, shifts
//! deadlines by however much wall-clock time elapsed in between. This is
//! unavoidable without a persisted, cross-process clock and should be
//! treated as a known limitation, not a bug.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::entry::Entry;
use crate::error::{Error, Result};

/// Serializes an [`Entry`] to bytes and reconstructs it on the other end.
pub trait EntryCodec<V>: Send + Sync {
    /// Encode `entry` to bytes.
    fn encode(&self, entry: &Entry<V>) -> Result<Vec<u8>>;
    /// Decode bytes produced by [`Self::encode`] back into an `Entry`.
    fn decode(&self, bytes: &[u8]) -> Result<Entry<V>>;
}

#[derive(Serialize)]
struct WireEntryRef<'a, V> {
    value: &'a V,
    update_after_ms: u64,
    expires_after_ms: u64,
}

#[derive(Deserialize)]
struct WireEntryOwned<V> {
    value: V,
    update_after_ms: u64,
    expires_after_ms: u64,
}

/// Compact binary codec built on `bincode`.
///
/// Modeled on `PickleSerDe`: a fast, Rust-to-Rust-only format, unsuitable for
/// interchange with other languages (bincode has no independent schema).
#[derive(Debug, Default, Clone, Copy)]
pub struct BincodeEntryCodec;

impl<V> EntryCodec<V> for BincodeEntryCodec
where
    V: Serialize + for<'de> Deserialize<'de> + Send + Sync,
{
    fn encode(&self, entry: &Entry<V>) -> Result<Vec<u8>> {
        let now = Instant::now();
        let wire = WireEntryRef {
            value: &entry.value,
            update_after_ms: entry.update_after.saturating_duration_since(now).as_millis() as u64,
            expires_after_ms: entry.expires_after.saturating_duration_since(now).as_millis() as u64,
        };
        bincode::serialize(&wire).map_err(|e| Error::Internal(format!("bincode encode failed: {e}")))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Entry<V>> {
        let wire: WireEntryOwned<V> = bincode::deserialize(bytes)
            .map_err(|e| Error::Internal(format!("bincode decode failed: {e}")))?;
        let now = Instant::now();
        Ok(Entry::new(
            wire.value,
            now,
            now + Duration::from_millis(wire.update_after_ms),
            now + Duration::from_millis(wire.expires_after_ms),
        ))
    }
}

#[derive(Serialize)]
struct JsonWireEntryRef<'a, V> {
    value: &'a V,
    update_after_unix_ms: u128,
    expires_after_unix_ms: u128,
}

#[derive(Deserialize)]
struct JsonWireEntryOwned<V> {
    value: V,
    update_after_unix_ms: u128,
    expires_after_unix_ms: u128,
}

/// Human-readable codec built on `serde_json`, anchoring deadlines to
/// absolute Unix-epoch milliseconds rather than a duration-from-now, so two
/// processes with synchronized wall clocks agree on them.
///
/// Modeled on `JsonSerDe`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonEntryCodec;

impl<V> EntryCodec<V> for JsonEntryCodec
where
    V: Serialize + for<'de> Deserialize<'de> + Send + Sync,
{
    fn encode(&self, entry: &Entry<V>) -> Result<Vec<u8>> {
        let instant_now = Instant::now();
        let system_now = SystemTime::now();
        let to_unix_ms = |deadline: Instant| -> u128 {
            let offset = deadline.saturating_duration_since(instant_now);
            (system_now + offset)
                .duration_since(UNIX_EPOCH)
                .unwrap_or(Duration::ZERO)
                .as_millis()
        };
        let wire = JsonWireEntryRef {
            value: &entry.value,
            update_after_unix_ms: to_unix_ms(entry.update_after),
            expires_after_unix_ms: to_unix_ms(entry.expires_after),
        };
        serde_json::to_vec(&wire).map_err(|e| Error::Internal(format!("json encode failed: {e}")))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Entry<V>> {
        let wire: JsonWireEntryOwned<V> = serde_json::from_slice(bytes)
            .map_err(|e| Error::Internal(format!("json decode failed: {e}")))?;
        let instant_now = Instant::now();
        let system_now = SystemTime::now();
        let to_instant = |unix_ms: u128| -> Instant {
            let ms = unix_ms.min(u128::from(u64::MAX)) as u64;
            let target_system = UNIX_EPOCH + Duration::from_millis(ms);
            if let Ok(ahead) = target_system.duration_since(system_now) {
                instant_now + ahead
            } else if let Ok(behind) = system_now.duration_since(target_system) {
                instant_now.checked_sub(behind).unwrap_or(instant_now)
            } else {
                instant_now
            }
        };
        let update_after = to_instant(wire.update_after_unix_ms);
        let expires_after = to_instant(wire.expires_after_unix_ms);
        Ok(Entry::new(wire.value, instant_now, update_after, expires_after))
    }
}

/// Pluggable byte transform layered under an [`EntryCodec`] — compression,
/// encryption, or any other `bytes -> bytes` adapter.
///
/// This crate ships no concrete compressor; bring your own via this trait
/// rather than this crate taking on a compression dependency it does not
/// otherwise need.
pub trait Encoding: Send + Sync {
    /// Transform bytes after the base codec's `encode`.
    fn encode(&self, bytes: Vec<u8>) -> Result<Vec<u8>>;
    /// Invert [`Self::encode`] before the base codec's `decode`.
    fn decode(&self, bytes: Vec<u8>) -> Result<Vec<u8>>;
}

/// No-op [`Encoding`]: passes bytes through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityEncoding;

impl Encoding for IdentityEncoding {
    fn encode(&self, bytes: Vec<u8>) -> Result<Vec<u8>> {
        Ok(bytes)
    }
    fn decode(&self, bytes: Vec<u8>) -> Result<Vec<u8>> {
        Ok(bytes)
    }
}

/// Layers an [`Encoding`] under a base [`EntryCodec`].
pub struct EncodingEntryCodec<C, E> {
    base: C,
    encoding: E,
}

impl<C, E> EncodingEntryCodec<C, E> {
    /// Wrap `base` with `encoding`, applied around its byte output.
    #[must_use]
    pub fn new(base: C, encoding: E) -> Self {
        Self { base, encoding }
    }
}

impl<C, E, V> EntryCodec<V> for EncodingEntryCodec<C, E>
where
    C: EntryCodec<V>,
    E: Encoding,
{
    fn encode(&self, entry: &Entry<V>) -> Result<Vec<u8>> {
        self.encoding.encode(self.base.encode(entry)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Entry<V>> {
        self.base.decode(&self.encoding.decode(bytes.to_vec())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry_builder::{ConstantLifespanEntryBuilder, EntryBuilder};

    fn sample_entry() -> Entry<i32> {
        ConstantLifespanEntryBuilder::new(Duration::from_secs(10), Duration::from_secs(20))
            .build(&"k".to_string(), 7)
    }

    #[test]
    fn bincode_codec_round_trips_the_value() {
        let codec = BincodeEntryCodec;
        let entry = sample_entry();
        let bytes = codec.encode(&entry).unwrap();
        let decoded: Entry<i32> = codec.decode(&bytes).unwrap();
        assert_eq!(decoded.value, 7);
        assert!(decoded.update_after <= decoded.expires_after);
    }

    #[test]
    fn json_codec_round_trips_the_value() {
        let codec = JsonEntryCodec;
        let entry = sample_entry();
        let bytes = codec.encode(&entry).unwrap();
        let decoded: Entry<i32> = codec.decode(&bytes).unwrap();
        assert_eq!(decoded.value, 7);
        assert!(decoded.update_after <= decoded.expires_after);
    }

    #[test]
    fn identity_encoding_wrapped_codec_round_trips() {
        let codec = EncodingEntryCodec::new(BincodeEntryCodec, IdentityEncoding);
        let entry = sample_entry();
        let bytes = codec.encode(&entry).unwrap();
        let decoded: Entry<i32> = codec.decode(&bytes).unwrap();
        assert_eq!(decoded.value, 7);
    }
}
