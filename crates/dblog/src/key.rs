//! Time-ordered record keys
//!
//! An [`OrderedKey`] packs `(timestamp, sequence, tiebreaker)` into 16
//! big-endian bytes so that comparing two keys byte by byte gives the same
//! answer as comparing the three numbers in that priority order. A plain
//! range scan over keys is therefore a time-range query.
//!
//! Layout:
//!
//! ```text
//! 0               8           12          16
//! +---------------+-----------+-----------+
//! | seconds*1024  | sequence  | tiebreaker|
//! | i64, sign bit | u32 BE    | u32 BE    |
//! | flipped, BE   |           |           |
//! +---------------+-----------+-----------+
//! ```
//!
//! Flipping the sign bit makes negative (pre-epoch) timestamps sort before
//! positive ones.

use std::fmt;
use std::str::FromStr;

use rand::Rng;

use crate::error::KeyError;

/// Length of an encoded key in bytes
pub const KEY_LEN: usize = 16;

/// Fixed-point scale applied to seconds, keeping ~1ms precision
pub const TIME_SCALE: f64 = 1024.0;

const SIGN_FLIP: u64 = 1 << 63;

/// Fixed-width, lexically sortable record key
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrderedKey([u8; KEY_LEN]);

fn scale(timestamp: f64) -> Result<i64, KeyError> {
    let scaled = (timestamp * TIME_SCALE).floor();
    // i64::MAX is not representable as f64; 2^63 is the first value past it
    if !scaled.is_finite() || scaled < i64::MIN as f64 || scaled >= i64::MAX as f64 {
        return Err(KeyError::TimestampOutOfRange(timestamp));
    }
    Ok(scaled as i64)
}

impl OrderedKey {
    /// Build a key for `timestamp` (seconds since the epoch)
    ///
    /// Missing `sequence` or `tiebreaker` values are drawn at random. With
    /// both supplied the result is fully deterministic.
    pub fn encode(
        timestamp: f64,
        sequence: Option<u32>,
        tiebreaker: Option<u32>,
    ) -> Result<Self, KeyError> {
        let scaled = scale(timestamp)?;
        let mut rng = rand::rng();
        let sequence = sequence.unwrap_or_else(|| rng.random());
        let tiebreaker = tiebreaker.unwrap_or_else(|| rng.random());
        Ok(Self::from_parts(scaled, sequence, tiebreaker))
    }

    /// Build a key from an already scaled timestamp
    pub fn from_parts(scaled_timestamp: i64, sequence: u32, tiebreaker: u32) -> Self {
        let mut bytes = [0u8; KEY_LEN];
        bytes[..8].copy_from_slice(&((scaled_timestamp as u64) ^ SIGN_FLIP).to_be_bytes());
        bytes[8..12].copy_from_slice(&sequence.to_be_bytes());
        bytes[12..].copy_from_slice(&tiebreaker.to_be_bytes());
        Self(bytes)
    }

    /// Smallest key of the tick containing `timestamp`
    pub fn lower_bound(timestamp: f64) -> Result<Self, KeyError> {
        Ok(Self::from_parts(scale(timestamp)?, 0, 0))
    }

    /// Smallest key greater than every key of the tick containing
    /// `timestamp`, for use as an exclusive range end
    pub fn upper_bound(timestamp: f64) -> Result<Self, KeyError> {
        let next = scale(timestamp)?
            .checked_add(1)
            .ok_or(KeyError::TimestampOutOfRange(timestamp))?;
        Ok(Self::from_parts(next, 0, 0))
    }

    /// Parse raw key bytes
    pub fn decode(bytes: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| KeyError::InvalidLength(bytes.len()))?;
        Ok(Self(bytes))
    }

    /// The fixed-point timestamp (seconds * 1024)
    pub fn scaled_timestamp(&self) -> i64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.0[..8]);
        (u64::from_be_bytes(raw) ^ SIGN_FLIP) as i64
    }

    /// Timestamp in seconds, truncated to the key's 1/1024s resolution
    pub fn timestamp(&self) -> f64 {
        self.scaled_timestamp() as f64 / TIME_SCALE
    }

    pub fn sequence(&self) -> u32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.0[8..12]);
        u32::from_be_bytes(raw)
    }

    pub fn tiebreaker(&self) -> u32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.0[12..]);
        u32::from_be_bytes(raw)
    }

    /// `(timestamp, sequence, tiebreaker)`, the inverse of [`encode`](Self::encode)
    pub fn parts(&self) -> (f64, u32, u32) {
        (self.timestamp(), self.sequence(), self.tiebreaker())
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl AsRef<[u8]> for OrderedKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for OrderedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for OrderedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderedKey")
            .field("timestamp", &self.timestamp())
            .field("sequence", &self.sequence())
            .field("tiebreaker", &self.tiebreaker())
            .finish()
    }
}

impl FromStr for OrderedKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| KeyError::InvalidHex(e.to_string()))?;
        Self::decode(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_exact() {
        let t = 1_400_000_000.0 + 517.0 / 1024.0;
        let key = OrderedKey::encode(t, Some(7), Some(0xdead_beef)).unwrap();
        assert_eq!(key.parts(), (t, 7, 0xdead_beef));

        let parsed = OrderedKey::decode(key.as_bytes()).unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn test_encode_is_deterministic_with_explicit_fields() {
        let a = OrderedKey::encode(12.5, Some(1), Some(2)).unwrap();
        let b = OrderedKey::encode(12.5, Some(1), Some(2)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_time_dominates_disambiguators() {
        let early = OrderedKey::encode(100.0, Some(u32::MAX), Some(u32::MAX)).unwrap();
        let late = OrderedKey::encode(100.01, Some(0), Some(0)).unwrap();
        assert!(early.as_bytes() < late.as_bytes());
    }

    #[test]
    fn test_sequence_then_tiebreaker_order() {
        let a = OrderedKey::encode(5.0, Some(1), Some(9)).unwrap();
        let b = OrderedKey::encode(5.0, Some(2), Some(0)).unwrap();
        let c = OrderedKey::encode(5.0, Some(2), Some(1)).unwrap();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_byte_order_matches_numeric_order() {
        let times = [
            -1_000_000.0,
            -1.5,
            -0.001,
            0.0,
            0.001,
            1.0,
            1_234_567.25,
            4_000_000_000.0,
        ];
        let keys: Vec<_> = times
            .iter()
            .map(|t| OrderedKey::encode(*t, None, None).unwrap())
            .collect();

        for pair in keys.windows(2) {
            assert!(pair[0].as_bytes() < pair[1].as_bytes(), "{pair:?}");
        }
    }

    #[test]
    fn test_random_fields_vary() {
        let keys: std::collections::HashSet<_> = (0..32)
            .map(|_| OrderedKey::encode(1.0, None, None).unwrap())
            .collect();
        assert!(keys.len() > 1);
    }

    #[test]
    fn test_out_of_range() {
        assert!(matches!(
            OrderedKey::encode(f64::NAN, None, None),
            Err(KeyError::TimestampOutOfRange(_))
        ));
        assert!(OrderedKey::encode(f64::INFINITY, None, None).is_err());
        assert!(OrderedKey::encode(1e300, None, None).is_err());
        assert!(OrderedKey::encode(-1e300, None, None).is_err());
    }

    #[test]
    fn test_bounds_bracket_tick() {
        let t = 1000.0;
        let lower = OrderedKey::lower_bound(t).unwrap();
        let upper = OrderedKey::upper_bound(t).unwrap();
        let inside = OrderedKey::encode(t, Some(u32::MAX), Some(u32::MAX)).unwrap();
        let next = OrderedKey::encode(t + 1.0 / TIME_SCALE, Some(0), Some(0)).unwrap();

        assert!(lower <= inside);
        assert!(inside < upper);
        assert_eq!(upper, next);
    }

    #[test]
    fn test_decode_wrong_length() {
        assert_eq!(
            OrderedKey::decode(&[1, 2, 3]),
            Err(KeyError::InvalidLength(3))
        );
    }

    #[test]
    fn test_hex_round_trip() {
        let key = OrderedKey::encode(42.0, Some(3), Some(4)).unwrap();
        let text = key.to_string();
        assert_eq!(text.len(), 32);
        assert_eq!(text.parse::<OrderedKey>().unwrap(), key);
        assert!("zz".parse::<OrderedKey>().is_err());
    }
}
