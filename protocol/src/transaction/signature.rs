//! # Proof-of-Ring Blob
//!
//! The public key material a verifier needs to re-check a ring signature:
//! the ring itself and, for every row, the ledger commitment indexes its
//! cells were taken from.
//!
//! ```text
//! [4 bytes: big-endian length L of ring bytes][L ring bytes]
//! [1 byte: rows n][1 byte: columns m]
//! [n·m·8 bytes: row-major commitment indexes, big-endian u64]
//! ```
//!
//! `m` here is the number of real inputs. The ring carries one more column
//! (the aggregate) that has no index. Decoding is strict: any truncation,
//! overrun, out-of-range dimension or trailing byte is
//! [`TxError::MalformedSignatureBytes`].

use super::error::TxError;
use crate::config::MAX_RING_DIMENSION;
use crate::privacy::Ring;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RingSignaturePublicKey {
    pub ring: Ring,
    /// `n × m` commitment indexes. Rectangular by construction.
    pub indexes: Vec<Vec<u64>>,
}

impl RingSignaturePublicKey {
    pub fn new(ring: Ring, indexes: Vec<Vec<u64>>) -> Result<Self, TxError> {
        let columns = indexes.first().map(Vec::len).unwrap_or(0);
        if indexes.len() != ring.rows() {
            return Err(TxError::malformed(format!(
                "{} index rows for a ring with {} rows",
                indexes.len(),
                ring.rows()
            )));
        }
        if columns + 1 != ring.columns() || indexes.iter().any(|row| row.len() != columns) {
            return Err(TxError::malformed("index grid does not match ring columns"));
        }
        Ok(Self { ring, indexes })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let ring_bytes = self.ring.to_bytes();
        let n = self.indexes.len();
        let m = self.indexes.first().map(Vec::len).unwrap_or(0);

        let mut out = Vec::with_capacity(4 + ring_bytes.len() + 2 + n * m * 8);
        out.extend_from_slice(&(ring_bytes.len() as u32).to_be_bytes());
        out.extend_from_slice(&ring_bytes);
        out.push(n as u8);
        out.push(m as u8);
        for row in &self.indexes {
            for index in row {
                out.extend_from_slice(&index.to_be_bytes());
            }
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TxError> {
        let (ring_bytes, indexes) = Self::split(bytes)?;
        Self::assemble(ring_bytes, indexes)
    }

    /// Check the outer framing and pull out the raw ring bytes and the index
    /// grid. Ring contents are not looked at.
    pub(crate) fn split(bytes: &[u8]) -> Result<(&[u8], Vec<Vec<u64>>), TxError> {
        if bytes.len() < 4 {
            return Err(TxError::malformed("blob shorter than its length prefix"));
        }
        let ring_len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        let rest = &bytes[4..];
        if ring_len > rest.len() {
            return Err(TxError::malformed(format!(
                "ring length {ring_len} overruns {} remaining bytes",
                rest.len()
            )));
        }
        let (ring_bytes, rest) = rest.split_at(ring_len);

        if rest.len() < 2 {
            return Err(TxError::malformed("index header truncated"));
        }
        let (n, m) = (rest[0] as usize, rest[1] as usize);
        if n == 0 || m == 0 || n > MAX_RING_DIMENSION || m > MAX_RING_DIMENSION {
            return Err(TxError::malformed(format!("index grid {n}x{m} out of range")));
        }
        let body = &rest[2..];
        if body.len() != n * m * 8 {
            return Err(TxError::malformed(format!(
                "index grid needs {} bytes, found {}",
                n * m * 8,
                body.len()
            )));
        }

        let flat: Vec<u64> = body
            .chunks_exact(8)
            .map(|chunk| {
                let mut arr = [0u8; 8];
                arr.copy_from_slice(chunk);
                u64::from_be_bytes(arr)
            })
            .collect();
        Ok((ring_bytes, flat.chunks(m).map(<[u64]>::to_vec).collect()))
    }

    /// Decode the ring and pair it with its index grid.
    pub(crate) fn assemble(ring_bytes: &[u8], indexes: Vec<Vec<u64>>) -> Result<Self, TxError> {
        let ring = Ring::from_bytes(ring_bytes).map_err(|e| TxError::malformed(e.to_string()))?;
        Self::new(ring, indexes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curve25519_dalek::ristretto::RistrettoPoint;
    use proptest::prelude::*;
    use rand::rngs::OsRng;

    fn blob(n: usize, inputs: usize) -> RingSignaturePublicKey {
        let ring = Ring::new(
            (0..n)
                .map(|_| {
                    (0..=inputs)
                        .map(|_| RistrettoPoint::random(&mut OsRng).compress())
                        .collect()
                })
                .collect(),
        )
        .unwrap();
        let indexes = (0..n)
            .map(|i| (0..inputs).map(|j| (i * 1_000 + j) as u64 + u32::MAX as u64).collect())
            .collect();
        RingSignaturePublicKey::new(ring, indexes).unwrap()
    }

    #[test]
    fn round_trip_preserves_ring_and_indexes() {
        let original = blob(8, 2);
        let decoded = RingSignaturePublicKey::from_bytes(&original.to_bytes()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn every_truncation_is_malformed() {
        let bytes = blob(3, 2).to_bytes();
        for cut in 0..bytes.len() {
            match RingSignaturePublicKey::from_bytes(&bytes[..cut]) {
                Err(TxError::MalformedSignatureBytes { .. }) => {}
                other => panic!("cut at {cut}: expected MalformedSignatureBytes, got {:?}", other),
            }
        }
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = blob(2, 1).to_bytes();
        bytes.push(0);
        assert!(matches!(
            RingSignaturePublicKey::from_bytes(&bytes),
            Err(TxError::MalformedSignatureBytes { .. })
        ));
    }

    #[test]
    fn overrunning_length_prefix_rejected() {
        let mut bytes = blob(2, 1).to_bytes();
        bytes[0] = 0xff;
        assert!(matches!(
            RingSignaturePublicKey::from_bytes(&bytes),
            Err(TxError::MalformedSignatureBytes { .. })
        ));
    }

    #[test]
    fn zero_dimension_rejected() {
        let mut bytes = blob(2, 1).to_bytes();
        let ring_len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        bytes[4 + ring_len + 1] = 0;
        assert!(RingSignaturePublicKey::from_bytes(&bytes).is_err());
    }

    #[test]
    fn index_grid_must_match_ring() {
        let original = blob(4, 2);
        let short = original.indexes[..3].to_vec();
        assert!(RingSignaturePublicKey::new(original.ring.clone(), short).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn round_trip_any_shape(n in 1usize..20, inputs in 1usize..6) {
            let original = blob(n, inputs);
            let decoded = RingSignaturePublicKey::from_bytes(&original.to_bytes()).unwrap();
            prop_assert_eq!(decoded.indexes, original.indexes);
            prop_assert_eq!(decoded.ring, original.ring);
        }
    }
}
