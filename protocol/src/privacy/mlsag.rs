//! # MLSAG: Multilayered Linkable Spontaneous Anonymous Group signatures
//!
//! A ring is an `n × m` matrix of public keys. The signer knows the private
//! keys of every cell in one secret row `π` and proves it without saying
//! which row.
//!
//! ```text
//!            col 0 .. col m-2          col m-1
//!          ┌─────────────────────┬──────────────┐
//!  row 0   │ coin keys (decoy)   │ aggregate    │
//!  row π   │ coin keys (real)    │ aggregate    │  ← signer knows x_j
//!  row n-1 │ coin keys (decoy)   │ aggregate    │
//!          └─────────────────────┴──────────────┘
//!             linkable: I_j         not linkable
//! ```
//!
//! The first `m − 1` columns are **linkable**: each carries a key image
//! `I_j = x_j · Hp(P_{π,j})`, so spending the same coin twice produces the
//! same image. The last column is the balance aggregate and carries none.
//!
//! ## Ring loop
//!
//! ```text
//! c_{π+1} = H(msg, I, {α_j·G, α_j·Hp(P_{π,j})})
//! c_{i+1} = H(msg, I, {s_ij·G + c_i·P_ij, s_ij·Hp(P_ij) + c_i·I_j})
//! s_{π,j} = α_j − c_π·x_j
//! ```
//!
//! Verification walks the loop from row 0 and checks it closes on `c_0`.

use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;
use rand_core::{CryptoRng, RngCore};
use sha2::{Digest, Sha512};
use thiserror::Error;

use crate::config::MAX_RING_DIMENSION;
use crate::crypto::hash::hash_to_point;

const ROUND_HASH_DOMAIN: &[u8] = b"cloak/mlsag-round";
const KEY_IMAGE_DOMAIN: &[u8] = b"cloak/key-image";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MlsagError {
    #[error("invalid ring dimensions {rows}x{columns}")]
    InvalidDimensions { rows: usize, columns: usize },

    #[error("real row {index} out of bounds for ring with {rows} rows")]
    IndexOutOfBounds { index: usize, rows: usize },

    #[error("expected {expected} private keys, got {got}")]
    KeyCountMismatch { expected: usize, got: usize },

    #[error("private key {column} does not match ring cell ({row}, {column})")]
    KeyMismatch { row: usize, column: usize },

    #[error("ring cell ({row}, {column}) is not a valid curve point")]
    InvalidCurvePoint { row: usize, column: usize },

    #[error("key image {column} is invalid")]
    InvalidKeyImage { column: usize },

    #[error("signature shape does not match ring: {0}")]
    LengthMismatch(String),

    #[error("malformed bytes: {0}")]
    Malformed(String),

    #[error("ring does not close")]
    InvalidSignature,
}

/// `Hp(P)`, the base of a key image.
pub fn key_image_base(public_key: &CompressedRistretto) -> RistrettoPoint {
    hash_to_point(KEY_IMAGE_DOMAIN, public_key.as_bytes())
}

/// `x · Hp(x·G)`.
pub fn key_image(private_key: &Scalar) -> CompressedRistretto {
    let public_key = (private_key * RISTRETTO_BASEPOINT_POINT).compress();
    (private_key * key_image_base(&public_key)).compress()
}

// ---------------------------------------------------------------------------
// Ring
// ---------------------------------------------------------------------------

/// Row-major matrix of compressed public keys.
///
/// Points stay compressed until someone needs them. A ring that round-trips
/// through bytes is equal to itself even if a cell was never a valid point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ring {
    rows: usize,
    columns: usize,
    keys: Vec<CompressedRistretto>,
}

impl Ring {
    pub fn new(keys: Vec<Vec<CompressedRistretto>>) -> Result<Self, MlsagError> {
        let rows = keys.len();
        let columns = keys.first().map(Vec::len).unwrap_or(0);
        check_dimensions(rows, columns)?;
        if keys.iter().any(|row| row.len() != columns) {
            return Err(MlsagError::InvalidDimensions { rows, columns });
        }
        Ok(Self {
            rows,
            columns,
            keys: keys.into_iter().flatten().collect(),
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn key(&self, row: usize, column: usize) -> &CompressedRistretto {
        &self.keys[row * self.columns + column]
    }

    pub fn row(&self, row: usize) -> &[CompressedRistretto] {
        &self.keys[row * self.columns..(row + 1) * self.columns]
    }

    /// `[n][m][n·m compressed points]`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + self.keys.len() * 32);
        out.push(self.rows as u8);
        out.push(self.columns as u8);
        for key in &self.keys {
            out.extend_from_slice(key.as_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MlsagError> {
        if bytes.len() < 2 {
            return Err(MlsagError::Malformed("ring header truncated".into()));
        }
        let rows = bytes[0] as usize;
        let columns = bytes[1] as usize;
        check_dimensions(rows, columns)?;
        let body = &bytes[2..];
        if body.len() != rows * columns * 32 {
            return Err(MlsagError::Malformed(format!(
                "ring body is {} bytes, expected {}",
                body.len(),
                rows * columns * 32
            )));
        }
        let keys = body
            .chunks_exact(32)
            .map(|chunk| {
                let mut arr = [0u8; 32];
                arr.copy_from_slice(chunk);
                CompressedRistretto(arr)
            })
            .collect();
        Ok(Self {
            rows,
            columns,
            keys,
        })
    }

    fn point(&self, row: usize, column: usize) -> Result<RistrettoPoint, MlsagError> {
        self.key(row, column)
            .decompress()
            .ok_or(MlsagError::InvalidCurvePoint { row, column })
    }
}

fn check_dimensions(rows: usize, columns: usize) -> Result<(), MlsagError> {
    if rows == 0 || columns == 0 || rows > MAX_RING_DIMENSION || columns > MAX_RING_DIMENSION {
        return Err(MlsagError::InvalidDimensions { rows, columns });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MlsagSignature {
    pub c0: Scalar,
    /// One per linkable column.
    pub key_images: Vec<CompressedRistretto>,
    /// Row-major, `n × m`.
    pub responses: Vec<Scalar>,
}

impl MlsagSignature {
    /// Sign `message` with the private keys of row `real_index`.
    ///
    /// `private_keys[j]` must open `ring[real_index][j]`. The last key is the
    /// balance scalar and gets no key image.
    pub fn sign<R: RngCore + CryptoRng>(
        message: &[u8],
        ring: &Ring,
        real_index: usize,
        private_keys: &[Scalar],
        rng: &mut R,
    ) -> Result<Self, MlsagError> {
        let (n, m) = (ring.rows, ring.columns);
        if real_index >= n {
            return Err(MlsagError::IndexOutOfBounds {
                index: real_index,
                rows: n,
            });
        }
        if private_keys.len() != m {
            return Err(MlsagError::KeyCountMismatch {
                expected: m,
                got: private_keys.len(),
            });
        }
        for (column, x) in private_keys.iter().enumerate() {
            if (x * RISTRETTO_BASEPOINT_POINT).compress() != *ring.key(real_index, column) {
                return Err(MlsagError::KeyMismatch {
                    row: real_index,
                    column,
                });
            }
        }

        let linkable = m - 1;
        let bases: Vec<RistrettoPoint> = (0..linkable)
            .map(|j| key_image_base(ring.key(real_index, j)))
            .collect();
        let images: Vec<RistrettoPoint> = (0..linkable)
            .map(|j| private_keys[j] * bases[j])
            .collect();
        let key_images: Vec<CompressedRistretto> = images.iter().map(|p| p.compress()).collect();

        let alphas: Vec<Scalar> = (0..m).map(|_| Scalar::random(rng)).collect();
        let mut responses = vec![Scalar::ZERO; n * m];
        let mut challenges = vec![Scalar::ZERO; n];

        let mut round = RoundHash::new(message, &key_images);
        for j in 0..m {
            let l = alphas[j] * RISTRETTO_BASEPOINT_POINT;
            let r = (j < linkable).then(|| alphas[j] * bases[j]);
            round.absorb(&l, r.as_ref());
        }
        challenges[(real_index + 1) % n] = round.finish();

        for step in 1..n {
            let i = (real_index + step) % n;
            let c = challenges[i];
            let mut round = RoundHash::new(message, &key_images);
            for j in 0..m {
                let s = Scalar::random(rng);
                responses[i * m + j] = s;
                let p = ring.point(i, j)?;
                let l = s * RISTRETTO_BASEPOINT_POINT + c * p;
                let r = (j < linkable)
                    .then(|| s * key_image_base(ring.key(i, j)) + c * images[j]);
                round.absorb(&l, r.as_ref());
            }
            challenges[(i + 1) % n] = round.finish();
        }

        let c_pi = challenges[real_index];
        for j in 0..m {
            responses[real_index * m + j] = alphas[j] - c_pi * private_keys[j];
        }

        Ok(Self {
            c0: challenges[0],
            key_images,
            responses,
        })
    }

    pub fn verify(&self, message: &[u8], ring: &Ring) -> Result<(), MlsagError> {
        let (n, m) = (ring.rows, ring.columns);
        if self.key_images.len() != m - 1 {
            return Err(MlsagError::LengthMismatch(format!(
                "{} key images for {} linkable columns",
                self.key_images.len(),
                m - 1
            )));
        }
        if self.responses.len() != n * m {
            return Err(MlsagError::LengthMismatch(format!(
                "{} responses for a {n}x{m} ring",
                self.responses.len()
            )));
        }

        let mut images = Vec::with_capacity(m - 1);
        for (column, image) in self.key_images.iter().enumerate() {
            let point = image
                .decompress()
                .filter(|p| *p != RistrettoPoint::identity())
                .ok_or(MlsagError::InvalidKeyImage { column })?;
            images.push(point);
        }

        let mut c = self.c0;
        for i in 0..n {
            let mut round = RoundHash::new(message, &self.key_images);
            for j in 0..m {
                let s = self.responses[i * m + j];
                let p = ring.point(i, j)?;
                let l = s * RISTRETTO_BASEPOINT_POINT + c * p;
                let r = (j < m - 1).then(|| s * key_image_base(ring.key(i, j)) + c * images[j]);
                round.absorb(&l, r.as_ref());
            }
            c = round.finish();
        }

        if c == self.c0 {
            Ok(())
        } else {
            Err(MlsagError::InvalidSignature)
        }
    }

    /// `[n][m][c0][key images][responses]`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let m = self.key_images.len() + 1;
        let n = self.responses.len() / m;
        let mut out = Vec::with_capacity(2 + 32 * (1 + self.key_images.len() + self.responses.len()));
        out.push(n as u8);
        out.push(m as u8);
        out.extend_from_slice(self.c0.as_bytes());
        for image in &self.key_images {
            out.extend_from_slice(image.as_bytes());
        }
        for s in &self.responses {
            out.extend_from_slice(s.as_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MlsagError> {
        if bytes.len() < 2 {
            return Err(MlsagError::Malformed("signature header truncated".into()));
        }
        let (n, m) = (bytes[0] as usize, bytes[1] as usize);
        check_dimensions(n, m)?;
        let expected = 2 + 32 * (1 + (m - 1) + n * m);
        if bytes.len() != expected {
            return Err(MlsagError::Malformed(format!(
                "signature is {} bytes, expected {expected}",
                bytes.len()
            )));
        }

        let mut chunks = bytes[2..].chunks_exact(32).map(|chunk| {
            let mut arr = [0u8; 32];
            arr.copy_from_slice(chunk);
            arr
        });
        let next_scalar = |chunks: &mut dyn Iterator<Item = [u8; 32]>| {
            chunks
                .next()
                .and_then(|arr| Option::<Scalar>::from(Scalar::from_canonical_bytes(arr)))
                .ok_or_else(|| MlsagError::Malformed("non-canonical scalar".into()))
        };

        let c0 = next_scalar(&mut chunks)?;
        let key_images = (0..m - 1)
            .map(|_| chunks.next().map(CompressedRistretto))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| MlsagError::Malformed("key images truncated".into()))?;
        let responses = (0..n * m)
            .map(|_| next_scalar(&mut chunks))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            c0,
            key_images,
            responses,
        })
    }
}

/// Fiat–Shamir transcript for one ring step.
struct RoundHash(Sha512);

impl RoundHash {
    fn new(message: &[u8], key_images: &[CompressedRistretto]) -> Self {
        let mut hasher = Sha512::new();
        hasher.update(ROUND_HASH_DOMAIN);
        hasher.update((message.len() as u64).to_le_bytes());
        hasher.update(message);
        for image in key_images {
            hasher.update(image.as_bytes());
        }
        Self(hasher)
    }

    fn absorb(&mut self, l: &RistrettoPoint, r: Option<&RistrettoPoint>) {
        self.0.update(l.compress().as_bytes());
        if let Some(r) = r {
            self.0.update(r.compress().as_bytes());
        }
    }

    fn finish(self) -> Scalar {
        Scalar::from_hash(self.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use rand::Rng;

    fn random_ring(n: usize, m: usize, real: usize, keys: &[Scalar]) -> Ring {
        let rows = (0..n)
            .map(|i| {
                (0..m)
                    .map(|j| {
                        if i == real {
                            (keys[j] * RISTRETTO_BASEPOINT_POINT).compress()
                        } else {
                            (Scalar::random(&mut OsRng) * RISTRETTO_BASEPOINT_POINT).compress()
                        }
                    })
                    .collect()
            })
            .collect();
        Ring::new(rows).unwrap()
    }

    fn random_keys(m: usize) -> Vec<Scalar> {
        (0..m).map(|_| Scalar::random(&mut OsRng)).collect()
    }

    #[test]
    fn sign_and_verify_various_shapes() {
        for &(n, m) in &[(1, 2), (4, 3), (8, 2), (11, 5)] {
            let keys = random_keys(m);
            let real = OsRng.gen_range(0..n);
            let ring = random_ring(n, m, real, &keys);
            let sig = MlsagSignature::sign(b"msg", &ring, real, &keys, &mut OsRng).unwrap();
            sig.verify(b"msg", &ring).unwrap();
        }
    }

    #[test]
    fn wrong_message_fails() {
        let keys = random_keys(2);
        let ring = random_ring(4, 2, 1, &keys);
        let sig = MlsagSignature::sign(b"msg", &ring, 1, &keys, &mut OsRng).unwrap();
        assert_eq!(sig.verify(b"other", &ring), Err(MlsagError::InvalidSignature));
    }

    #[test]
    fn key_images_match_standalone_derivation() {
        let keys = random_keys(3);
        let ring = random_ring(3, 3, 2, &keys);
        let sig = MlsagSignature::sign(b"m", &ring, 2, &keys, &mut OsRng).unwrap();
        assert_eq!(sig.key_images.len(), 2);
        assert_eq!(sig.key_images[0], key_image(&keys[0]));
        assert_eq!(sig.key_images[1], key_image(&keys[1]));
    }

    #[test]
    fn same_key_links_across_rings() {
        let keys = random_keys(2);
        let a = random_ring(4, 2, 0, &keys);
        let b = random_ring(6, 2, 5, &keys);
        let sig_a = MlsagSignature::sign(b"a", &a, 0, &keys, &mut OsRng).unwrap();
        let sig_b = MlsagSignature::sign(b"b", &b, 5, &keys, &mut OsRng).unwrap();
        assert_eq!(sig_a.key_images, sig_b.key_images);
    }

    #[test]
    fn signing_with_foreign_key_is_refused() {
        let keys = random_keys(2);
        let ring = random_ring(3, 2, 0, &keys);
        let wrong = random_keys(2);
        match MlsagSignature::sign(b"m", &ring, 0, &wrong, &mut OsRng) {
            Err(MlsagError::KeyMismatch { row: 0, column: 0 }) => {}
            other => panic!("expected KeyMismatch, got {:?}", other),
        }
    }

    #[test]
    fn swapped_key_image_fails() {
        let keys = random_keys(2);
        let ring = random_ring(4, 2, 3, &keys);
        let mut sig = MlsagSignature::sign(b"m", &ring, 3, &keys, &mut OsRng).unwrap();
        sig.key_images[0] = key_image(&Scalar::random(&mut OsRng));
        assert!(sig.verify(b"m", &ring).is_err());
    }

    #[test]
    fn signature_bytes_round_trip() {
        let keys = random_keys(3);
        let ring = random_ring(5, 3, 4, &keys);
        let sig = MlsagSignature::sign(b"m", &ring, 4, &keys, &mut OsRng).unwrap();
        let decoded = MlsagSignature::from_bytes(&sig.to_bytes()).unwrap();
        assert_eq!(decoded, sig);
        decoded.verify(b"m", &ring).unwrap();
    }

    #[test]
    fn truncated_signature_bytes_rejected() {
        let keys = random_keys(2);
        let ring = random_ring(2, 2, 0, &keys);
        let bytes = MlsagSignature::sign(b"m", &ring, 0, &keys, &mut OsRng)
            .unwrap()
            .to_bytes();
        for cut in 0..bytes.len() {
            assert!(MlsagSignature::from_bytes(&bytes[..cut]).is_err(), "cut at {cut}");
        }
    }

    #[test]
    fn ring_bytes_round_trip() {
        let keys = random_keys(4);
        let ring = random_ring(7, 4, 3, &keys);
        let decoded = Ring::from_bytes(&ring.to_bytes()).unwrap();
        assert_eq!(decoded, ring);
        assert_eq!(decoded.row(3)[1], (keys[1] * RISTRETTO_BASEPOINT_POINT).compress());
    }

    #[test]
    fn ragged_ring_rejected() {
        let p = RISTRETTO_BASEPOINT_POINT.compress();
        assert!(Ring::new(vec![vec![p, p], vec![p]]).is_err());
        assert!(Ring::new(vec![]).is_err());
    }
}
