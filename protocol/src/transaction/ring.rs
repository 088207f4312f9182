//! # Ring Builder
//!
//! Turns a set of real input coins into an `n × (m + 1)` ring: the real row
//! at a secret position, decoy rows sampled from the ledger everywhere else.
//!
//! ```text
//!            input 0     input 1    ...   aggregate
//! row 0      pk[i0,0]    pk[i0,1]         Σ vc(row 0) − fee·Gv − Σ vc(out)
//! row π      pk(real)    pk(real)         Σ vc(real)  − fee·Gv − Σ vc(out)
//! row n-1    pk[..]      pk[..]           ...
//! ```
//!
//! `vc(·)` is a coin's value commitment re-derived under the transaction's
//! shard. Every row's aggregate comes from the same formula with no special
//! case for the real row, which is why a verifier holding only the index
//! grid can recompute each one from the ledger. Only on the real row does
//! the aggregate collapse to `(Σ r_in − Σ r_out)·G`, a key the signer
//! actually knows.

use std::collections::HashSet;

use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use rand::Rng;
use rand_core::{CryptoRng, RngCore};
use tracing::debug;

use super::error::TxError;
use crate::config::{ShardId, MAX_DECOY_ATTEMPTS, MAX_RING_DIMENSION};
use crate::crypto::hash::Hash;
use crate::crypto::keys::KeySet;
use crate::privacy::{generators, Coin, InputCoin, OutputCoin, Ring};
use crate::storage::{CommitmentStore, StoreError};

/// Where and how big the ring is.
#[derive(Clone, Copy, Debug)]
pub struct RingParams {
    pub token_id: Hash,
    pub shard_id: ShardId,
    pub fee: u64,
    pub ring_size: usize,
}

/// A finished ring plus the signer's secrets. `real_index` and
/// `private_keys` never leave the signer.
#[derive(Debug)]
pub struct BuiltRing {
    pub ring: Ring,
    pub indexes: Vec<Vec<u64>>,
    pub real_index: usize,
    /// One coin key per input, then the balance scalar.
    pub private_keys: Vec<Scalar>,
}

/// The fee and output terms shared by every row's aggregate.
pub(crate) struct AggregateTerms {
    subtrahend: RistrettoPoint,
}

impl AggregateTerms {
    pub(crate) fn new(fee: u64, outputs: &[Coin], shard_id: ShardId) -> Result<Self, TxError> {
        let mut subtrahend = generators().commit_value(fee, &Scalar::ZERO);
        for (output, coin) in outputs.iter().enumerate() {
            subtrahend += coin.value_commitment(shard_id).ok_or_else(|| {
                TxError::invalid(format!("output {output} is not a valid commitment"))
            })?;
        }
        Ok(Self { subtrahend })
    }

    pub(crate) fn for_row(&self, input_sum: RistrettoPoint) -> RistrettoPoint {
        input_sum - self.subtrahend
    }
}

/// Fetch a coin record and turn a missing one into a store failure.
pub(crate) fn fetch_coin<S: CommitmentStore + ?Sized>(
    store: &S,
    token_id: &Hash,
    index: u64,
    shard_id: ShardId,
) -> Result<Coin, TxError> {
    store
        .commitment_by_index(token_id, index, shard_id)?
        .ok_or_else(|| {
            TxError::StoreUnavailable(StoreError::Corrupt(format!(
                "commitment index {index} of token {token_id} on shard {shard_id} has no record"
            )))
        })
}

pub fn build_ring<S, R>(
    store: &S,
    sender: &KeySet,
    inputs: &[InputCoin],
    outputs: &[OutputCoin],
    params: &RingParams,
    rng: &mut R,
) -> Result<BuiltRing, TxError>
where
    S: CommitmentStore + ?Sized,
    R: RngCore + CryptoRng,
{
    let RingParams {
        token_id,
        shard_id,
        fee,
        ring_size,
    } = *params;

    if inputs.is_empty() {
        return Err(TxError::invalid("a ring needs at least one input"));
    }
    if ring_size == 0 || ring_size > MAX_RING_DIMENSION || inputs.len() + 1 > MAX_RING_DIMENSION {
        return Err(TxError::invalid(format!(
            "ring of {ring_size} rows and {} columns is out of range",
            inputs.len() + 1
        )));
    }

    let count = store.commitment_count(&token_id, shard_id)?;
    if count == 0 {
        return Err(TxError::NoCommitmentsAvailable { token_id, shard_id });
    }

    let output_coins: Vec<Coin> = outputs.iter().map(|o| o.coin).collect();
    let terms = AggregateTerms::new(fee, &output_coins, shard_id)?;
    let real_index = rng.gen_range(0..ring_size);

    // Real row.
    let mut private_keys = Vec::with_capacity(inputs.len() + 1);
    let mut real_cells = Vec::with_capacity(inputs.len() + 1);
    let mut real_indexes = Vec::with_capacity(inputs.len());
    let mut real_sum = RistrettoPoint::default();
    let mut real_commitments = HashSet::with_capacity(inputs.len());

    for (input, coin) in inputs.iter().enumerate() {
        let secret = sender.coin_secret(&coin.coin.snd);
        let public_key = (secret * RISTRETTO_BASEPOINT_POINT).compress();
        if public_key != coin.coin.public_key {
            return Err(TxError::SigningError {
                reason: format!("input {input} is not owned by the signer"),
            });
        }
        let index = store
            .commitment_index(&token_id, &coin.coin.commitment, shard_id)?
            .ok_or(TxError::UnknownInputCoin { input })?;
        real_sum += coin
            .coin
            .value_commitment(shard_id)
            .ok_or(TxError::UnknownInputCoin { input })?;

        private_keys.push(secret);
        real_cells.push(public_key);
        real_indexes.push(index);
        real_commitments.insert(coin.coin.commitment.to_bytes());
    }

    let real_aggregate = terms.for_row(real_sum);
    let balance_key: Scalar = inputs.iter().map(|c| c.randomness).sum::<Scalar>()
        - outputs.iter().map(|c| c.randomness).sum::<Scalar>();
    if real_aggregate != balance_key * RISTRETTO_BASEPOINT_POINT {
        return Err(TxError::SigningError {
            reason: "inputs do not cover outputs plus fee".into(),
        });
    }
    private_keys.push(balance_key);
    real_cells.push(real_aggregate.compress());

    // Decoy rows.
    let allow_duplicates = count <= inputs.len() as u64;
    let mut cells = Vec::with_capacity(ring_size);
    let mut indexes = Vec::with_capacity(ring_size);

    for row in 0..ring_size {
        if row == real_index {
            cells.push(real_cells.clone());
            indexes.push(real_indexes.clone());
            continue;
        }

        let mut row_cells: Vec<CompressedRistretto> = Vec::with_capacity(inputs.len() + 1);
        let mut row_indexes = Vec::with_capacity(inputs.len());
        let mut row_sum = RistrettoPoint::default();

        for _ in 0..inputs.len() {
            let (index, coin, value_commitment) = sample_decoy(
                store,
                &token_id,
                shard_id,
                count,
                &real_commitments,
                allow_duplicates,
                inputs.len(),
                rng,
            )?;
            row_sum += value_commitment;
            row_cells.push(coin.public_key);
            row_indexes.push(index);
        }

        row_cells.push(terms.for_row(row_sum).compress());
        cells.push(row_cells);
        indexes.push(row_indexes);
    }

    let ring = Ring::new(cells).map_err(|e| TxError::invalid(e.to_string()))?;
    debug!(
        token = %token_id,
        shard = shard_id,
        rows = ring.rows(),
        inputs = inputs.len(),
        pool = count,
        "ring built"
    );

    Ok(BuiltRing {
        ring,
        indexes,
        real_index,
        private_keys,
    })
}

#[allow(clippy::too_many_arguments)]
fn sample_decoy<S, R>(
    store: &S,
    token_id: &Hash,
    shard_id: ShardId,
    count: u64,
    real_commitments: &HashSet<[u8; 32]>,
    allow_duplicates: bool,
    needed: usize,
    rng: &mut R,
) -> Result<(u64, Coin, RistrettoPoint), TxError>
where
    S: CommitmentStore + ?Sized,
    R: RngCore + CryptoRng,
{
    for _ in 0..MAX_DECOY_ATTEMPTS {
        let index = rng.gen_range(0..count);
        if !store.has_commitment_index(token_id, index, shard_id)? {
            return Err(TxError::StoreUnavailable(StoreError::Corrupt(format!(
                "commitment index {index} below count {count} is missing"
            ))));
        }
        let coin = fetch_coin(store, token_id, index, shard_id)?;
        if !allow_duplicates && real_commitments.contains(coin.commitment.as_bytes()) {
            continue;
        }
        let value_commitment = coin.value_commitment(shard_id).ok_or_else(|| {
            TxError::StoreUnavailable(StoreError::Corrupt(format!(
                "commitment index {index} holds an invalid point"
            )))
        })?;
        return Ok((index, coin, value_commitment));
    }
    Err(TxError::DecoySelectionExhausted {
        needed,
        attempts: MAX_DECOY_ATTEMPTS,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NATIVE_TOKEN_ID;
    use crate::storage::LedgerDb;
    use crate::transaction::test_support::{fund, seed_decoys};
    use rand::rngs::OsRng;

    const SHARD: ShardId = 3;

    fn params(fee: u64, ring_size: usize) -> RingParams {
        RingParams {
            token_id: NATIVE_TOKEN_ID,
            shard_id: SHARD,
            fee,
            ring_size,
        }
    }

    fn output(value: u64) -> OutputCoin {
        let to = KeySet::generate().payment_address();
        OutputCoin::new(&to, value, Scalar::random(&mut OsRng), SHARD, &mut OsRng).unwrap()
    }

    #[test]
    fn every_row_aggregate_follows_from_the_ledger() {
        let db = LedgerDb::open_temporary().unwrap();
        let sender = KeySet::generate();
        seed_decoys(&db, NATIVE_TOKEN_ID, SHARD, 10);
        let inputs = fund(&db, &sender, &[5, 3], NATIVE_TOKEN_ID, SHARD);
        let outputs = vec![output(7)];

        let built = build_ring(&db, &sender, &inputs, &outputs, &params(1, 4), &mut OsRng).unwrap();
        assert_eq!(built.ring.rows(), 4);
        assert_eq!(built.ring.columns(), 3);
        assert_eq!(built.private_keys.len(), 3);

        let coins: Vec<Coin> = outputs.iter().map(|o| o.coin).collect();
        let terms = AggregateTerms::new(1, &coins, SHARD).unwrap();
        for (row, indexes) in built.indexes.iter().enumerate() {
            let sum: RistrettoPoint = indexes
                .iter()
                .map(|&i| {
                    fetch_coin(&db, &NATIVE_TOKEN_ID, i, SHARD)
                        .unwrap()
                        .value_commitment(SHARD)
                        .unwrap()
                })
                .sum();
            assert_eq!(*built.ring.key(row, 2), terms.for_row(sum).compress(), "row {row}");
        }
        let balance = built.private_keys[2] * RISTRETTO_BASEPOINT_POINT;
        assert_eq!(*built.ring.key(built.real_index, 2), balance.compress());
    }

    #[test]
    fn single_row_ring_is_just_the_real_row() {
        let db = LedgerDb::open_temporary().unwrap();
        let sender = KeySet::generate();
        let inputs = fund(&db, &sender, &[4], NATIVE_TOKEN_ID, SHARD);
        let built = build_ring(&db, &sender, &inputs, &[output(4)], &params(0, 1), &mut OsRng).unwrap();
        assert_eq!(built.real_index, 0);
        assert_eq!(built.ring.rows(), 1);
        assert_eq!(*built.ring.key(0, 0), inputs[0].coin.public_key);
    }

    #[test]
    fn empty_ledger_has_no_commitments() {
        let db = LedgerDb::open_temporary().unwrap();
        let sender = KeySet::generate();
        let other = LedgerDb::open_temporary().unwrap();
        let inputs = fund(&other, &sender, &[4], NATIVE_TOKEN_ID, SHARD);
        assert!(matches!(
            build_ring(&db, &sender, &inputs, &[output(4)], &params(0, 2), &mut OsRng),
            Err(TxError::NoCommitmentsAvailable { .. })
        ));
    }

    #[test]
    fn decoy_sampling_gives_up_when_only_real_coins_exist() {
        let db = LedgerDb::open_temporary().unwrap();
        let sender = KeySet::generate();
        let inputs = fund(&db, &sender, &[4], NATIVE_TOKEN_ID, SHARD);
        // A second copy of the same coin: two indexes, no usable decoy.
        db.store_commitments(&NATIVE_TOKEN_ID, SHARD, &[inputs[0].coin]).unwrap();
        assert!(matches!(
            build_ring(&db, &sender, &inputs, &[output(4)], &params(0, 2), &mut OsRng),
            Err(TxError::DecoySelectionExhausted { needed: 1, .. })
        ));
    }

    #[test]
    fn unbalanced_outputs_refused() {
        let db = LedgerDb::open_temporary().unwrap();
        let sender = KeySet::generate();
        seed_decoys(&db, NATIVE_TOKEN_ID, SHARD, 4);
        let inputs = fund(&db, &sender, &[4], NATIVE_TOKEN_ID, SHARD);
        assert!(matches!(
            build_ring(&db, &sender, &inputs, &[output(5)], &params(0, 2), &mut OsRng),
            Err(TxError::SigningError { .. })
        ));
    }

    #[test]
    fn inputs_of_another_owner_refused() {
        let db = LedgerDb::open_temporary().unwrap();
        let owner = KeySet::generate();
        let thief = KeySet::generate();
        seed_decoys(&db, NATIVE_TOKEN_ID, SHARD, 4);
        let inputs = fund(&db, &owner, &[4], NATIVE_TOKEN_ID, SHARD);
        assert!(matches!(
            build_ring(&db, &thief, &inputs, &[output(4)], &params(0, 2), &mut OsRng),
            Err(TxError::SigningError { .. })
        ));
    }

    #[test]
    fn oversized_ring_rejected() {
        let db = LedgerDb::open_temporary().unwrap();
        let sender = KeySet::generate();
        let inputs = fund(&db, &sender, &[4], NATIVE_TOKEN_ID, SHARD);
        assert!(matches!(
            build_ring(&db, &sender, &inputs, &[output(4)], &params(0, MAX_RING_DIMENSION + 1), &mut OsRng),
            Err(TxError::InvalidTransaction { .. })
        ));
    }
}
