//! Coins in their three guises: the public ledger record ([`Coin`]), a coin
//! being spent ([`InputCoin`]), and a coin being created ([`OutputCoin`]).

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use super::commitment::generators;
use crate::config::ShardId;
use crate::crypto::keys::{KeyError, PaymentAddress};

/// What the ledger stores about a coin. No secrets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    /// One-time public key.
    pub public_key: CompressedRistretto,
    /// Full ledger commitment.
    pub commitment: CompressedRistretto,
    /// Serial-number derivator.
    pub snd: Scalar,
}

impl Coin {
    /// Re-derive `v·Gv + r·G` for this coin under `shard_id`. `None` if
    /// either stored point does not decompress.
    pub fn value_commitment(&self, shard_id: ShardId) -> Option<RistrettoPoint> {
        let commitment = self.commitment.decompress()?;
        let public_key = self.public_key.decompress()?;
        Some(generators().value_commitment(&commitment, &public_key, &self.snd, shard_id))
    }
}

/// A coin in the "being spent" role. The spender knows its opening.
#[derive(Clone, Debug)]
pub struct InputCoin {
    pub coin: Coin,
    pub value: u64,
    pub randomness: Scalar,
    /// Key image, filled in when the spending transaction is signed.
    pub serial_number: Option<CompressedRistretto>,
}

/// A coin in the "being created" role.
#[derive(Clone, Debug)]
pub struct OutputCoin {
    pub coin: Coin,
    pub value: u64,
    pub randomness: Scalar,
}

impl OutputCoin {
    /// Lock `value` to `recipient` with a fresh SND and the given blinding
    /// factor.
    pub fn new<R: RngCore + CryptoRng>(
        recipient: &PaymentAddress,
        value: u64,
        randomness: Scalar,
        shard_id: ShardId,
        rng: &mut R,
    ) -> Result<Self, KeyError> {
        let snd = Scalar::random(rng);
        let public_key = recipient.coin_public_key(&snd)?;
        let commitment = generators().commit_coin(&public_key, value, &snd, shard_id, &randomness);
        Ok(Self {
            coin: Coin {
                public_key: public_key.compress(),
                commitment: commitment.compress(),
                snd,
            },
            value,
            randomness,
        })
    }

    /// The same coin, now held by its recipient and ready to spend.
    pub fn into_input(self) -> InputCoin {
        InputCoin {
            coin: self.coin,
            value: self.value,
            randomness: self.randomness,
            serial_number: None,
        }
    }
}

/// A requested payment: `amount` to `address`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInfo {
    pub address: PaymentAddress,
    pub amount: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::KeySet;
    use rand::rngs::OsRng;

    #[test]
    fn output_coin_strips_to_its_value_commitment() {
        let addr = KeySet::generate().payment_address();
        let r = Scalar::random(&mut OsRng);
        let out = OutputCoin::new(&addr, 12, r, 2, &mut OsRng).unwrap();
        assert_eq!(
            out.coin.value_commitment(2).unwrap(),
            generators().commit_value(12, &r)
        );
    }

    #[test]
    fn output_coin_key_belongs_to_recipient() {
        let keys = KeySet::generate();
        let out = OutputCoin::new(&keys.payment_address(), 1, Scalar::ONE, 0, &mut OsRng).unwrap();
        let expected = keys.coin_secret(&out.coin.snd)
            * curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
        assert_eq!(out.coin.public_key, expected.compress());
    }

    #[test]
    fn undecodable_points_yield_none() {
        let coin = Coin {
            public_key: CompressedRistretto([0xff; 32]),
            commitment: CompressedRistretto([0xff; 32]),
            snd: Scalar::ZERO,
        };
        assert!(coin.value_commitment(0).is_none());
    }
}
