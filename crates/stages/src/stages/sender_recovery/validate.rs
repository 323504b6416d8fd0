use crate::error::InvalidTransactionError;
use weft_primitives::{
    ChainId, Hardfork, TransactionSigned, TxType, SECP256K1N, SECP256K1N_HALF, U256,
};

/// Checks that a transaction is acceptable under the given revision before
/// its signer is recovered.
///
/// Typed envelopes must not appear before the fork that introduced them, the
/// signature values must be in range (with the EIP-2 malleability guard once
/// Homestead is active), and a chain id, if present, requires EIP-155 and
/// must match the configured chain.
pub(crate) fn validate_transaction(
    transaction: &TransactionSigned,
    revision: Hardfork,
    chain_id: ChainId,
) -> Result<(), InvalidTransactionError> {
    match transaction.tx_type() {
        TxType::Legacy => {}
        TxType::Eip2930 => {
            if revision < Hardfork::Berlin {
                return Err(InvalidTransactionError::TypeNotEnabled(TxType::Eip2930, revision))
            }
        }
        TxType::Eip1559 => {
            if revision < Hardfork::London {
                return Err(InvalidTransactionError::TypeNotEnabled(TxType::Eip1559, revision))
            }
        }
    }

    let signature = transaction.signature();
    if !is_valid_signature(signature.r, signature.s, revision >= Hardfork::Homestead) {
        return Err(InvalidTransactionError::Signature)
    }

    if let Some(tx_chain_id) = transaction.chain_id() {
        if revision < Hardfork::SpuriousDragon {
            return Err(InvalidTransactionError::ChainIdBeforeSpuriousDragon)
        }
        if tx_chain_id != chain_id {
            return Err(InvalidTransactionError::ChainIdMismatch {
                got: tx_chain_id,
                expected: chain_id,
            })
        }
    }

    Ok(())
}

/// `r` and `s` must be non-zero and below the curve order; once Homestead is
/// active, `s` must also lie in the lower half of the order (EIP-2).
fn is_valid_signature(r: U256, s: U256, homestead: bool) -> bool {
    if r.is_zero() || s.is_zero() {
        return false
    }
    if r >= SECP256K1N || s >= SECP256K1N {
        return false
    }
    !(homestead && s > SECP256K1N_HALF)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::generators;

    fn legacy_tx(chain_id: Option<ChainId>) -> TransactionSigned {
        generators::random_signed_tx(&mut generators::rng(), TxType::Legacy, chain_id)
    }

    fn tx_with_signature(r: U256, s: U256) -> TransactionSigned {
        generators::signed_tx_with_signature(TxType::Legacy, None, r, s)
    }

    #[test]
    fn legacy_accepted_at_every_revision() {
        let tx = legacy_tx(None);
        for revision in [Hardfork::Frontier, Hardfork::Homestead, Hardfork::Cancun] {
            assert_eq!(validate_transaction(&tx, revision, 1), Ok(()));
        }
    }

    #[test]
    fn typed_transactions_gated_by_fork() {
        let mut rng = generators::rng();

        let tx = generators::random_signed_tx(&mut rng, TxType::Eip2930, Some(1));
        assert_eq!(
            validate_transaction(&tx, Hardfork::Istanbul, 1),
            Err(InvalidTransactionError::TypeNotEnabled(TxType::Eip2930, Hardfork::Istanbul))
        );
        assert_eq!(validate_transaction(&tx, Hardfork::Berlin, 1), Ok(()));

        let tx = generators::random_signed_tx(&mut rng, TxType::Eip1559, Some(1));
        assert_eq!(
            validate_transaction(&tx, Hardfork::Berlin, 1),
            Err(InvalidTransactionError::TypeNotEnabled(TxType::Eip1559, Hardfork::Berlin))
        );
        assert_eq!(validate_transaction(&tx, Hardfork::London, 1), Ok(()));
    }

    #[test]
    fn zero_and_out_of_range_signature_values_rejected() {
        let cases = [
            (U256::ZERO, U256::from(1)),
            (U256::from(1), U256::ZERO),
            (SECP256K1N, U256::from(1)),
            (U256::from(1), SECP256K1N),
        ];
        for (r, s) in cases {
            assert_eq!(
                validate_transaction(&tx_with_signature(r, s), Hardfork::Frontier, 1),
                Err(InvalidTransactionError::Signature)
            );
        }
    }

    #[test]
    fn high_s_rejected_once_homestead_is_active() {
        // a malleable signature: s in the upper half of the curve order
        let tx = tx_with_signature(U256::from(1), SECP256K1N - U256::from(1));

        assert_eq!(validate_transaction(&tx, Hardfork::Frontier, 1), Ok(()));
        assert_eq!(
            validate_transaction(&tx, Hardfork::Homestead, 1),
            Err(InvalidTransactionError::Signature)
        );

        // the halfway point itself remains valid
        let tx = tx_with_signature(U256::from(1), SECP256K1N_HALF);
        assert_eq!(validate_transaction(&tx, Hardfork::Homestead, 1), Ok(()));
    }

    #[test]
    fn chain_id_requires_spurious_dragon() {
        let tx = legacy_tx(Some(1));
        assert_eq!(
            validate_transaction(&tx, Hardfork::Homestead, 1),
            Err(InvalidTransactionError::ChainIdBeforeSpuriousDragon)
        );
        assert_eq!(validate_transaction(&tx, Hardfork::SpuriousDragon, 1), Ok(()));
    }

    #[test]
    fn chain_id_must_match_the_configured_chain() {
        let tx = legacy_tx(Some(3));
        assert_eq!(
            validate_transaction(&tx, Hardfork::London, 1),
            Err(InvalidTransactionError::ChainIdMismatch { got: 3, expected: 1 })
        );
        assert_eq!(validate_transaction(&tx, Hardfork::London, 3), Ok(()));
    }
}
