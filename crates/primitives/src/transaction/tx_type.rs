/// The EIP-2718 envelope type of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum TxType {
    /// Legacy transaction, pre EIP-2718.
    #[default]
    Legacy = 0,
    /// Access-list transaction: <https://eips.ethereum.org/EIPS/eip-2930>
    Eip2930 = 1,
    /// Dynamic-fee transaction: <https://eips.ethereum.org/EIPS/eip-1559>
    Eip1559 = 2,
}

impl std::fmt::Display for TxType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
