use crate::{BlockNumber, ChainId};
use once_cell::sync::Lazy;
use std::{collections::BTreeMap, sync::Arc};

/// The Ethereum mainnet spec.
pub static MAINNET: Lazy<Arc<ChainSpec>> = Lazy::new(|| {
    Arc::new(ChainSpec {
        chain_id: 1,
        hardforks: BTreeMap::from([
            (Hardfork::Frontier, 0),
            (Hardfork::Homestead, 1_150_000),
            (Hardfork::TangerineWhistle, 2_463_000),
            (Hardfork::SpuriousDragon, 2_675_000),
            (Hardfork::Byzantium, 4_370_000),
            (Hardfork::Constantinople, 7_280_000),
            (Hardfork::Petersburg, 7_280_000),
            (Hardfork::Istanbul, 9_069_000),
            (Hardfork::Berlin, 12_244_000),
            (Hardfork::London, 12_965_000),
            (Hardfork::Paris, 15_537_394),
            (Hardfork::Shanghai, 17_034_870),
            (Hardfork::Cancun, 19_426_587),
        ]),
    })
});

/// The Sepolia testnet spec.
pub static SEPOLIA: Lazy<Arc<ChainSpec>> = Lazy::new(|| {
    Arc::new(ChainSpec {
        chain_id: 11_155_111,
        hardforks: BTreeMap::from([
            (Hardfork::Frontier, 0),
            (Hardfork::Homestead, 0),
            (Hardfork::TangerineWhistle, 0),
            (Hardfork::SpuriousDragon, 0),
            (Hardfork::Byzantium, 0),
            (Hardfork::Constantinople, 0),
            (Hardfork::Petersburg, 0),
            (Hardfork::Istanbul, 0),
            (Hardfork::Berlin, 0),
            (Hardfork::London, 0),
            (Hardfork::Paris, 1_735_371),
        ]),
    })
});

/// Network protocol upgrade points.
///
/// The variants are ordered by activation, so `Ord` on the enum matches the
/// chronological fork order; every block height maps to exactly one revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Hardfork {
    /// Frontier.
    Frontier,
    /// Homestead: <https://eips.ethereum.org/EIPS/eip-2>
    Homestead,
    /// Tangerine Whistle: <https://eips.ethereum.org/EIPS/eip-150>
    TangerineWhistle,
    /// Spurious Dragon: <https://eips.ethereum.org/EIPS/eip-155>
    SpuriousDragon,
    /// Byzantium.
    Byzantium,
    /// Constantinople.
    Constantinople,
    /// Petersburg.
    Petersburg,
    /// Istanbul.
    Istanbul,
    /// Berlin: <https://eips.ethereum.org/EIPS/eip-2930>
    Berlin,
    /// London: <https://eips.ethereum.org/EIPS/eip-1559>
    London,
    /// Paris, aka the Merge.
    Paris,
    /// Shanghai.
    Shanghai,
    /// Cancun.
    Cancun,
}

impl std::fmt::Display for Hardfork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// The configuration of a chain: its id and the block heights at which its
/// hardforks activate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSpec {
    chain_id: ChainId,
    hardforks: BTreeMap<Hardfork, BlockNumber>,
}

impl ChainSpec {
    /// Returns the chain id.
    ///
    /// See <https://eips.ethereum.org/EIPS/eip-155>.
    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    /// Get the first block number of the hardfork.
    pub fn fork_block(&self, fork: Hardfork) -> Option<BlockNumber> {
        self.hardforks.get(&fork).copied()
    }

    /// Returns `true` if the given fork is active at the given block.
    pub fn fork_active(&self, fork: Hardfork, current_block: BlockNumber) -> bool {
        self.fork_block(fork).map(|activation| activation <= current_block).unwrap_or_default()
    }

    /// Returns the revision active at the given block number, i.e. the most
    /// recent hardfork whose activation height is not above it.
    pub fn revision(&self, block_number: BlockNumber) -> Hardfork {
        self.hardforks
            .iter()
            .rev()
            .find_map(|(fork, activation)| (*activation <= block_number).then_some(*fork))
            .unwrap_or(Hardfork::Frontier)
    }

    /// Get an iterator over all hardforks with their activation heights.
    pub fn forks_iter(&self) -> impl Iterator<Item = (Hardfork, BlockNumber)> + '_ {
        self.hardforks.iter().map(|(fork, block)| (*fork, *block))
    }

    /// Returns a [`ChainSpecBuilder`] to help build custom specs.
    pub fn builder() -> ChainSpecBuilder {
        ChainSpecBuilder::default()
    }
}

/// A helper to build custom chain specs.
#[derive(Debug, Default)]
pub struct ChainSpecBuilder {
    chain_id: ChainId,
    hardforks: BTreeMap<Hardfork, BlockNumber>,
}

impl ChainSpecBuilder {
    /// Returns a builder initialized with the mainnet config.
    pub fn mainnet() -> Self {
        Self { chain_id: MAINNET.chain_id, hardforks: MAINNET.hardforks.clone() }
    }

    /// Sets the chain id.
    pub fn chain_id(mut self, chain_id: ChainId) -> Self {
        self.chain_id = chain_id;
        self
    }

    /// Insert the given fork at the given block number.
    pub fn with_fork(mut self, fork: Hardfork, block: BlockNumber) -> Self {
        self.hardforks.insert(fork, block);
        self
    }

    /// Enables Frontier.
    pub fn frontier_activated(mut self) -> Self {
        self.hardforks.insert(Hardfork::Frontier, 0);
        self
    }

    /// Enables Homestead.
    pub fn homestead_activated(mut self) -> Self {
        self = self.frontier_activated();
        self.hardforks.insert(Hardfork::Homestead, 0);
        self
    }

    /// Enables Tangerine Whistle.
    pub fn tangerine_whistle_activated(mut self) -> Self {
        self = self.homestead_activated();
        self.hardforks.insert(Hardfork::TangerineWhistle, 0);
        self
    }

    /// Enables Spurious Dragon.
    pub fn spurious_dragon_activated(mut self) -> Self {
        self = self.tangerine_whistle_activated();
        self.hardforks.insert(Hardfork::SpuriousDragon, 0);
        self
    }

    /// Enables Byzantium.
    pub fn byzantium_activated(mut self) -> Self {
        self = self.spurious_dragon_activated();
        self.hardforks.insert(Hardfork::Byzantium, 0);
        self
    }

    /// Enables Petersburg.
    pub fn petersburg_activated(mut self) -> Self {
        self = self.byzantium_activated();
        self.hardforks.insert(Hardfork::Constantinople, 0);
        self.hardforks.insert(Hardfork::Petersburg, 0);
        self
    }

    /// Enables Istanbul.
    pub fn istanbul_activated(mut self) -> Self {
        self = self.petersburg_activated();
        self.hardforks.insert(Hardfork::Istanbul, 0);
        self
    }

    /// Enables Berlin.
    pub fn berlin_activated(mut self) -> Self {
        self = self.istanbul_activated();
        self.hardforks.insert(Hardfork::Berlin, 0);
        self
    }

    /// Enables London.
    pub fn london_activated(mut self) -> Self {
        self = self.berlin_activated();
        self.hardforks.insert(Hardfork::London, 0);
        self
    }

    /// Enables Paris.
    pub fn paris_activated(mut self) -> Self {
        self = self.london_activated();
        self.hardforks.insert(Hardfork::Paris, 0);
        self
    }

    /// Enables Shanghai.
    pub fn shanghai_activated(mut self) -> Self {
        self = self.paris_activated();
        self.hardforks.insert(Hardfork::Shanghai, 0);
        self
    }

    /// Enables Cancun.
    pub fn cancun_activated(mut self) -> Self {
        self = self.shanghai_activated();
        self.hardforks.insert(Hardfork::Cancun, 0);
        self
    }

    /// Build a [`ChainSpec`].
    pub fn build(self) -> ChainSpec {
        ChainSpec { chain_id: self.chain_id, hardforks: self.hardforks }
    }
}

impl From<&ChainSpec> for ChainSpecBuilder {
    fn from(value: &ChainSpec) -> Self {
        Self { chain_id: value.chain_id, hardforks: value.hardforks.clone() }
    }
}
