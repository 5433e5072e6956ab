use serde::{Deserialize, Serialize};

use crate::collection::Collection;
use crate::entities::*;

/// The document store facade (C2): one [`Collection`] per entity kind.
///
/// This is the single owner of persisted state (§3 "Ownership"); every other
/// crate in the workspace reaches state only through `Store`'s fields.
#[derive(Default)]
pub struct Store {
    pub accounts: Collection<Account>,
    pub tokens: Collection<Token>,
    pub pools: Collection<LiquidityPool>,
    pub positions: Collection<UserLiquidityPosition>,
    pub pairs: Collection<TradingPair>,
    pub orders: Collection<Order>,
    pub trades: Collection<Trade>,
    pub farms: Collection<Farm>,
    pub farm_positions: Collection<UserFarmPosition>,
    pub vesting: Collection<VestingState>,
    pub nft_collections: Collection<NftCollection>,
    pub nft_instances: Collection<NftInstance>,
    pub nft_offers: Collection<NftOffer>,
    pub withdrawals: Collection<BridgeJob>,
    pub deposits: Collection<BridgeJob>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// A point-in-time snapshot of every collection, suitable for
    /// persistence to disk by the (out-of-scope) physical storage layer —
    /// §4.2's "snapshot persistence" responsibility.
    pub async fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            accounts: self.accounts.snapshot().await,
            tokens: self.tokens.snapshot().await,
            pools: self.pools.snapshot().await,
            positions: self.positions.snapshot().await,
            pairs: self.pairs.snapshot().await,
            orders: self.orders.snapshot().await,
            trades: self.trades.snapshot().await,
            farms: self.farms.snapshot().await,
            farm_positions: self.farm_positions.snapshot().await,
            vesting: self.vesting.snapshot().await,
            nft_collections: self.nft_collections.snapshot().await,
            nft_instances: self.nft_instances.snapshot().await,
            nft_offers: self.nft_offers.snapshot().await,
            withdrawals: self.withdrawals.snapshot().await,
            deposits: self.deposits.snapshot().await,
        }
    }

    pub async fn restore(&self, snap: StoreSnapshot) {
        self.accounts.restore(snap.accounts).await;
        self.tokens.restore(snap.tokens).await;
        self.pools.restore(snap.pools).await;
        self.positions.restore(snap.positions).await;
        self.pairs.restore(snap.pairs).await;
        self.orders.restore(snap.orders).await;
        self.trades.restore(snap.trades).await;
        self.farms.restore(snap.farms).await;
        self.farm_positions.restore(snap.farm_positions).await;
        self.vesting.restore(snap.vesting).await;
        self.nft_collections.restore(snap.nft_collections).await;
        self.nft_instances.restore(snap.nft_instances).await;
        self.nft_offers.restore(snap.nft_offers).await;
        self.withdrawals.restore(snap.withdrawals).await;
        self.deposits.restore(snap.deposits).await;
    }
}

#[derive(Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub accounts: Vec<Account>,
    pub tokens: Vec<Token>,
    pub pools: Vec<LiquidityPool>,
    pub positions: Vec<UserLiquidityPosition>,
    pub pairs: Vec<TradingPair>,
    pub orders: Vec<Order>,
    pub trades: Vec<Trade>,
    pub farms: Vec<Farm>,
    pub farm_positions: Vec<UserFarmPosition>,
    pub vesting: Vec<VestingState>,
    pub nft_collections: Vec<NftCollection>,
    pub nft_instances: Vec<NftInstance>,
    pub nft_offers: Vec<NftOffer>,
    pub withdrawals: Vec<BridgeJob>,
    pub deposits: Vec<BridgeJob>,
}
