mod account;
mod bridge;
mod farm_vesting;
mod market;
mod nft;
mod pool;

pub use account::{Account, Token};
pub use bridge::{BridgeJob, BridgeJobStatus};
pub use farm_vesting::{Farm, FarmStatus, StakingTokenRef, UserFarmPosition, VestingSchedule, VestingState};
pub use market::{Order, OrderStatus, OrderType, PairStatus, Side, TimeInForce, Trade, TradeSource, TradingPair};
pub use nft::{NftCollection, NftInstance, NftOffer, OfferStatus, OfferTargetType};
pub use pool::{LiquidityPool, PoolStatus, UserLiquidityPosition};
