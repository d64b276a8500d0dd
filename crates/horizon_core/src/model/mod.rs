mod entity;
mod growth;
mod params;
mod transfer;

pub use entity::{BalanceLimit, BalanceSnapshot, CashFlowRule, Entity, EntityId, ModeledEntity};
pub use growth::{CombinedGrowth, FixedGrowth, GrowthModel, LogNormalGrowth, TimeFrame};
pub use params::{AccountType, GroupingMode, PredictionParams, SpecialDate};
pub use transfer::{
    ConcreteTransfer, TransferAmount, TransferEndpoint, TransferTemplate, simplify_transfers,
};
