pub mod csv;
pub mod engine;
pub mod limit;
pub mod model;
pub mod money;
pub mod plan;

pub use engine::{Command, Engine, EngineConfig, EngineError, WalletOp};
pub use model::{InvestmentId, PayoutId, UserId, Wallet, WithdrawalId};
pub use money::{Money, Rate};
