pub mod contract;
pub mod jsonrpc;
pub mod util;
pub mod wallet;

pub use contract::AgreementContract;
pub use jsonrpc::JsonRpcLedgerClient;
pub use util::RetryPolicy;
pub use wallet::{StaticAccount, TokenAllowanceProvider};
