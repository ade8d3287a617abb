mod account;
mod error;
mod history;
mod ledger;
mod money;
mod pin;
mod transaction;

pub use account::*;
pub use error::*;
pub use history::*;
pub use ledger::*;
pub use money::*;
pub use pin::*;
pub use transaction::*;
