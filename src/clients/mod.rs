//! External collaborator seams
//!
//! Quote pricing, account-state RPC, and the relay/bundler endpoint are
//! consumed through traits so the core stays testable and the production
//! clients stay swappable. The quote service is interface-only here; its
//! production implementation lives outside this crate.

pub mod account;
pub mod bundler;
pub mod quotes;

pub use account::{AccountRpc, EthereumRpc};
pub use bundler::{BundlerClient, HttpBundler};
pub use quotes::{QuoteService, SwapQuote, SwapTx};

#[cfg(test)]
pub use account::MockAccountRpc;
#[cfg(test)]
pub use bundler::MockBundlerClient;
#[cfg(test)]
pub use quotes::MockQuoteService;
