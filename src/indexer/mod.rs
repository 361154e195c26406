//! Transaction-history indexers backing approval evidence.

mod etherscan;

pub use self::etherscan::{EtherscanClient, api_base, parse_txlist_response};
