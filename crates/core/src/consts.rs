//! Constant variables.

/// Default bit width of the identifier ring.
pub const DEFAULT_ID_BITS: u8 = 6;
/// Default replica count N.
pub const DEFAULT_REPLICAS: u8 = 3;
/// Default read quorum R.
pub const DEFAULT_READ_QUORUM: u8 = 2;
/// Default write quorum W.
pub const DEFAULT_WRITE_QUORUM: u8 = 2;
/// default rpc timeout in ms
pub const DEFAULT_RPC_TIMEOUT_MS: u64 = 5000;
/// default stabilization interval in seconds
pub const DEFAULT_STABILIZE_INTERVAL_SECS: u64 = 3;
/// bootstrap attempts before join gives up
pub const DEFAULT_JOIN_RETRIES: u8 = 3;
/// delay between two bootstrap attempts, in ms
pub const JOIN_RETRY_DELAY_MS: u64 = 500;
/// Max hops of an iterative finger-table lookup.
pub const MAX_LOOKUP_HOPS: usize = 64;
