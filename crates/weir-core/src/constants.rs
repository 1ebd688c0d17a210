//! Protocol constants. All monetary values are in drops (1 WEIR = 10^8 drops).

pub const COIN: u64 = 100_000_000;

/// Hard cap on any single value and on the total money supply.
///
/// Every value-carrying check uses this bound so that checked arithmetic on
/// sums of valid amounts cannot overflow a u64.
pub const MAX_MONEY: u64 = 84_000_000 * COIN;

/// Maximum serialized block size in bytes.
pub const MAX_BLOCK_SIZE: usize = 2 * 1024 * 1024;

/// Maximum serialized transaction size in bytes.
pub const MAX_TX_SIZE: usize = 100 * 1024;

/// Maximum bytes of arbitrary data in a coinbase input's signature field.
pub const MAX_COINBASE_DATA: usize = 100;

/// Lock-time values below this threshold are block heights; values at or
/// above it are Unix timestamps.
pub const LOCKTIME_THRESHOLD: u64 = 500_000_000;

/// How far into the future a block timestamp may lie, in seconds.
pub const MAX_FUTURE_DRIFT: u64 = 180;

/// Number of trailing blocks used for the median-time-past calculation.
pub const MEDIAN_TIME_SPAN: usize = 11;

/// Default mempool byte cap.
pub const DEFAULT_MEMPOOL_MAX_BYTES: usize = 32 * 1024 * 1024;

/// Default limit on in-pool ancestors of a mempool entry (inclusive of the
/// entry itself).
pub const DEFAULT_MAX_ANCESTORS: usize = 25;

/// Default limit on the combined serialized size of an entry and its
/// in-pool ancestors.
pub const DEFAULT_MAX_ANCESTOR_BYTES: usize = 101 * 1024;

/// Default limit on in-pool descendants of a mempool entry (inclusive).
pub const DEFAULT_MAX_DESCENDANTS: usize = 25;

/// Default limit on the combined serialized size of an entry and its
/// in-pool descendants.
pub const DEFAULT_MAX_DESCENDANT_BYTES: usize = 101 * 1024;

/// Minimum relay fee rate in milli-drops per byte.
pub const MIN_RELAY_FEE_RATE: u64 = 1_000;

/// Default mempool entry expiry in seconds (72 hours).
pub const DEFAULT_MEMPOOL_EXPIRY_SECS: u64 = 72 * 60 * 60;
