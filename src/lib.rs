// vamm-core: perpetual futures pricing and liquidity-risk engine.
// a virtual constant-product market maker prices trades against its own
// reserves; a two-tranche vault pools the capital that backs it.
// all computation is deterministic with no external I/O.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: IDs, Direction, Tranche, Timestamp, BlockStamp
//   2.x  pricing.rs: reserve pair + constant-product quote formulas
//   3.x  snapshots.rs: reserve history, spot/TWAP, trade-sized TWAPs
//   4.x  guard.rs: per-block price-fluctuation band
//   5.x  amm.rs: swaps, depth migration, oracle convergence, funding, shutdown
//   6.x  vault.rs: risk tranches, LP locks, PNL allocation, bad-debt waterfall
//   7.x  allocation.rs: pure capacity/weight split math
//   8.x  config.rs: exchange + vault parameter sets
//   9.x  oracle.rs: price feed trait (mocked)
//   10.x events.rs: state transition events for audit

// pricing core
pub mod amm;
pub mod guard;
pub mod pricing;
pub mod snapshots;
pub mod types;

// liquidity risk
pub mod allocation;
pub mod vault;

// integration modules
pub mod config;
pub mod events;
pub mod oracle;

// re exports for convenience
pub use allocation::*;
pub use amm::*;
pub use config::*;
pub use events::*;
pub use guard::*;
pub use oracle::*;
pub use pricing::*;
pub use snapshots::*;
pub use types::*;
pub use vault::*;
