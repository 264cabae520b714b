/// Data layer: channel types, the store, loading, and conditions.
///
/// Architecture:
/// ```text
///  .csv / .json / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → channels + names
///   └──────────┘
///        │
///        ▼
///   ┌──────────────┐
///   │ ChannelStore  │  key → Channel, name table, mask
///   └──────────────┘
///        ▲     │
///        │     ▼
///   ┌──────────┐
///   │  filter   │  Conditions → mask (via crate::mask)
///   └──────────┘
/// ```

pub mod filter;
pub mod loader;
pub mod model;
pub mod store;
