//! Provider/model cost rates and deterministic per-call cost computation.

mod table;

pub use table::{DEFAULT_PRICING_VERSION, ModelRate, PricingTable, PricingTableBuilder};
