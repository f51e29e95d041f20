//! Model pricing table.
//!
//! Rates are per 1K tokens in USD. The table is immutable after construction
//! and shared by reference; tests substitute alternate tables through the
//! builder instead of mutating process-wide state.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

/// Version tag of the built-in rate set, recorded with every cost figure so
/// that a logged amount can be traced back to the table that produced it.
pub const DEFAULT_PRICING_VERSION: &str = "2025-06";

/// Fractional digits kept per cost term.
const COST_SCALE: u32 = 8;

// Trailing "-2024-04-09" / "-20240409" snapshot suffixes.
static DATE_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-(\d{4}-\d{2}-\d{2}|\d{8})$").expect("valid date suffix regex"));

// Trailing "-v2" style revision suffixes.
static REVISION_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-v\d+$").expect("valid revision suffix regex"));

// Applied after lowercasing and suffix stripping. Every target must already
// be in canonical form, otherwise normalization would not be idempotent.
const MODEL_ALIASES: &[(&str, &str)] = &[
    ("gpt-4-turbo-preview", "gpt-4-turbo"),
    ("gpt-4-0125-preview", "gpt-4-turbo"),
    ("gpt-4-1106-preview", "gpt-4-turbo"),
    ("gpt-4-vision-preview", "gpt-4-turbo"),
    ("gpt-35-turbo", "gpt-3.5-turbo"),
    ("chatgpt-4o-latest", "gpt-4o"),
    ("gpt-4o-latest", "gpt-4o"),
    ("claude-3.5-sonnet", "claude-3-5-sonnet"),
    ("claude-3.5-haiku", "claude-3-5-haiku"),
];

/// Cost rates for a single model, per 1K tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelRate {
    pub input_per_1k: Decimal,
    pub output_per_1k: Decimal,
}

impl ModelRate {
    pub const fn new(input_per_1k: Decimal, output_per_1k: Decimal) -> Self {
        Self {
            input_per_1k,
            output_per_1k,
        }
    }
}

/// Immutable provider/model rate lookup.
#[derive(Debug, Clone)]
pub struct PricingTable {
    models: HashMap<String, ModelRate>,
    version: String,
}

impl PricingTable {
    pub fn builder() -> PricingTableBuilder {
        PricingTableBuilder::new()
    }

    /// Version tag identifying this rate set for audit reproducibility.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Rate entry for a model, after normalization.
    pub fn rate(&self, model: &str) -> Option<&ModelRate> {
        self.models.get(&Self::normalize_model_name(model))
    }

    /// Whether the normalized name has a priced entry.
    ///
    /// Callers use this to distinguish "verified zero-cost" from "unpriced,
    /// displayed as zero" — operators must not mistake unpriced for free.
    pub fn is_known_model(&self, model: &str) -> bool {
        self.rate(model).is_some()
    }

    /// Deterministic cost of a call.
    ///
    /// Negative token counts clamp to zero. Unknown models cost zero (check
    /// [`is_known_model`](Self::is_known_model) to tell the cases apart).
    /// Each term is rounded half-up to 8 fractional digits before summing.
    pub fn cost(&self, model: &str, input_tokens: i64, output_tokens: i64) -> Decimal {
        let Some(rate) = self.rate(model) else {
            return Decimal::ZERO;
        };
        term(rate.input_per_1k, clamp_tokens(input_tokens))
            + term(rate.output_per_1k, clamp_tokens(output_tokens))
    }

    /// Cost when the provider reports only a combined token count.
    ///
    /// Splits round(total * 0.7) to input and the remainder to output,
    /// clamped into [0, total], then prices the parts normally.
    pub fn cost_from_total_tokens(&self, model: &str, total_tokens: i64) -> Decimal {
        let (input, output) = Self::split_total_tokens(total_tokens);
        self.cost(model, input as i64, output as i64)
    }

    /// The input/output split applied to a combined token count:
    /// round(total * 0.7) input, remainder output, clamped into [0, total].
    pub fn split_total_tokens(total_tokens: i64) -> (u64, u64) {
        let total = clamp_tokens(total_tokens);
        // round half away from zero, in integer math.
        let input = (total.saturating_mul(7).saturating_add(5) / 10).min(total);
        (input, total - input)
    }

    /// Canonical form of a raw model name.
    ///
    /// Lowercases, strips a trailing `-YYYY-MM-DD` / `-YYYYMMDD` snapshot
    /// date, strips a trailing `-v<digits>` revision, then applies the alias
    /// table. Idempotent: normalizing a normalized name is a no-op.
    pub fn normalize_model_name(raw: &str) -> String {
        let mut name = raw.trim().to_lowercase();
        if let Some(m) = DATE_SUFFIX.find(&name) {
            name.truncate(m.start());
        }
        if let Some(m) = REVISION_SUFFIX.find(&name) {
            name.truncate(m.start());
        }
        for (alias, canonical) in MODEL_ALIASES {
            if name == *alias {
                return (*canonical).to_string();
            }
        }
        name
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        PricingTableBuilder::new().with_defaults().build()
    }
}

fn clamp_tokens(tokens: i64) -> u64 {
    tokens.max(0) as u64
}

fn term(price_per_1k: Decimal, tokens: u64) -> Decimal {
    (price_per_1k * Decimal::from(tokens) / dec!(1000))
        .round_dp_with_strategy(COST_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Default)]
pub struct PricingTableBuilder {
    models: HashMap<String, ModelRate>,
    version: Option<String>,
}

impl PricingTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the built-in rate set.
    pub fn with_defaults(mut self) -> Self {
        let defaults: &[(&str, Decimal, Decimal)] = &[
            ("gpt-4o", dec!(0.0025), dec!(0.01)),
            ("gpt-4o-mini", dec!(0.00015), dec!(0.0006)),
            ("gpt-4-turbo", dec!(0.01), dec!(0.03)),
            ("gpt-4", dec!(0.03), dec!(0.06)),
            ("gpt-3.5-turbo", dec!(0.0005), dec!(0.0015)),
            ("o1", dec!(0.015), dec!(0.06)),
            ("claude-3-5-sonnet", dec!(0.003), dec!(0.015)),
            ("claude-3-5-haiku", dec!(0.0008), dec!(0.004)),
            ("claude-3-opus", dec!(0.015), dec!(0.075)),
            ("claude-3-haiku", dec!(0.00025), dec!(0.00125)),
            ("gemini-1.5-pro", dec!(0.00125), dec!(0.005)),
            ("gemini-1.5-flash", dec!(0.000075), dec!(0.0003)),
            ("mistral-large", dec!(0.002), dec!(0.006)),
        ];
        for (name, input, output) in defaults {
            self.models
                .insert((*name).to_string(), ModelRate::new(*input, *output));
        }
        self
    }

    /// Add or replace a model rate. The name is normalized before insertion.
    pub fn model(mut self, name: impl AsRef<str>, rate: ModelRate) -> Self {
        self.models
            .insert(PricingTable::normalize_model_name(name.as_ref()), rate);
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn build(self) -> PricingTable {
        PricingTable {
            models: self.models,
            version: self
                .version
                .unwrap_or_else(|| DEFAULT_PRICING_VERSION.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_date_suffixes() {
        assert_eq!(
            PricingTable::normalize_model_name("gpt-4-turbo-2024-04-09"),
            "gpt-4-turbo"
        );
        assert_eq!(
            PricingTable::normalize_model_name("claude-3-5-sonnet-20241022"),
            "claude-3-5-sonnet"
        );
    }

    #[test]
    fn test_normalize_strips_revision_suffix() {
        assert_eq!(
            PricingTable::normalize_model_name("Mistral-Large-v2"),
            "mistral-large"
        );
    }

    #[test]
    fn test_normalize_applies_aliases() {
        assert_eq!(
            PricingTable::normalize_model_name("gpt-4-0125-preview"),
            "gpt-4-turbo"
        );
        assert_eq!(
            PricingTable::normalize_model_name("GPT-35-Turbo"),
            "gpt-3.5-turbo"
        );
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = [
            "gpt-4-turbo-2024-04-09",
            "gpt-4-0125-preview",
            "Claude-3.5-Sonnet-20241022",
            "mistral-large-v2",
            "some-unknown-model",
            "",
        ];
        for raw in inputs {
            let once = PricingTable::normalize_model_name(raw);
            assert_eq!(PricingTable::normalize_model_name(&once), once, "{raw}");
        }
    }

    #[test]
    fn test_cost_known_model() {
        let table = PricingTable::default();
        // 1K in at $0.01/1K + 1K out at $0.03/1K
        assert_eq!(table.cost("gpt-4-turbo", 1000, 1000), dec!(0.04));
    }

    #[test]
    fn test_cost_dated_variant_resolves_to_priced_bucket() {
        let table = PricingTable::default();
        let cost = table.cost("gpt-4-turbo-2024-04-09", 1000, 1000);
        assert!(cost > Decimal::ZERO);
        assert!(table.is_known_model("gpt-4-turbo-2024-04-09"));
    }

    #[test]
    fn test_unknown_model_costs_zero_but_is_not_known() {
        let table = PricingTable::default();
        assert_eq!(table.cost("totally-made-up", 5000, 5000), Decimal::ZERO);
        assert!(!table.is_known_model("totally-made-up"));
    }

    #[test]
    fn test_negative_tokens_clamp_to_zero() {
        let table = PricingTable::default();
        assert_eq!(table.cost("gpt-4-turbo", -500, -1), Decimal::ZERO);
        assert_eq!(table.cost("gpt-4-turbo", -500, 1000), dec!(0.03));
    }

    #[test]
    fn test_terms_round_half_up_to_eight_digits() {
        let table = PricingTable::default();
        // 15 tokens at $0.000075/1K = 0.000001125, which rounds up to
        // 0.00000113 at 8 fractional digits.
        assert_eq!(table.cost("gemini-1.5-flash", 15, 0), dec!(0.00000113));
    }

    #[test]
    fn test_cost_additive_within_rounding_tolerance() {
        let table = PricingTable::default();
        let combined = table.cost("claude-3-5-sonnet", 1700, 0);
        let split = table.cost("claude-3-5-sonnet", 1000, 0) + table.cost("claude-3-5-sonnet", 700, 0);
        let diff = (combined - split).abs();
        assert!(diff <= dec!(0.00000002), "diff {diff}");
    }

    #[test]
    fn test_cost_from_total_tokens_splits_seventy_thirty() {
        let table = PricingTable::default();
        // 1000 total -> 700 in / 300 out.
        let expected = table.cost("gpt-4-turbo", 700, 300);
        assert_eq!(table.cost_from_total_tokens("gpt-4-turbo", 1000), expected);
        assert_eq!(table.cost_from_total_tokens("gpt-4-turbo", -10), Decimal::ZERO);
    }

    #[test]
    fn test_builder_overrides_and_version() {
        let table = PricingTable::builder()
            .model("In-House-LLM-v3", ModelRate::new(dec!(0.001), dec!(0.002)))
            .version("test-rates-1")
            .build();
        assert_eq!(table.version(), "test-rates-1");
        assert!(table.is_known_model("in-house-llm"));
        assert_eq!(table.cost("in-house-llm-v3", 1000, 1000), dec!(0.003));
        assert!(!table.is_known_model("gpt-4-turbo"));
    }
}
