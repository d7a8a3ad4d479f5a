//! Chat metering and payout pricing

use serde::{Deserialize, Serialize};

use crate::constants::CHAT_CHARS_PER_BUCKET;

/// Currency value of a credit amount at the policy's exchange rate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutQuote {
    pub credits: u64,
    /// Rounded to two decimal places
    pub currency_amount: f64,
    pub exchange_rate: f64,
}

pub struct PriceCalculator;

impl PriceCalculator {
    /// `ceil(chars × rate / 1000)`, counted in Unicode scalar values
    pub fn chat_cost(text: &str, rate_per_1000_chars: u64) -> u64 {
        Self::chat_cost_for_len(text.chars().count() as u64, rate_per_1000_chars)
    }

    pub fn chat_cost_for_len(chars: u64, rate_per_1000_chars: u64) -> u64 {
        let scaled = chars as u128 * rate_per_1000_chars as u128;
        let cost = scaled.div_ceil(CHAT_CHARS_PER_BUCKET as u128);
        u64::try_from(cost).unwrap_or(u64::MAX)
    }

    pub fn payout_quote(credits: u64, exchange_rate: f64) -> PayoutQuote {
        let currency_amount = (credits as f64 * exchange_rate * 100.0).round() / 100.0;

        PayoutQuote {
            credits,
            currency_amount,
            exchange_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_message_is_free() {
        assert_eq!(PriceCalculator::chat_cost("", 50), 0);
    }

    #[test]
    fn test_partial_bucket_rounds_up() {
        assert_eq!(PriceCalculator::chat_cost("a", 50), 1);
        assert_eq!(PriceCalculator::chat_cost_for_len(2_500, 50), 125);
        assert_eq!(PriceCalculator::chat_cost_for_len(1_000, 50), 50);
        assert_eq!(PriceCalculator::chat_cost_for_len(1_001, 50), 51);
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        let text = "é".repeat(1_000);
        assert_eq!(text.len(), 2_000);
        assert_eq!(PriceCalculator::chat_cost(&text, 50), 50);
    }

    #[test]
    fn test_payout_quote_rounds_to_cents() {
        let quote = PriceCalculator::payout_quote(75, 0.10);
        assert_eq!(quote.currency_amount, 7.5);

        let quote = PriceCalculator::payout_quote(1, 0.333);
        assert_eq!(quote.currency_amount, 0.33);
    }
}
