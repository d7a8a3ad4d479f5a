//! Commission split between creator and platform
//!
//! Creator earnings are `price × (1 − commission)` rounded half-to-even to a
//! whole credit. The commission is carried in parts per billion and rounding
//! happens once, on the final credit amount. The platform keeps the
//! remainder, so the two parts always sum to the list price.

use serde::{Deserialize, Serialize};

use crate::constants::COMMISSION_SCALE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionSplit {
    pub price: u64,
    pub creator_earnings: u64,
    pub platform_fee: u64,
}

pub fn split_sale(price: u64, commission_ppb: u64) -> CommissionSplit {
    let commission_ppb = commission_ppb.min(COMMISSION_SCALE);
    let creator_share = (COMMISSION_SCALE - commission_ppb) as u128;
    let creator_earnings =
        round_half_even(price as u128 * creator_share, COMMISSION_SCALE as u128);
    // creator_share <= scale, so earnings never exceed the price
    let creator_earnings = creator_earnings as u64;

    CommissionSplit {
        price,
        creator_earnings,
        platform_fee: price - creator_earnings,
    }
}

fn round_half_even(numerator: u128, denominator: u128) -> u128 {
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    let twice = remainder * 2;

    if twice > denominator || (twice == denominator && quotient % 2 == 1) {
        quotient + 1
    } else {
        quotient
    }
}
