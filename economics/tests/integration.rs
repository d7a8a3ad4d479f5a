use economics::*;

#[test]
fn test_example_sale_split() {
    // Item price 150 at 50% commission: creator nets 75
    let policy = EconomyPolicy::default();
    let split = split_sale(150, policy.commission_ppb());

    assert_eq!(split.creator_earnings, 75);
    assert_eq!(split.platform_fee, 75);
}

#[test]
fn test_example_chat_cost() {
    // 2500 characters at 50 credits per 1000 = ceil(2.5 * 50) = 125
    let text = "x".repeat(2_500);
    assert_eq!(PriceCalculator::chat_cost(&text, 50), 125);
}

#[test]
fn test_chat_cost_is_monotonic() {
    let rate = EconomyPolicy::default().chat_rate_per_1000_chars;
    let mut previous = 0;
    for len in 0..5_000u64 {
        let cost = PriceCalculator::chat_cost_for_len(len, rate);
        assert!(cost >= previous, "cost dropped at length {}", len);
        previous = cost;
    }
    assert_eq!(PriceCalculator::chat_cost_for_len(1_000, rate), rate);
}

#[test]
fn test_split_with_configured_commission() {
    let policy = EconomyPolicy::from_toml_str("commission = 0.15").unwrap();
    let split = split_sale(200, policy.commission_ppb());

    // 200 * 0.85 = 170
    assert_eq!(split.creator_earnings, 170);
    assert_eq!(split.platform_fee, 30);
}

#[test]
fn test_policy_handle_shared_between_readers() {
    let handle = PolicyHandle::default();
    let reader = handle.clone();

    let mut updated = handle.snapshot();
    updated.chat_rate_per_1000_chars = 80;
    handle.replace(updated).unwrap();

    assert_eq!(reader.snapshot().chat_rate_per_1000_chars, 80);
}

#[test]
fn test_guest_starting_pool_is_seeded() {
    assert_eq!(constants::GUEST_STARTING_CREDITS, 100);
}

#[test]
fn test_fractional_basis_point_commission_split() {
    let policy = EconomyPolicy::from_toml_str("commission = 0.333333").unwrap();
    let split = split_sale(1_000_000, policy.commission_ppb());

    assert_eq!(split.creator_earnings, 666_667);
    assert_eq!(split.platform_fee, 333_333);
}
