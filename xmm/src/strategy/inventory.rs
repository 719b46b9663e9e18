//! Inventory controller: how many contracts to rest on a side.

use venues::Side;

/// Contracts to quote on `side` given the current quoted-venue position.
///
/// If the position opposes the quote (e.g. short while bidding), the quote
/// exactly closes it. Otherwise the size is the configured base size plus
/// whatever residual rounds the post-fill position to a multiple of
/// `quote_size`, clamped so the post-fill position stays inside
/// `inventory_limit`. Zero means the slot is not armed.
pub fn order_size(side: Side, position: i64, quote_size: i64, inventory_limit: i64) -> i64 {
    match side {
        Side::Buy if position < 0 => return -position,
        Side::Sell if position > 0 => return position,
        _ => {}
    }

    let held = position.abs();
    let residual = (quote_size - held % quote_size) % quote_size;
    let size = quote_size + residual;
    let capacity = inventory_limit - held;
    size.min(capacity).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_position_quotes_base_size() {
        assert_eq!(order_size(Side::Buy, 0, 100, 1000), 100);
        assert_eq!(order_size(Side::Sell, 0, 100, 1000), 100);
    }

    #[test]
    fn test_opposite_position_closes_exactly() {
        // Short 30, bidding: a fill should flatten us.
        assert_eq!(order_size(Side::Buy, -30, 100, 1000), 30);
        // Long 250, offering: same.
        assert_eq!(order_size(Side::Sell, 250, 100, 1000), 250);
    }

    #[test]
    fn test_same_side_rounds_to_quote_size_multiple() {
        // Long 30, bidding: 100 + 70 lands the position on 200.
        assert_eq!(order_size(Side::Buy, 30, 100, 1000), 170);
        // Short 30, offering: mirror.
        assert_eq!(order_size(Side::Sell, -30, 100, 1000), 170);
        // Already on a multiple: no residual.
        assert_eq!(order_size(Side::Buy, 200, 100, 1000), 100);
    }

    #[test]
    fn test_clamped_at_inventory_limit() {
        // Long 950 of a 1000 limit: only 50 contracts of room.
        assert_eq!(order_size(Side::Buy, 950, 100, 1000), 50);
        assert_eq!(order_size(Side::Sell, -950, 100, 1000), 50);
    }

    #[test]
    fn test_zero_at_inventory_limit_disarms_slot() {
        assert_eq!(order_size(Side::Buy, 1000, 100, 1000), 0);
        assert_eq!(order_size(Side::Sell, -1000, 100, 1000), 0);
    }
}
