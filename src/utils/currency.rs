//! Every amount in the database is an integer count of minor units
//! (1 unit = 100 minor) so money never touches floating point.

/// Format minor units with two decimals, e.g. `211000` -> `"2110.00"`.
pub fn format_minor(minor: i64) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let abs = minor.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// `amount * bps / 10_000`, rounded half up, in integer arithmetic.
/// `None` when the intermediate product overflows.
pub fn apply_basis_points(amount: i64, bps: i64) -> Option<i64> {
    Some(amount.checked_mul(bps)?.checked_add(5_000)?.div_euclid(10_000))
}
