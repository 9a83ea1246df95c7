//! Lazy daily counter reset.

use tracing::debug;

use crate::types::UserAccount;

/// Move `account` onto `today`, zeroing the daily counter if the day changed.
///
/// Returns whether anything changed. Applying it twice for the same day is a
/// no-op.
pub fn roll_day(account: &mut UserAccount, today: &str) -> bool {
    if account.day == today {
        return false;
    }

    debug!(
        user_id = %account.id,
        from = %account.day,
        to = %today,
        previous_count = account.daily_count,
        "Daily reset"
    );

    account.day = today.to_string();
    account.daily_count = 0;
    true
}
