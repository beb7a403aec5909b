use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Checkout, LaptopStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableActions {
    pub can_checkout: bool,
    pub can_checkin: bool,
    pub can_report_lost: bool,
    pub can_report_found: bool,
}

/// What `requester` may do with a laptop, given its status and current holder.
pub fn available_actions(status: LaptopStatus, active: Option<&Checkout>, requester: Uuid) -> AvailableActions {
    let holder = active.map(|c| c.user_id);
    let is_holder = holder == Some(requester);

    AvailableActions {
        can_checkout: status == LaptopStatus::Available && active.is_none(),
        can_checkin: is_holder,
        can_report_lost: is_holder,
        can_report_found: status == LaptopStatus::CheckedOut && holder.is_some_and(|h| h != requester),
    }
}

/// Whole minutes elapsed between `from` and `to`, rounded down.
pub fn duration_minutes(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_milliseconds().div_euclid(60_000)
}
