mod handler;
mod model;

pub use handler::{
    active_checkouts, checkin, checkout, checkout_history, checkout_status, lost_found_events, my_current_checkout,
    overdue_checkouts, report_found, report_lost,
};
pub use model::{CheckinRequest, CheckoutRequest, ReportFoundRequest, ReportLostRequest};
