mod handler;
mod model;

pub use handler::{active_checkouts, lost_found, overdue, summary};
pub use model::DashboardSummary;
