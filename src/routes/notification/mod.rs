mod handler;
mod model;

pub use handler::{check_overdue, notification_history, notification_stats, process_lost_found, retry_failed};
pub use model::{NotificationHistory, NotificationHistoryQuery, NotificationStats};
