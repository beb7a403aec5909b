//! Persisted entities and the projections embedded in API responses.

pub mod audit;
pub mod checkout;
pub mod laptop;
pub mod lost_found;
pub mod notification;
pub mod user;

pub use audit::{AuditAction, AuditLog, NewAuditLog};
pub use checkout::{Checkout, CheckoutDetail, CheckoutStatus};
pub use laptop::{Laptop, LaptopStatus};
pub use lost_found::{LostFoundEvent, LostFoundEventDetail, NewLostFoundEvent};
pub use notification::{
    NewNotification, NotificationLog, NotificationStatus, NotificationType, OverdueDedupKey,
};
pub use user::{Role, User, UserSummary};
