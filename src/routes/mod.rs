pub mod auth;
pub mod checkout;
pub mod dashboard;
pub mod laptop;
pub mod notification;
pub mod user;
