mod handler;
mod model;

pub use handler::{login, logout, me, refresh_token};
pub use model::{LoginRequest, LoginResponse, RefreshTokenRequest};
