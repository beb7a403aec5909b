mod handler;
mod model;

pub use handler::{create_user, delete_user, get_me, get_user, list_users, update_me, update_user};
pub use model::{CreateUserRequest, UpdateProfileRequest, UpdateUserRequest};
