mod handler;
mod model;

pub use handler::{
    create_laptop, delete_laptop, get_laptop, get_laptop_by_unique_id, laptop_history, laptop_qr_code, list_laptops,
    update_laptop,
};
pub use model::{CreateLaptopRequest, LaptopHistory, ListLaptopsQuery, UpdateLaptopRequest};
