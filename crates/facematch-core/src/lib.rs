pub mod capture;
pub mod errors;
pub mod faces;
pub mod secret_service;

pub use capture::CapturedImage;
pub use errors::{AppError, AppResult};
