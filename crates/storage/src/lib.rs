//! Durable user/task storage for VoxGate.
//!
//! A JSON-file-backed store guarded by read/write locks. Repository
//! handles are obtained through a scope (`StorageService::repositories`)
//! so every access path shares one service and mutations flush on write.

pub mod models;
pub mod store;
pub mod tasks;
pub mod users;

pub use models::{Task, TaskStatus, TaskUpdate, User, UserUpdate};
pub use store::StorageService;
pub use tasks::TaskRepo;
pub use users::UserRepo;
