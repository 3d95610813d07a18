pub mod error;
pub mod gateway;
pub mod memory;
pub mod postgres;
pub mod state;

pub use error::{DatabaseError, DatabaseResult};
pub use gateway::{clinic_day_key, day_bounds, staff_day_key, StorageGateway, UnitOfWork};
pub use memory::{MemoryGateway, MemoryState};
pub use postgres::PgGateway;
pub use state::AppState;
