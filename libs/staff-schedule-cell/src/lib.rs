pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::*;
pub use router::staff_schedule_routes;
pub use services::conflict::{intervals_overlap, ScheduleConflictService};
pub use services::scheduling::StaffScheduleService;
