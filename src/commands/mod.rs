pub mod diff;
pub mod extract;
pub mod monitor;
pub mod report;
pub mod set_status;
