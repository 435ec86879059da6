pub mod permission;
pub mod role;
pub mod staff;
