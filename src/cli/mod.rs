pub mod actions;
pub mod estimate;
pub mod list;
pub mod setup;
pub mod ui;
pub mod watch;
