pub mod delivery_log;
pub mod handlers;
pub mod notifier;
