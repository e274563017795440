pub mod commands;
pub mod controller;
pub mod state;


pub use commands::{panel_notification, Action, ActionHandler, ActionOutcome};
pub use controller::{ClockInReceipt, ClockOutReceipt, ElapsedReport, SessionTracker};
pub use state::SessionStatus;
