mod controller;
mod view;
mod workflow;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use controller::SessionController;
pub use view::SessionView;
pub use workflow::AssessmentLoopService;
