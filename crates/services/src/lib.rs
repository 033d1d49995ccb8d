#![forbid(unsafe_code)]

pub mod autosave;
pub mod error;
pub mod sessions;
pub mod timer;

pub use assess_core::Clock;

pub use autosave::AutosaveService;
pub use error::{ScheduleError, SessionError};
pub use sessions::{AssessmentLoopService, SessionController, SessionView};
pub use timer::{TimerEvent, TimerHandle, TimerService};
