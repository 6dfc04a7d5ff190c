// src/session/mod.rs

//! Client side of a timed assessment.
//!
//! [`SessionController`] runs one attempt: it starts or resumes it, counts down,
//! captures answers and submits when the user confirms or the deadline passes.
//! The deadline and the committed answers live in a [`SessionStorage`] slot keyed
//! by user and assessment, so a reload picks the attempt up where it stopped.

pub mod api;
pub mod clock;
pub mod controller;
pub mod error;
pub mod storage;

pub use api::{AssessmentApi, HttpAssessmentApi};
pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::{Advance, SessionCommand, SessionController, Stage};
pub use error::SessionError;
pub use storage::{AnswersRecord, FileStorage, MemoryStorage, SessionStorage, TimerRecord, answers_key, timer_key};
