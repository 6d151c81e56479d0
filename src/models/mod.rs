pub mod appointment;
pub mod event;
pub mod faq;
pub mod reply;
pub mod session;
pub mod user;

pub use appointment::{Appointment, AppointmentStatus};
pub use event::Event;
pub use faq::Faq;
pub use reply::{Button, ButtonAction, Formatting, Reply};
pub use session::{DialogueState, Session, SessionData};
pub use user::{User, UserType};
