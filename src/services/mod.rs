pub mod booking;
pub mod dialogue;
pub mod intent;
pub mod nlu;
pub mod notify;
pub mod relevance;
pub mod slots;
pub mod transcribe;
