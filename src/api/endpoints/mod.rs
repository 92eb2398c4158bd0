pub mod appointments;
pub mod doctors;
pub mod ecg;
pub mod health;
pub mod notifications;
