pub mod appointment;
pub mod ecg_record;
pub mod enums;
pub mod notification;
pub mod people;

pub use appointment::*;
pub use ecg_record::*;
pub use notification::*;
pub use people::*;
