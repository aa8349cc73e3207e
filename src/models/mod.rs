pub mod booking;
pub mod employee;
pub mod notification;
pub mod service;
pub mod slot;

pub use booking::{Booking, BookingPatch, BookingStatus};
pub use employee::{Employee, ScheduleDecision, WorkDay, WorkSchedule};
pub use notification::{NotificationKind, ScheduledNotification};
pub use service::Service;
pub use slot::{AlternativeSlot, AvailabilitySlot, EmployeeAvailability};
