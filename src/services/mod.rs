pub mod alternatives;
pub mod assignment;
pub mod availability;
pub mod clock;
pub mod effects;
pub mod ids;
pub mod notifications;
pub mod payments;
pub mod scheduler;
pub mod slots;
