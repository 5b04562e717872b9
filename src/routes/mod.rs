pub mod admin;
pub mod appointment_types;
pub mod appointments;
pub mod auth;
pub mod barbers;
pub mod cash;
pub mod crm;
pub mod files;
pub mod pos;
pub mod promotions;
