pub mod registration_types;
