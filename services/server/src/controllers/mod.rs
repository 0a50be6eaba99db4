pub mod entry_controller;
pub mod gift_controller;
pub mod info_controller;
pub mod payment_controller;
pub mod registration_controller;
