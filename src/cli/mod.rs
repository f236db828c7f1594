pub mod rates;
pub mod setup;
pub mod status;
pub mod ui;
pub mod update;
