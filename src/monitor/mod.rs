pub mod bar;
pub mod driver;
pub mod trigger;
