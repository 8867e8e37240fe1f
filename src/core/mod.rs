pub mod color;
pub mod coords;
#[cfg(windows)]
pub mod gdi;
#[cfg(windows)]
pub mod window;
