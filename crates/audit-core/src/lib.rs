pub mod error;
pub mod watermark;
pub mod window;
