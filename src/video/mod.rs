pub mod frame;

pub use frame::VideoFrame;
