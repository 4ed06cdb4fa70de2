pub mod camera_slots;
pub mod frame;
pub mod history;
pub mod observation;
pub mod sample_buffer;
pub mod session_clock;
pub mod subject;
pub mod throttle;
pub mod upload;
