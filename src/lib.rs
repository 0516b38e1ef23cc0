pub mod constants;
pub mod fs;
pub mod input;
pub mod mixer;
pub mod platform;
pub mod renderer;
pub mod sound;
pub mod wave_ring;
