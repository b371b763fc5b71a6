pub mod images;
pub mod layout;
pub mod render;
pub mod wayland;
