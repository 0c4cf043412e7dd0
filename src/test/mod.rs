mod declarator;
mod guard;
mod null;
mod object_size;
mod primitive;
pub mod util;
