pub mod daemon;
pub mod inspect;
pub mod lifecycle;
