pub mod flatten;
pub mod inspect;
pub mod optimize;
