pub mod cards;
pub mod media;
pub mod status;
pub mod submit;
