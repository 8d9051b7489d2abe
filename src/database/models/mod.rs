pub mod comment;
pub mod definition;
pub mod revision;
pub mod value;
