pub mod entities;
pub mod store;
