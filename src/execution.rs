pub mod import;
pub mod store;
pub mod value;
