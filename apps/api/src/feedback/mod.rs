pub mod handlers;
pub mod labeling;
pub mod store;
