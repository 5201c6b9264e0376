pub mod image_catalog;
pub mod threshold_store;
