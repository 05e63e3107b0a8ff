pub mod data_block;
pub mod data_type;
pub mod types;
