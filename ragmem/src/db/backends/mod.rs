pub mod astra;
pub mod memory;
pub mod zep;
