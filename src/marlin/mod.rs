pub mod dump;
pub mod parser;
pub mod protocol;
pub mod schema;
pub mod types;
