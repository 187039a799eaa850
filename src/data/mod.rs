pub mod countries;
pub mod loader;
pub mod observation;
pub mod region;
pub mod schema;
pub mod table;
