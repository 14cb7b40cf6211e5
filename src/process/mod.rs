pub mod coerce;
pub mod load;
pub mod schema;

pub use coerce::{coerce, CellValue};
pub use load::{load_year, ResultRow};
pub use schema::SchemaMapping;
