pub mod dialogue;
pub mod lookup;
pub mod models;
pub mod resolver;

pub use lookup::get_rate;
pub use models::*;
pub use resolver::{build_location_index, normalize_text, resolve, LocationIndex};
