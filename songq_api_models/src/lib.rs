pub mod settings;
pub mod song;
pub mod stat;

pub use serde;
pub use serde_json;
pub use validator;
