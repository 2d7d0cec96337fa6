pub mod loader;
pub mod options;
pub mod types;
pub mod validator;

pub use loader::*;
pub use options::*;
pub use types::*;
pub use validator::*;
