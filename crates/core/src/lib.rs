pub mod config;
pub mod error;
pub mod query;
pub mod sample;
pub mod stream;

pub use config::Config;
pub use error::*;
pub use query::*;
pub use sample::*;
pub use stream::*;
