pub mod bench;
pub mod case;
pub mod endpoint;
pub mod error;
pub mod profile;
pub mod result;
pub mod service;

pub use bench::*;
pub use case::*;
pub use endpoint::*;
pub use error::*;
pub use profile::*;
pub use result::*;
pub use service::*;
