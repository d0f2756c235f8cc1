pub mod audit;
pub mod catalog;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod intent;
pub mod io;
pub mod locks;
pub mod paths;
pub mod scaffold;
pub mod types;
pub mod validator;

pub use error::{DispatchError, Result};
