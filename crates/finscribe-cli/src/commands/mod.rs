//! Command implementations.

pub mod fields;
pub mod run;
pub mod status;

pub use self::fields::execute_fields;
pub use self::run::execute_run;
pub use self::status::execute_status;
