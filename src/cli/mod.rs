pub mod app;
pub mod commands;
pub mod context;
pub mod dispatch;
pub mod env;
pub mod output;
pub mod reset;
pub mod run;
pub mod runtime;
pub mod scan;
pub mod smoke;
pub mod status;

pub use env::CliArgs;
