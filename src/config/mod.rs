//! Configuration: console directives and the optional settings file

pub mod args;
pub mod settings;

pub use args::ConsoleArgs;
pub use settings::Settings;
