//! Command-line front end: settings, the source table, logging, and the run
//! that writes observation and bundle files.

pub mod logging;
pub mod pipeline;
pub mod settings;
pub mod source;
