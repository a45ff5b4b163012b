//! CLI command implementations.
//!
//! | Module    | Commands handled |
//! |-----------|------------------|
//! | `run`     | `Run`            |
//! | `serve`   | `Serve`          |
//! | `ports`   | `Ports`          |
//! | `config`  | `Config`         |

pub mod config;
pub mod ports;
pub mod run;
pub mod serve;

pub use config::cmd_config;
pub use ports::cmd_ports;
pub use run::cmd_run;
pub use serve::cmd_serve;
