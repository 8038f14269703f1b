mod checkpoint;
mod config;
mod publish;
mod run;
mod status;

pub use checkpoint::{CheckpointArgs, CheckpointCommand};
pub use config::ConfigCommand;
pub use publish::PublishArgs;
pub use run::RunArgs;

pub use checkpoint::handle_checkpoint;
pub use config::handle_config;
pub use publish::handle_publish;
pub use run::handle_run;
pub use status::handle_status;
