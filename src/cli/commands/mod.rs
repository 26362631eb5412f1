mod config;
mod generate;
mod reset;
mod search;
mod serve;
mod status;
mod upload;

pub use config::ConfigCommand;
pub use generate::GenerateArgs;
pub use search::SearchArgs;
pub use serve::{ServeArgs, ServeCommand};
pub use upload::UploadArgs;

pub use config::handle_config;
pub use generate::handle_generate;
pub use reset::handle_reset;
pub use search::handle_search;
pub use serve::handle_serve;
pub use status::handle_status;
pub use upload::handle_upload;
