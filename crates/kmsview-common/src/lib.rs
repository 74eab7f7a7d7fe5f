pub mod logging;
pub mod paths;

pub use logging::FileLogger;
pub use paths::{
    config_dir, data_dir, kmsview_config_dir, kmsview_data_dir, kmsview_log_dir,
    kmsview_system_config_dir,
};
