// Configuration loading

pub mod overrides;
pub mod path_order;
pub mod settings;

pub use overrides::Override;
pub use path_order::{parse_path_order, PathOrderError};
pub use settings::{default_settings_path, load_configuration, Configuration, DEFAULT_THRESHOLD};
