pub mod font;
pub mod logging;
pub mod paths;
pub mod util;

pub use font::Font;
pub use logging::Logger;
pub use paths::{Dirs, SYSTEM_CONFIG_DIR};
pub use util::{parse_option_pairs, split_options, timestamp_us};
