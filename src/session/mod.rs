mod driver;
mod manager;

pub use driver::{CdpPage, PageDriver};
pub use manager::{
    build_headless_config, find_browser_executable, random_user_agent, SessionManager,
    SessionProvider,
};
