pub mod browser_manager;
pub mod page;

pub use browser_manager::BrowserSession;
pub use page::{ChromiumPage, Control, ControlLocator, PageDriver};
