pub mod browser;
pub mod context;
pub mod controller;
pub mod events;

pub use browser::Browser;
pub use context::{SessionContext, WatchedSite};
pub use controller::SessionController;
pub use events::{BrowserEvent, EventKind};
