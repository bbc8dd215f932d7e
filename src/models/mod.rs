pub mod site;

pub use site::{generate_pattern, BlockedNotice, SiteMap, SiteRecord};
