//! Data behind the dashboard widgets.
//!
//! The clock is client-only. News and weather are fetched on request, the
//! system monitor pushes `sys_status` over the relay.

pub mod monitor;
pub mod news;
pub mod weather;

pub use monitor::spawn_monitor;
pub use news::{NewsItem, NewsService};
pub use weather::WeatherService;
