//! Outward HTTP surfaces: the one-time-code relay client and the
//! WebDriver-backed page implementation.

pub mod relay;
pub mod webdriver;

pub use relay::HttpOtpChannel;
pub use webdriver::{WebDriverFactory, WebDriverPage};
