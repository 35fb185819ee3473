mod automation;
mod driver;
mod error;

pub use automation::{ChromiumDriver, DriverLauncher, LaunchOverrides};
pub use driver::{
    response_channel, BrowserDriver, FetchedResponse, ResponseEvent, ResponseReceiver,
    ResponseSender,
};
pub use error::{BrowserError, BrowserResult};
