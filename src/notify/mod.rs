//! Notification path: alert composition, email, and webhooks.
//!
//! Everything here is best-effort. Failures are logged and counted by the
//! [`Dispatcher`] and never reach the persistence side of a pass.

pub mod composer;
pub mod dispatcher;
pub mod email;
pub mod profile;
pub mod shortener;
pub mod webhook;

pub use composer::{Alert, AlertComposer};
pub use dispatcher::{DispatchReport, Dispatcher};
pub use email::{EmailTransport, SmtpMailer, SmtpSettings};
pub use profile::{InterestSet, Profile};
pub use shortener::{HttpUrlShortener, UrlShortener};
pub use webhook::{WebhookClient, WebhookReport};
