pub mod webhook;

pub use webhook::WebhookNotificationSink;
