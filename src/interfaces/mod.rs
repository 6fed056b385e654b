pub mod http;
pub mod mailer;
