pub mod messages;
pub mod social_oauth;
